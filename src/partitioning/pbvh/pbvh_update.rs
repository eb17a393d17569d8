use super::pbvh_traverse::{nodes_mut_by_index, update_search};
use super::{NodeFlags, Pbvh, PbvhData, PbvhNode};
use crate::bounding_volume::Aabb;
use crate::math::Real;
use crate::mesh::{FaceKey, VertKey};
use crate::utils::parallel::{self, ParallelSettings};
use indexmap::IndexSet;

/// The number of faces or vertices a single normal task handles at least.
const NORMALS_MIN_LEN: usize = 1024;

/// The box of every vertex used by a leaf. Empty leaves get an invalid box.
pub(crate) fn leaf_vertex_aabb(
    data: &PbvhData,
    prim_indices: &[u32],
    node: &PbvhNode,
) -> Aabb {
    let mut vb = Aabb::new_invalid();

    match data {
        PbvhData::Faces(mesh) => {
            for vert in &node.vert_indices {
                vb.expand(&mesh.positions()[*vert as usize]);
            }
        }
        PbvhData::Grids(grids) => {
            for grid in &prim_indices[node.prim_range()] {
                for pt in grids.grid_positions(*grid as usize) {
                    vb.expand(pt);
                }
            }
        }
        PbvhData::BMesh(data) => {
            for vert in node.bm_unique_verts.iter().chain(&node.bm_other_verts) {
                if let Some(v) = data.mesh.vert(*vert) {
                    vb.expand(&v.co);
                }
            }
        }
    }

    vb
}

fn node_update_bounds(
    data: &PbvhData,
    prim_indices: &[u32],
    node: &mut PbvhNode,
    flag: NodeFlags,
) {
    if flag.contains(NodeFlags::UPDATE_BB) && node.flag.contains(NodeFlags::UPDATE_BB) {
        // The flag itself is cleared by the flush.
        node.vb = leaf_vertex_aabb(data, prim_indices, node);

        if node.vb.is_valid() && !node.vb.is_finite() {
            log::warn!("a leaf bounding box is not finite: {:?}", node.vb);
        }
    }

    if flag.contains(NodeFlags::UPDATE_ORIGINAL_BB)
        && node.flag.contains(NodeFlags::UPDATE_ORIGINAL_BB)
    {
        node.orig_vb = node.vb;
    }

    if flag.contains(NodeFlags::UPDATE_REDRAW) && node.flag.contains(NodeFlags::UPDATE_REDRAW) {
        node.flag.remove(NodeFlags::UPDATE_REDRAW);
    }
}

fn node_update_visibility(data: &PbvhData, prim_indices: &[u32], node: &mut PbvhNode) {
    let fully_hidden = match data {
        PbvhData::Faces(mesh) => mesh.hide_vert().is_some_and(|hide| {
            node.vert_indices.iter().all(|vert| hide[*vert as usize])
        }),
        PbvhData::Grids(grids) => grids.grid_hidden().is_some() && {
            prim_indices[node.prim_range()].iter().all(|grid| {
                grids
                    .grid_hidden_of(*grid as usize)
                    .is_some_and(|gh| gh.iter().all(|hidden| *hidden))
            })
        },
        PbvhData::BMesh(data) => node
            .bm_unique_verts
            .iter()
            .chain(&node.bm_other_verts)
            .all(|vert| data.mesh.vert(*vert).is_some_and(|v| v.hidden)),
    };

    node.fully_hidden_set(fully_hidden);
    node.flag.remove(NodeFlags::UPDATE_VISIBILITY);
}

fn node_update_mask(data: &PbvhData, prim_indices: &[u32], node: &mut PbvhNode) {
    let mut fully_masked = true;
    let mut fully_unmasked = true;
    let mut visit = |mask: Real| {
        fully_masked &= mask == 1.0;
        fully_unmasked &= mask <= 0.0;
    };

    match data {
        PbvhData::Faces(mesh) => match mesh.mask() {
            Some(mask) => node
                .vert_indices
                .iter()
                .for_each(|v| visit(mask[*v as usize])),
            None => visit(0.0),
        },
        PbvhData::Grids(grids) => match grids.masks() {
            Some(masks) => {
                let area = grids.key().grid_area as usize;
                for grid in &prim_indices[node.prim_range()] {
                    let start = *grid as usize * area;
                    masks[start..start + area].iter().for_each(|m| visit(*m));
                }
            }
            None => visit(0.0),
        },
        PbvhData::BMesh(data) => {
            if data.mesh.has_mask() {
                for vert in node.bm_unique_verts.iter().chain(&node.bm_other_verts) {
                    if let Some(v) = data.mesh.vert(*vert) {
                        visit(v.mask);
                    }
                }
            } else {
                visit(0.0);
            }
        }
    }

    node.fully_masked_set(fully_masked);
    node.fully_unmasked_set(fully_unmasked);
    node.flag.remove(NodeFlags::UPDATE_MASK);
}

impl Pbvh {
    /// The leaves tagged with any bit of `flag`.
    pub(crate) fn gather_leaves_to_update(&self, flag: NodeFlags) -> Vec<u32> {
        self.search_gather(|node| update_search(node, flag))
    }

    /// Runs `f` on each of the given leaves, possibly concurrently.
    fn for_each_leaf(
        &mut self,
        leaves: &[u32],
        f: impl Fn(&PbvhData, &[u32], &mut PbvhNode) + Sync + Send,
    ) {
        let settings = ParallelSettings::for_nodes(self.options.use_threading, leaves.len());
        let Pbvh {
            nodes,
            prim_indices,
            data,
            ..
        } = self;
        let data = &*data;
        let prim_indices = &prim_indices[..];

        parallel::for_each(nodes_mut_by_index(nodes, leaves), settings, |node| {
            f(data, prim_indices, node)
        });
    }

    /// Recomputes the boxes of the leaves tagged with the bounds kinds of `flag`, then
    /// propagates them up to the root.
    ///
    /// `UPDATE_BB` recomputes the current box from the leaf vertices, `UPDATE_ORIGINAL_BB`
    /// snapshots it into the original box, and `UPDATE_REDRAW` is cleared. Only the bits
    /// both requested and set on a node are serviced.
    pub fn update_bounds(&mut self, flag: NodeFlags) {
        if self.nodes.is_empty() {
            return;
        }

        let bounds = NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB;

        if flag.intersects(bounds | NodeFlags::UPDATE_REDRAW) {
            let leaves = self.gather_leaves_to_update(flag);
            self.for_each_leaf(&leaves, |data, prim_indices, node| {
                node_update_bounds(data, prim_indices, node, flag)
            });
        }

        if flag.intersects(bounds) {
            let _ = self.flush_bb(0, flag);
        }
    }

    /// Clears the bounds bits of the leaves below `node` and recomputes the boxes of the
    /// internal nodes above them. Returns the bounds bits found on the leaves.
    pub(crate) fn flush_bb(&mut self, node: u32, flag: NodeFlags) -> NodeFlags {
        let n = &mut self.nodes[node as usize];

        if n.is_leaf() {
            let update = n.flag & flag & (NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB);
            n.flag.remove(update);
            return update;
        }

        let [left, right] = [n.children_offset, n.children_offset + 1];
        let update = self.flush_bb(left, flag) | self.flush_bb(right, flag);

        let (l, r) = (&self.nodes[left as usize], &self.nodes[right as usize]);
        let vb = l.vb.merged(&r.vb);
        let orig_vb = l.orig_vb.merged(&r.orig_vb);

        let n = &mut self.nodes[node as usize];
        if update.contains(NodeFlags::UPDATE_BB) {
            n.vb = vb;
        }
        if update.contains(NodeFlags::UPDATE_ORIGINAL_BB) {
            n.orig_vb = orig_vb;
        }

        update
    }

    /// Recomputes the normals around the leaves tagged with `UPDATE_NORMALS`.
    pub fn update_normals(&mut self) {
        let leaves = self.gather_leaves_to_update(NodeFlags::UPDATE_NORMALS);

        if leaves.is_empty() {
            return;
        }

        let use_threading = self.options.use_threading;
        let settings = |len| ParallelSettings::for_nodes(use_threading, len);

        match &mut self.data {
            PbvhData::Faces(mesh) => {
                let mut faces = IndexSet::new();
                for leaf in &leaves {
                    for vert in &self.nodes[*leaf as usize].vert_indices {
                        faces.extend(mesh.vert_to_face_map().group(*vert as usize));
                    }
                }
                let faces: Vec<u32> = faces.into_iter().collect();

                let face_normals = parallel::map(
                    &faces,
                    settings(faces.len()).with_min_len(NORMALS_MIN_LEN),
                    |f| mesh.face_normal_calc(*f as usize),
                );
                for (face, no) in faces.iter().zip(face_normals) {
                    mesh.face_normals_mut()[*face as usize] = no;
                }

                // Every vertex of a recomputed face, not only the ones of the tagged leaves.
                let mut verts = IndexSet::new();
                for face in &faces {
                    verts.extend(mesh.faces().group(*face as usize));
                }
                let verts: Vec<u32> = verts.into_iter().collect();

                let vert_normals = parallel::map(
                    &verts,
                    settings(verts.len()).with_min_len(NORMALS_MIN_LEN),
                    |v| mesh.vert_normal_calc(*v as usize),
                );
                for (vert, no) in verts.iter().zip(vert_normals) {
                    mesh.vert_normals_mut()[*vert as usize] = no;
                }
            }
            PbvhData::Grids(grids) => {
                let mut to_update = Vec::new();
                for leaf in &leaves {
                    let n = &self.nodes[*leaf as usize];
                    to_update.extend(
                        self.prim_indices[n.prim_range()]
                            .iter()
                            .map(|g| *g as usize),
                    );
                }

                let normals = parallel::map(&to_update, settings(to_update.len()), |grid| {
                    grids.compute_grid_normals(*grid)
                });
                for (grid, normals) in to_update.iter().zip(normals) {
                    grids.set_grid_normals(*grid, &normals);
                }
            }
            PbvhData::BMesh(data) => {
                let mut faces: IndexSet<FaceKey> = IndexSet::new();
                let mut verts: IndexSet<VertKey> = IndexSet::new();
                for leaf in &leaves {
                    let n = &self.nodes[*leaf as usize];
                    faces.extend(n.bm_faces.iter().copied());
                    verts.extend(n.bm_unique_verts.iter().chain(&n.bm_other_verts).copied());
                }
                let faces: Vec<FaceKey> = faces.into_iter().collect();
                let verts: Vec<VertKey> = verts.into_iter().collect();

                let mesh = &mut data.mesh;
                let face_normals = parallel::map(&faces, settings(faces.len()), |f| {
                    mesh.face(*f).map(|face| mesh.face_normal_calc(face))
                });
                for (face, no) in faces.iter().zip(face_normals) {
                    if let (Some(face), Some(no)) = (mesh.face_mut(*face), no) {
                        face.no = no;
                    }
                }

                let vert_normals = parallel::map(&verts, settings(verts.len()), |v| {
                    mesh.vert(*v).map(|vert| mesh.vert_normal_calc(vert))
                });
                for (vert, no) in verts.iter().zip(vert_normals) {
                    if let (Some(vert), Some(no)) = (mesh.vert_mut(*vert), no) {
                        vert.no = no;
                    }
                }
            }
        }

        for leaf in &leaves {
            self.nodes[*leaf as usize]
                .flag
                .remove(NodeFlags::UPDATE_NORMALS);
        }
    }

    /// Recomputes `FULLY_HIDDEN` on the leaves tagged with `UPDATE_VISIBILITY`.
    ///
    /// A leaf is fully hidden if all its vertices (or grid samples) are hidden. Without
    /// a hide layer, no leaf is.
    pub fn update_visibility(&mut self) {
        let leaves = self.gather_leaves_to_update(NodeFlags::UPDATE_VISIBILITY);
        self.for_each_leaf(&leaves, node_update_visibility);
    }

    /// Recomputes `FULLY_MASKED` and `FULLY_UNMASKED` on the leaves tagged with
    /// `UPDATE_MASK`.
    pub fn update_mask(&mut self) {
        let leaves = self.gather_leaves_to_update(NodeFlags::UPDATE_MASK);
        self.for_each_leaf(&leaves, node_update_mask);
    }

    /// Services the vertex attribute bits of `flag` on the leaves tagged with them.
    ///
    /// With `UPDATE_COLOR`, the leaves get tagged for a redraw and a draw-buffer update.
    /// `UPDATE_MASK` and `UPDATE_VISIBILITY` run the matching passes.
    pub fn update_vertex_data(&mut self, flag: NodeFlags) {
        let leaves = self.gather_leaves_to_update(flag);

        if flag.contains(NodeFlags::UPDATE_COLOR) {
            for leaf in &leaves {
                self.nodes[*leaf as usize].flag |= NodeFlags::UPDATE_REDRAW
                    | NodeFlags::UPDATE_DRAW_BUFFERS
                    | NodeFlags::UPDATE_COLOR;
            }
        }

        if flag.contains(NodeFlags::UPDATE_MASK) {
            self.update_mask();
        }

        if flag.contains(NodeFlags::UPDATE_VISIBILITY) {
            self.update_visibility();
        }
    }
}
