use super::{
    count_grid_quads, NodeFlags, Pbvh, PbvhBuildError, PbvhBuildOptions, PbvhData, PbvhNode,
    PBVH_STACK_FIXED_DEPTH,
};
use crate::bounding_volume::{Aabb, CentroidAabb};
use crate::math::Real;
use crate::mesh::{FacesMesh, SubdivGrids};
use indexmap::IndexSet;

/// State shared by the recursive steps of a mesh or grids build.
struct PbvhBuilder<'a> {
    nodes: Vec<PbvhNode>,
    prim_indices: Vec<u32>,
    data: &'a PbvhData,
    prim_bbc: &'a [CentroidAabb],
    /// The base face of every primitive. Primitives of a face are never split apart.
    prim_faces: &'a [u32],
    leaf_limit: usize,
    /// Mesh builds: whether a vertex is already owned by a leaf.
    vert_claimed: Vec<bool>,
    scratch: Vec<u32>,
}

impl PbvhBuilder<'_> {
    fn materials_match(&self, a: u32, b: u32) -> bool {
        match self.data {
            PbvhData::Faces(mesh) => mesh.face_materials_match(
                mesh.tri_faces()[a as usize] as usize,
                mesh.tri_faces()[b as usize] as usize,
            ),
            PbvhData::Grids(grids) => grids.grid_materials_match(a as usize, b as usize),
            PbvhData::BMesh(_) => true,
        }
    }

    fn leaf_needs_material_split(&self, offset: usize, count: usize) -> bool {
        let first = self.prim_indices[offset];
        self.prim_indices[offset + 1..offset + count]
            .iter()
            .any(|prim| !self.materials_match(first, *prim))
    }

    fn range_aabb(&self, offset: usize, count: usize) -> Aabb {
        let mut vb = Aabb::new_invalid();
        for prim in &self.prim_indices[offset..offset + count] {
            vb.expand_with_bb(&self.prim_bbc[*prim as usize].aabb);
        }
        vb
    }

    fn centroid_bounds(&self, offset: usize, count: usize) -> Aabb {
        Aabb::from_points(
            self.prim_indices[offset..offset + count]
                .iter()
                .map(|prim| &self.prim_bbc[*prim as usize].centroid),
        )
    }

    /// Splits `[offset, offset + count)` at `mid` along `axis` without splitting faces.
    ///
    /// Each group of consecutive primitives sharing a face goes to the side of its first
    /// member's centroid. The right side is filled from the end of the range. Returns the
    /// index of the first primitive of the right side.
    fn partition_indices_faces(
        &mut self,
        offset: usize,
        count: usize,
        axis: usize,
        mid: Real,
    ) -> usize {
        self.scratch.clear();
        self.scratch
            .extend_from_slice(&self.prim_indices[offset..offset + count]);

        let mut lo = offset;
        let mut hi = offset + count;
        let mut i = 0;

        while i < count {
            let face = self.prim_faces[self.scratch[i] as usize];
            let right = self.prim_bbc[self.scratch[i] as usize].centroid[axis] >= mid;

            while i < count && self.prim_faces[self.scratch[i] as usize] == face {
                if right {
                    hi -= 1;
                    self.prim_indices[hi] = self.scratch[i];
                } else {
                    self.prim_indices[lo] = self.scratch[i];
                    lo += 1;
                }
                i += 1;
            }
        }

        lo
    }

    /// The face boundary nearest to the middle of the range, if the range spans more than
    /// one face.
    fn face_boundary_near_middle(&self, offset: usize, count: usize) -> Option<usize> {
        let middle = offset + count / 2;

        (offset + 1..offset + count)
            .filter(|i| {
                self.prim_faces[self.prim_indices[*i] as usize]
                    != self.prim_faces[self.prim_indices[*i - 1] as usize]
            })
            .min_by_key(|i| i.abs_diff(middle))
    }

    /// Moves every primitive matching the material of the first one of `[lo, hi]` to the
    /// front of the range. Returns the index of the first non-matching primitive.
    fn partition_indices_material(&mut self, lo: usize, hi: usize) -> usize {
        let first = self.prim_indices[lo];
        let mut i = lo;
        let mut j = hi;

        loop {
            while self.materials_match(first, self.prim_indices[i]) {
                i += 1;
            }
            while !self.materials_match(first, self.prim_indices[j]) {
                j -= 1;
            }

            if i >= j {
                return i;
            }

            self.prim_indices.swap(i, j);
            i += 1;
        }
    }

    fn build_sub(
        &mut self,
        node: usize,
        cb: Option<Aabb>,
        offset: usize,
        count: usize,
        depth: usize,
    ) {
        let below_leaf_limit = count <= self.leaf_limit || depth >= PBVH_STACK_FIXED_DEPTH - 1;

        let end = if below_leaf_limit {
            if count == 0 || !self.leaf_needs_material_split(offset, count) {
                self.build_leaf(node, offset, count);
                return;
            }

            self.partition_indices_material(offset, offset + count - 1)
        } else {
            let cb = cb.unwrap_or_else(|| self.centroid_bounds(offset, count));
            let axis = cb.widest_axis();
            let mid = (cb.maxs[axis] + cb.mins[axis]) * 0.5;

            match self.partition_indices_faces(offset, count, axis, mid) {
                end if end > offset && end < offset + count => end,
                _ => match self.face_boundary_near_middle(offset, count) {
                    Some(end) => end,
                    None => {
                        self.build_leaf(node, offset, count);
                        return;
                    }
                },
            }
        };

        let vb = self.range_aabb(offset, count);
        let children_offset = self.nodes.len();
        {
            let n = &mut self.nodes[node];
            n.flag = NodeFlags::empty();
            n.vb = vb;
            n.orig_vb = vb;
            n.children_offset = children_offset as u32;
        }
        self.nodes
            .resize_with(children_offset + 2, PbvhNode::default);

        self.build_sub(children_offset, None, offset, end - offset, depth + 1);
        self.build_sub(
            children_offset + 1,
            None,
            end,
            offset + count - end,
            depth + 1,
        );
    }

    fn build_leaf(&mut self, node: usize, offset: usize, count: usize) {
        let vb = self.range_aabb(offset, count);
        let mut leaf = PbvhNode::new_leaf();
        leaf.vb = vb;
        leaf.orig_vb = vb;
        leaf.prim_start = offset as u32;
        leaf.prim_count = count as u32;

        let prims = &self.prim_indices[offset..offset + count];

        match self.data {
            PbvhData::Faces(mesh) => {
                build_mesh_leaf_payload(mesh, prims, &mut self.vert_claimed, &mut leaf);
                let fully_hidden = mesh.hide_poly().is_some_and(|hide| {
                    prims
                        .iter()
                        .all(|tri| hide[mesh.tri_faces()[*tri as usize] as usize])
                });
                leaf.fully_hidden_set(fully_hidden);
            }
            PbvhData::Grids(grids) => {
                let key = grids.key();
                let visible = count_grid_quads(grids.grid_hidden(), prims, key, key.grid_size);
                leaf.fully_hidden_set(visible == 0);
            }
            PbvhData::BMesh(_) => {}
        }

        leaf.mark_rebuild_draw();
        self.nodes[node] = leaf;
    }
}

/// Fills the unique and shared vertex lists of a mesh leaf.
///
/// A vertex is unique to the first leaf that claims it. Unique vertices are listed first.
fn build_mesh_leaf_payload(
    mesh: &FacesMesh,
    prims: &[u32],
    vert_claimed: &mut [bool],
    leaf: &mut PbvhNode,
) {
    let mut unique = IndexSet::new();
    let mut shared = IndexSet::new();

    for tri in prims {
        for vert in mesh.tri_verts(*tri as usize) {
            if unique.contains(&vert) || shared.contains(&vert) {
                continue;
            }

            if vert_claimed[vert as usize] {
                let _ = shared.insert(vert);
            } else {
                vert_claimed[vert as usize] = true;
                let _ = unique.insert(vert);
            }
        }
    }

    let local_index = |vert: u32| -> u32 {
        match unique.get_index_of(&vert) {
            Some(i) => i as u32,
            None => (unique.len() + shared.get_index_of(&vert).unwrap_or(0)) as u32,
        }
    };

    leaf.face_vert_indices = prims
        .iter()
        .map(|tri| mesh.tri_verts(*tri as usize).map(&local_index))
        .collect();
    leaf.uniq_verts = unique.len() as u32;
    leaf.vert_indices = unique.into_iter().chain(shared).collect();
}

impl Pbvh {
    fn build_over_prims(
        data: PbvhData,
        prim_bbc: &[CentroidAabb],
        prim_faces: &[u32],
        num_verts: usize,
        leaf_limit: usize,
        options: PbvhBuildOptions,
    ) -> Pbvh {
        let mut builder = PbvhBuilder {
            nodes: vec![PbvhNode::new_leaf()],
            prim_indices: (0..prim_bbc.len() as u32).collect(),
            data: &data,
            prim_bbc,
            prim_faces,
            leaf_limit,
            vert_claimed: vec![false; num_verts],
            scratch: Vec::new(),
        };

        let cb = Aabb::from_points(prim_bbc.iter().map(|bbc| &bbc.centroid));
        builder.build_sub(0, Some(cb), 0, prim_bbc.len(), 0);

        let PbvhBuilder {
            nodes,
            prim_indices,
            ..
        } = builder;

        let mut result = Pbvh::with_data(data, leaf_limit, options);
        result.nodes = nodes;
        result.prim_indices = prim_indices;

        log::debug!(
            "built a {:?} tree: {} primitives, {} nodes, {} leaves, leaf limit {}",
            result.pbvh_type(),
            result.prim_indices.len(),
            result.nodes.len(),
            result.nodes.iter().filter(|n| n.is_leaf()).count(),
            leaf_limit,
        );

        result
    }

    /// Builds a tree over the triangles of a flat mesh.
    ///
    /// The triangles of one polygon always end up in the same leaf, and all the triangles
    /// of a leaf share their material and shading.
    pub fn build_mesh(mesh: FacesMesh, options: PbvhBuildOptions) -> Result<Pbvh, PbvhBuildError> {
        if options.leaf_limit == 0 {
            return Err(PbvhBuildError::ZeroLeafLimit);
        }

        let prim_bbc: Vec<CentroidAabb> = (0..mesh.num_corner_tris())
            .map(|tri| CentroidAabb::from_aabb(mesh.tri_aabb(tri)))
            .collect();
        let prim_faces = mesh.tri_faces().to_vec();
        let num_verts = mesh.num_verts();

        Ok(Self::build_over_prims(
            PbvhData::Faces(mesh),
            &prim_bbc,
            &prim_faces,
            num_verts,
            options.leaf_limit,
            options,
        ))
    }

    /// Builds a tree over multires grids.
    ///
    /// The leaf limit is divided by the grid area, but never drops below the largest
    /// number of grids of a single face so that leaves can still be split at face
    /// boundaries.
    pub fn build_grids(
        grids: SubdivGrids,
        options: PbvhBuildOptions,
    ) -> Result<Pbvh, PbvhBuildError> {
        if options.leaf_limit == 0 {
            return Err(PbvhBuildError::ZeroLeafLimit);
        }

        let key = grids.key();
        let leaf_limit = (options.leaf_limit / key.grid_area as usize)
            .max(grids.max_grids_per_face())
            .max(1);

        let prim_bbc: Vec<CentroidAabb> = (0..grids.num_grids())
            .map(|grid| CentroidAabb::from_aabb(grids.grid_aabb(grid)))
            .collect();
        let prim_faces = grids.grid_to_face_map().to_vec();

        Ok(Self::build_over_prims(
            PbvhData::Grids(grids),
            &prim_bbc,
            &prim_faces,
            0,
            leaf_limit,
            options,
        ))
    }
}
