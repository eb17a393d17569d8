use super::{
    NodeFlags, Pbvh, PbvhBuildError, PbvhBuildOptions, PbvhData, PbvhNode, PBVH_STACK_FIXED_DEPTH,
};
use crate::bounding_volume::{Aabb, CentroidAabb};
use crate::math::{Point, Real};
use crate::mesh::{DynTopoError, DynTopoMesh, DynVert, FaceKey, VertKey};
use crate::utils::{HashMap, HashSet};

/// A dynamic-topology mesh and the leaves owning its elements.
#[derive(Clone, Debug, Default)]
pub struct DynTopoData {
    pub(crate) mesh: DynTopoMesh,
    /// The leaf owning each claimed vertex.
    pub(crate) vert_node: HashMap<VertKey, u32>,
    /// The leaf containing each face.
    pub(crate) face_node: HashMap<FaceKey, u32>,
}

impl DynTopoData {
    /// The mesh.
    #[inline]
    pub fn mesh(&self) -> &DynTopoMesh {
        &self.mesh
    }

    /// The leaf owning a vertex, if any.
    #[inline]
    pub fn vert_node(&self, vert: VertKey) -> Option<u32> {
        self.vert_node.get(&vert).copied()
    }

    /// The leaf containing a face, if any.
    #[inline]
    pub fn face_node(&self, face: FaceKey) -> Option<u32> {
        self.face_node.get(&face).copied()
    }
}

/// A node of the rough tree computed before the actual nodes are created.
struct FastNodeBuildInfo {
    start: usize,
    totface: usize,
    children: Option<[usize; 2]>,
}

struct FastBuilder<'a> {
    faces: Vec<FaceKey>,
    bbc: &'a HashMap<FaceKey, CentroidAabb>,
    leaf_limit: usize,
    infos: Vec<FastNodeBuildInfo>,
}

impl FastBuilder<'_> {
    /// Splits the rough node `info` at the midpoint of its centroid bounds until every
    /// rough leaf holds at most `leaf_limit` faces.
    fn limit_ensure_fast(&mut self, info: usize, depth: usize) {
        let FastNodeBuildInfo { start, totface, .. } = self.infos[info];

        if totface <= self.leaf_limit || depth >= PBVH_STACK_FIXED_DEPTH {
            return;
        }

        let end = start + totface;
        let cb = Aabb::from_points(self.faces[start..end].iter().map(|f| &self.bbc[f].centroid));
        let axis = cb.widest_axis();
        let mid = (cb.maxs[axis] + cb.mins[axis]) * 0.5;

        let mut i = start;
        let mut j = end - 1;

        // Faces with centroids past the midpoint go to the end of the range.
        loop {
            while i <= j && self.bbc[&self.faces[i]].centroid[axis] <= mid {
                i += 1;
            }
            while j > i && self.bbc[&self.faces[j]].centroid[axis] > mid {
                j -= 1;
            }
            if i >= j {
                break;
            }
            self.faces.swap(i, j);
            i += 1;
            j -= 1;
        }

        let mut num_child1 = i.min(end) - start;
        if num_child1 == 0 || num_child1 == totface {
            num_child1 = totface / 2;
        }

        let child1 = self.infos.len();
        self.infos.push(FastNodeBuildInfo {
            start,
            totface: num_child1,
            children: None,
        });
        self.infos.push(FastNodeBuildInfo {
            start: start + num_child1,
            totface: totface - num_child1,
            children: None,
        });
        self.infos[info].children = Some([child1, child1 + 1]);

        self.limit_ensure_fast(child1, depth + 1);
        self.limit_ensure_fast(child1 + 1, depth + 1);
    }
}

/// Fills a leaf from its face set, claiming the vertices nobody owns yet.
fn bmesh_node_finalize(node: &mut PbvhNode, data: &mut DynTopoData, node_index: u32) {
    let mut has_visible = false;

    node.bm_unique_verts.clear();
    node.bm_other_verts.clear();
    node.vb = Aabb::new_invalid();

    for face_key in &node.bm_faces {
        let Some(face) = data.mesh.face(*face_key) else {
            continue;
        };

        let _ = data.face_node.insert(*face_key, node_index);

        for vert in face.verts() {
            match data.vert_node.get(&vert) {
                Some(owner) if *owner == node_index => {
                    let _ = node.bm_unique_verts.insert(vert);
                }
                Some(_) => {
                    let _ = node.bm_other_verts.insert(vert);
                }
                None => {
                    let _ = node.bm_unique_verts.insert(vert);
                    let _ = data.vert_node.insert(vert, node_index);
                }
            }

            if let Some(v) = data.mesh.vert(vert) {
                node.vb.expand(&v.co);
            }
        }

        has_visible |= !face.hidden;
    }

    node.orig_vb = node.vb;
    node.flag |= NodeFlags::LEAF;
    node.mark_rebuild_draw();
    node.fully_hidden_set(!has_visible);
    node.flag |= NodeFlags::UPDATE_NORMALS;
}

fn bmesh_face_bbc(mesh: &DynTopoMesh, face: FaceKey) -> Option<CentroidAabb> {
    mesh.face(face)
        .map(|f| CentroidAabb::from_aabb(mesh.face_aabb(f)))
}

impl Pbvh {
    /// Builds a tree over a dynamic-topology mesh.
    pub fn build_bmesh(
        mesh: DynTopoMesh,
        options: PbvhBuildOptions,
    ) -> Result<Pbvh, PbvhBuildError> {
        if options.bmesh_leaf_limit == 0 {
            return Err(PbvhBuildError::ZeroLeafLimit);
        }

        let bbc: HashMap<FaceKey, CentroidAabb> = mesh
            .faces()
            .map(|(key, face)| (key, CentroidAabb::from_aabb(mesh.face_aabb(face))))
            .collect();

        let mut builder = FastBuilder {
            faces: mesh.faces().map(|(key, _)| key).collect(),
            bbc: &bbc,
            leaf_limit: options.bmesh_leaf_limit,
            infos: vec![],
        };
        builder.infos.push(FastNodeBuildInfo {
            start: 0,
            totface: builder.faces.len(),
            children: None,
        });
        builder.limit_ensure_fast(0, 0);

        let data = DynTopoData {
            mesh,
            vert_node: HashMap::default(),
            face_node: HashMap::default(),
        };
        let mut result = Pbvh::with_data(PbvhData::BMesh(data), options.bmesh_leaf_limit, options);
        result.create_nodes_fast_recursive(&builder.faces, &builder.infos, 0, 0);

        log::debug!(
            "built a dynamic-topology tree: {} faces, {} nodes, leaf limit {}",
            builder.faces.len(),
            result.nodes.len(),
            options.bmesh_leaf_limit,
        );

        Ok(result)
    }

    fn create_nodes_fast_recursive(
        &mut self,
        faces: &[FaceKey],
        infos: &[FastNodeBuildInfo],
        info: usize,
        node_index: u32,
    ) {
        let Pbvh { nodes, data, .. } = self;
        let PbvhData::BMesh(data) = data else {
            return;
        };

        match infos[info].children {
            Some([child1, child2]) => {
                let children_offset = nodes.len() as u32;
                nodes[node_index as usize].flag = NodeFlags::empty();
                nodes[node_index as usize].children_offset = children_offset;
                nodes.resize_with(nodes.len() + 2, PbvhNode::default);

                self.create_nodes_fast_recursive(faces, infos, child1, children_offset);
                self.create_nodes_fast_recursive(faces, infos, child2, children_offset + 1);

                let vb = self.nodes[children_offset as usize]
                    .vb
                    .merged(&self.nodes[children_offset as usize + 1].vb);
                let n = &mut self.nodes[node_index as usize];
                n.vb = vb;
                n.orig_vb = vb;
            }
            None => {
                let range = infos[info].start..infos[info].start + infos[info].totface;
                let node = &mut nodes[node_index as usize];
                *node = PbvhNode::new_leaf();
                node.bm_faces = faces[range].iter().copied().collect();
                bmesh_node_finalize(node, data, node_index);
            }
        }
    }

    fn bmesh_data_mut(&mut self) -> Option<&mut DynTopoData> {
        match &mut self.data {
            PbvhData::BMesh(data) => Some(data),
            _ => None,
        }
    }

    /// Adds a vertex to the dynamic-topology mesh. It belongs to no leaf until a face
    /// uses it.
    pub fn bmesh_add_vert(&mut self, co: Point<Real>) -> Option<VertKey> {
        self.bmesh_data_mut().map(|data| data.mesh.add_vert(co))
    }

    /// Mutable access to a vertex of the dynamic-topology mesh.
    ///
    /// The leaves using it must be tagged after moving, hiding or masking it.
    pub fn bmesh_vert_mut(&mut self, vert: VertKey) -> Option<&mut DynVert> {
        self.bmesh_data_mut()?.mesh.vert_mut(vert)
    }

    /// Hides or reveals a face of the dynamic-topology mesh and tags its leaf.
    pub fn bmesh_face_hidden_set(
        &mut self,
        face: FaceKey,
        hidden: bool,
    ) -> Result<(), DynTopoError> {
        let Pbvh { nodes, data, .. } = self;
        let PbvhData::BMesh(data) = data else {
            return Err(DynTopoError::InvalidFace { face });
        };

        data.mesh
            .face_mut(face)
            .ok_or(DynTopoError::InvalidFace { face })?
            .hidden = hidden;

        if let Some(node) = data.face_node.get(&face) {
            nodes[*node as usize].mark_update_visibility();
        }

        Ok(())
    }

    /// The leaf a new face through `verts` should be inserted into.
    fn bmesh_leaf_for_face(&self, data: &DynTopoData, verts: [VertKey; 3]) -> u32 {
        if let Some(node) = verts.iter().find_map(|v| data.vert_node.get(v)) {
            return *node;
        }

        let centroid = Aabb::from_points(
            verts
                .iter()
                .filter_map(|v| data.mesh.vert(*v))
                .map(|v| &v.co),
        )
        .center();
        let mut curr = 0;

        while let Some([left, right]) = self.nodes[curr as usize].children() {
            let dl = (self.nodes[left as usize].vb.center() - centroid).norm_squared();
            let dr = (self.nodes[right as usize].vb.center() - centroid).norm_squared();
            curr = if dl <= dr { left } else { right };
        }

        curr
    }

    /// Adds a triangle to the dynamic-topology mesh and to a leaf.
    ///
    /// The face goes to the leaf owning its first claimed vertex, or to the leaf whose box
    /// center is closest. That leaf is split if it ends up with more faces than the leaf
    /// limit.
    pub fn bmesh_add_face(&mut self, verts: [VertKey; 3]) -> Result<FaceKey, DynTopoError> {
        let node_index = match &self.data {
            PbvhData::BMesh(data) => self.bmesh_leaf_for_face(data, verts),
            _ => return Err(DynTopoError::InvalidVertex { vert: verts[0] }),
        };

        let leaf_limit = self.leaf_limit;
        let Pbvh { nodes, data, .. } = self;
        let PbvhData::BMesh(data) = data else {
            return Err(DynTopoError::InvalidVertex { vert: verts[0] });
        };

        let face = data.mesh.add_face(verts)?;
        let node = &mut nodes[node_index as usize];

        let _ = node.bm_faces.insert(face);
        let _ = data.face_node.insert(face, node_index);

        for vert in verts {
            match data.vert_node.get(&vert) {
                Some(owner) if *owner == node_index => {}
                Some(_) => {
                    let _ = node.bm_other_verts.insert(vert);
                }
                None => {
                    let _ = node.bm_unique_verts.insert(vert);
                    let _ = data.vert_node.insert(vert, node_index);
                }
            }

            if let Some(v) = data.mesh.vert(vert) {
                node.vb.expand(&v.co);
            }
        }

        node.flag |= NodeFlags::UPDATE_DRAW_BUFFERS
            | NodeFlags::UPDATE_NORMALS
            | NodeFlags::UPDATE_TOPOLOGY
            | NodeFlags::UPDATE_BB
            | NodeFlags::UPDATE_REDRAW;
        node.flag.remove(NodeFlags::FULLY_HIDDEN);

        if node.bm_faces.len() > leaf_limit {
            self.bmesh_node_split(node_index, 0);
            self.draw_cache_invalid = true;

            // The ancestors of the split node still have to grow to the new face.
            let mut stack = vec![node_index];
            while let Some(id) = stack.pop() {
                let n = &mut self.nodes[id as usize];
                match n.children() {
                    Some(children) => stack.extend(children),
                    None => n.flag |= NodeFlags::UPDATE_BB,
                }
            }
        }

        Ok(face)
    }

    /// Splits a leaf in two at the midpoint of its face centroids, recursively, until
    /// every resulting leaf respects the leaf limit.
    fn bmesh_node_split(&mut self, node_index: u32, depth: usize) {
        let leaf_limit = self.leaf_limit;
        let Pbvh {
            nodes,
            data,
            pending_batch_frees,
            ..
        } = self;
        let PbvhData::BMesh(data) = data else {
            return;
        };

        let node = &mut nodes[node_index as usize];
        if node.bm_faces.len() <= leaf_limit || depth >= PBVH_STACK_FIXED_DEPTH {
            bmesh_node_finalize(node, data, node_index);
            return;
        }

        let bbc: HashMap<FaceKey, CentroidAabb> = nodes[node_index as usize]
            .bm_faces
            .iter()
            .filter_map(|f| bmesh_face_bbc(&data.mesh, *f).map(|bbc| (*f, bbc)))
            .collect();

        let cb = Aabb::from_points(bbc.values().map(|bbc| &bbc.centroid));
        let axis = cb.widest_axis();
        let mid = (cb.maxs[axis] + cb.mins[axis]) * 0.5;

        let children = nodes.len() as u32;
        nodes.resize_with(nodes.len() + 2, PbvhNode::new_leaf);

        let parent_faces = core::mem::take(&mut nodes[node_index as usize].bm_faces);
        let mut c1: HashSet<FaceKey> = HashSet::default();
        let mut c2: HashSet<FaceKey> = HashSet::default();

        for face in &parent_faces {
            match bbc.get(face) {
                Some(bbc) if bbc.centroid[axis] < mid => {
                    let _ = c1.insert(*face);
                }
                _ => {
                    let _ = c2.insert(*face);
                }
            }
        }

        // Each child gets at least one face.
        if c1.is_empty() {
            if let Some(face) = c2.iter().next().copied() {
                let _ = c2.remove(&face);
                let _ = c1.insert(face);
            }
        } else if c2.is_empty() {
            if let Some(face) = c1.iter().next().copied() {
                let _ = c1.remove(&face);
                let _ = c2.insert(face);
            }
        }

        let parent = &mut nodes[node_index as usize];
        for vert in parent.bm_unique_verts.drain() {
            let _ = data.vert_node.remove(&vert);
        }
        for face in &parent_faces {
            let _ = data.face_node.remove(face);
        }
        parent.bm_other_verts.clear();
        parent.proxies.clear();
        parent.flag.remove(NodeFlags::LEAF);
        parent.children_offset = children;
        let freed_batch = parent.draw_batches.take();

        nodes[children as usize].bm_faces = c1;
        nodes[children as usize + 1].bm_faces = c2;
        pending_batch_frees.extend(freed_batch);

        self.bmesh_node_split(children, depth + 1);
        self.bmesh_node_split(children + 1, depth + 1);

        let vb = self.nodes[children as usize]
            .vb
            .merged(&self.nodes[children as usize + 1].vb);
        let n = &mut self.nodes[node_index as usize];
        n.vb = vb;
        n.orig_vb = vb;
    }

    /// Removes a triangle from the dynamic-topology mesh and from its leaf.
    ///
    /// Vertices no longer used by the leaf are released: the ones it owned are handed to
    /// another leaf using them, or left unowned if no face uses them anymore.
    pub fn bmesh_remove_face(&mut self, face: FaceKey) -> Result<(), DynTopoError> {
        let Pbvh { nodes, data, .. } = self;
        let PbvhData::BMesh(data) = data else {
            return Err(DynTopoError::InvalidFace { face });
        };

        let verts = data
            .mesh
            .face(face)
            .ok_or(DynTopoError::InvalidFace { face })?
            .verts();
        let f_node = data.face_node.get(&face).copied();

        if let Some(f_node) = f_node {
            for vert in verts {
                let Some(v) = data.mesh.vert(vert) else {
                    continue;
                };

                let uses_in_node = v
                    .faces()
                    .iter()
                    .filter(|f| data.face_node.get(*f) == Some(&f_node))
                    .count();

                if uses_in_node != 1 {
                    continue;
                }

                if nodes[f_node as usize].bm_unique_verts.contains(&vert) {
                    let new_node = v
                        .faces()
                        .iter()
                        .filter_map(|f| data.face_node.get(f).copied())
                        .find(|n| *n != f_node);

                    let _ = nodes[f_node as usize].bm_unique_verts.remove(&vert);

                    match new_node {
                        Some(new_node) => {
                            let new = &mut nodes[new_node as usize];
                            let _ = new.bm_other_verts.remove(&vert);
                            let _ = new.bm_unique_verts.insert(vert);
                            new.flag |= NodeFlags::UPDATE_DRAW_BUFFERS;
                            let _ = data.vert_node.insert(vert, new_node);
                        }
                        None => {
                            let _ = data.vert_node.remove(&vert);
                        }
                    }
                } else {
                    let _ = nodes[f_node as usize].bm_other_verts.remove(&vert);
                }
            }

            let node = &mut nodes[f_node as usize];
            let _ = node.bm_faces.remove(&face);
            node.flag |= NodeFlags::UPDATE_DRAW_BUFFERS
                | NodeFlags::UPDATE_NORMALS
                | NodeFlags::UPDATE_TOPOLOGY
                | NodeFlags::UPDATE_BB
                | NodeFlags::UPDATE_REDRAW;
        }

        let _ = data.face_node.remove(&face);
        let _ = data.mesh.remove_face(face)?;
        Ok(())
    }
}
