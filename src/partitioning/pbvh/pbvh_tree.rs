use super::{BatchHandle, DynTopoData, NodeFlags, PbvhNode};
use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector};
use crate::mesh::{
    paint_is_grid_face_hidden, DynTopoError, DynTopoMesh, FacesMesh, GridKey, GridsBuilderError,
    MeshBuilderError, SubdivGrids,
};
use crate::query::FrustumPlanes;
use indexmap::IndexSet;

/// Options controlling the shape of a [`Pbvh`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PbvhBuildOptions {
    /// Maximum number of triangles of a mesh leaf.
    ///
    /// For grids, this is divided by the grid area.
    pub leaf_limit: usize,
    /// Maximum number of faces of a dynamic-topology leaf.
    pub bmesh_leaf_limit: usize,
    /// Whether update passes may run on the thread pool.
    pub use_threading: bool,
}

impl Default for PbvhBuildOptions {
    fn default() -> Self {
        Self {
            leaf_limit: 10000,
            bmesh_leaf_limit: 400,
            use_threading: true,
        }
    }
}

/// Errors raised while building a [`Pbvh`].
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum PbvhBuildError {
    /// Leaves must be allowed to hold at least one primitive.
    #[error("the leaf limit must be at least 1")]
    ZeroLeafLimit,
    /// The flat mesh arrays are inconsistent.
    #[error(transparent)]
    Mesh(#[from] MeshBuilderError),
    /// The grid arrays are inconsistent.
    #[error(transparent)]
    Grids(#[from] GridsBuilderError),
    /// The dynamic-topology mesh is inconsistent.
    #[error(transparent)]
    DynTopo(#[from] DynTopoError),
}

/// The kind of mesh a [`Pbvh`] is built on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum PbvhType {
    /// A triangulated polygon mesh. Primitives are triangles.
    Faces,
    /// Multires grids. Primitives are grids.
    Grids,
    /// A dynamic-topology mesh. Leaves own sets of faces.
    BMesh,
}

/// The mesh a [`Pbvh`] is built on.
#[derive(Clone, Debug)]
pub enum PbvhData {
    /// A triangulated polygon mesh.
    Faces(FacesMesh),
    /// Multires grids.
    Grids(SubdivGrids),
    /// A dynamic-topology mesh together with its node ownership maps.
    BMesh(DynTopoData),
}

/// Which vertices of a leaf [`Pbvh::for_each_vertex`] visits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VertexIterMode {
    /// Every vertex used by the leaf.
    All,
    /// Only the vertices owned by the leaf.
    Unique,
}

/// A vertex visited by [`Pbvh::for_each_vertex`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PbvhVertex {
    /// The vertex index: a mesh vertex, a flat grid sample index, or a dynamic vertex key.
    pub index: usize,
    /// The vertex position.
    pub co: Point<Real>,
    /// The vertex normal.
    pub no: Vector<Real>,
    /// The vertex mask, `0.0` when the mesh has no mask.
    pub mask: Real,
    /// Is the vertex hidden?
    pub hidden: bool,
}

/// A polygon bounding-volume hierarchy.
///
/// Callers mutate the underlying mesh, tag the affected nodes with the `mark_*` family of
/// [`PbvhNode`], then run the update passes which only touch tagged leaves.
#[derive(Clone, Debug)]
pub struct Pbvh {
    pub(crate) nodes: Vec<PbvhNode>,
    pub(crate) prim_indices: Vec<u32>,
    pub(crate) data: PbvhData,
    pub(crate) leaf_limit: usize,
    pub(crate) options: PbvhBuildOptions,
    pub(crate) frustum_planes: Option<FrustumPlanes>,
    pub(crate) deformed: bool,
    pub(crate) is_drawing: bool,
    pub(crate) draw_cache_invalid: bool,
    /// Draw batches of nodes that stopped being leaves, released on the next draw update.
    pub(crate) pending_batch_frees: Vec<BatchHandle>,
}

impl Pbvh {
    pub(crate) fn with_data(data: PbvhData, leaf_limit: usize, options: PbvhBuildOptions) -> Self {
        Self {
            nodes: vec![PbvhNode::new_leaf()],
            prim_indices: Vec::new(),
            data,
            leaf_limit,
            options,
            frustum_planes: None,
            deformed: false,
            is_drawing: false,
            draw_cache_invalid: true,
            pending_batch_frees: Vec::new(),
        }
    }

    /// The kind of mesh this tree is built on.
    pub fn pbvh_type(&self) -> PbvhType {
        match &self.data {
            PbvhData::Faces(_) => PbvhType::Faces,
            PbvhData::Grids(_) => PbvhType::Grids,
            PbvhData::BMesh(_) => PbvhType::BMesh,
        }
    }

    /// The mesh this tree is built on.
    #[inline]
    pub fn data(&self) -> &PbvhData {
        &self.data
    }

    /// The flat mesh, if this tree is built on one.
    pub fn faces(&self) -> Option<&FacesMesh> {
        match &self.data {
            PbvhData::Faces(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Mutable access to the flat mesh, if this tree is built on one.
    ///
    /// The nodes touched by the edits must be tagged afterward.
    pub fn faces_mut(&mut self) -> Option<&mut FacesMesh> {
        match &mut self.data {
            PbvhData::Faces(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// The grids, if this tree is built on them.
    pub fn grids(&self) -> Option<&SubdivGrids> {
        match &self.data {
            PbvhData::Grids(grids) => Some(grids),
            _ => None,
        }
    }

    /// Mutable access to the grids, if this tree is built on them.
    ///
    /// The nodes touched by the edits must be tagged afterward.
    pub fn grids_mut(&mut self) -> Option<&mut SubdivGrids> {
        match &mut self.data {
            PbvhData::Grids(grids) => Some(grids),
            _ => None,
        }
    }

    /// The dynamic-topology mesh, if this tree is built on one.
    pub fn dyntopo(&self) -> Option<&DynTopoMesh> {
        match &self.data {
            PbvhData::BMesh(data) => Some(&data.mesh),
            _ => None,
        }
    }

    /// The options this tree was built with.
    #[inline]
    pub fn options(&self) -> &PbvhBuildOptions {
        &self.options
    }

    /// The effective leaf limit of this tree.
    ///
    /// For grids this is a number of grids, for dynamic-topology meshes a number of faces.
    #[inline]
    pub fn leaf_limit(&self) -> usize {
        self.leaf_limit
    }

    /// All the nodes. The root is at index 0.
    #[inline]
    pub fn nodes(&self) -> &[PbvhNode] {
        &self.nodes
    }

    /// The number of nodes.
    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The node at index `node`.
    #[inline]
    pub fn node(&self, node: u32) -> &PbvhNode {
        &self.nodes[node as usize]
    }

    /// Mutable access to the node at index `node`, to tag it or cache its state.
    #[inline]
    pub fn node_mut(&mut self, node: u32) -> &mut PbvhNode {
        &mut self.nodes[node as usize]
    }

    /// The indices of all the leaves.
    pub fn leaves(&self) -> Vec<u32> {
        self.search_gather(|_| true)
    }

    /// The shared primitive array, reordered by the builder.
    #[inline]
    pub fn prim_indices(&self) -> &[u32] {
        &self.prim_indices
    }

    /// The primitives of a leaf: triangle indices or grid indices.
    #[inline]
    pub fn node_prim_indices(&self, node: u32) -> &[u32] {
        &self.prim_indices[self.nodes[node as usize].prim_range()]
    }

    /// The grids of a leaf of a grids tree.
    pub fn node_get_grid_indices(&self, node: u32) -> &[u32] {
        debug_assert_eq!(self.pbvh_type(), PbvhType::Grids);
        self.node_prim_indices(node)
    }

    /// The dimensions of the grids, if this tree is built on grids.
    pub fn grid_key(&self) -> Option<GridKey> {
        self.grids().map(|grids| grids.key())
    }

    /// The bounding box of the whole tree.
    #[inline]
    pub fn bounding_box(&self) -> Aabb {
        self.nodes[0].vb
    }

    /// The union of the boxes of every leaf tagged with `UPDATE_REDRAW`.
    pub fn redraw_bb(&self) -> Aabb {
        let mut result = Aabb::new_invalid();

        for leaf in self.search_gather(|node| {
            !node.is_leaf() || node.flag.contains(NodeFlags::UPDATE_REDRAW)
        }) {
            result.expand_with_bb(&self.nodes[leaf as usize].vb);
        }

        result
    }

    /// The frustum planes stored on this tree, if any.
    #[inline]
    pub fn frustum_planes(&self) -> Option<&FrustumPlanes> {
        self.frustum_planes.as_ref()
    }

    /// Stores frustum planes on this tree for later culling.
    pub fn set_frustum_planes(&mut self, planes: Option<FrustumPlanes>) {
        self.frustum_planes = planes;
    }

    /// Were the vertex positions replaced through [`Self::vert_coords_apply`]?
    #[inline]
    pub fn is_deformed(&self) -> bool {
        self.deformed
    }

    /// Is this tree being drawn?
    #[inline]
    pub fn is_drawing(&self) -> bool {
        self.is_drawing
    }

    /// Sets whether this tree is being drawn.
    pub fn set_drawing(&mut self, is_drawing: bool) {
        self.is_drawing = is_drawing;
    }

    /// Returns `true` if the draw cache was never built or was invalidated since the last
    /// draw.
    #[inline]
    pub fn draw_cache_invalid(&self) -> bool {
        self.draw_cache_invalid
    }

    /// The number of vertices of a leaf, as `(unique, total)`.
    pub fn node_num_verts(&self, node: u32) -> (usize, usize) {
        let n = &self.nodes[node as usize];

        match &self.data {
            PbvhData::Faces(_) => (n.uniq_verts as usize, n.vert_indices.len()),
            PbvhData::Grids(grids) => {
                let total = n.prim_count as usize * grids.key().grid_area as usize;
                (total, total)
            }
            PbvhData::BMesh(_) => (
                n.bm_unique_verts.len(),
                n.bm_unique_verts.len() + n.bm_other_verts.len(),
            ),
        }
    }

    /// The number of vertices owned by a leaf.
    pub fn node_num_unique_verts(&self, node: u32) -> usize {
        self.node_num_verts(node).0
    }

    /// The deduplicated base faces of a mesh or grids leaf.
    pub fn node_face_indices_calc(&self, node: u32) -> Vec<u32> {
        let face_map = match &self.data {
            PbvhData::Faces(mesh) => mesh.tri_faces(),
            PbvhData::Grids(grids) => grids.grid_to_face_map(),
            PbvhData::BMesh(_) => {
                debug_assert!(false, "dynamic-topology leaves do not reference base faces");
                return Vec::new();
            }
        };

        let faces: IndexSet<u32> = self
            .node_prim_indices(node)
            .iter()
            .map(|prim| face_map[*prim as usize])
            .collect();
        faces.into_iter().collect()
    }

    /// Marks every base face with at least one grid in one of the given leaves.
    pub fn nodes_to_face_selection_grids(&self, nodes: &[u32]) -> Vec<bool> {
        let Some(grids) = self.grids() else {
            debug_assert!(false, "not a grids tree");
            return Vec::new();
        };

        let mut selection = vec![false; grids.num_faces()];
        for node in nodes {
            for grid in self.node_prim_indices(*node) {
                selection[grids.grid_to_face_map()[*grid as usize] as usize] = true;
            }
        }

        selection
    }

    /// Calls `f` on the vertices of a leaf.
    pub fn for_each_vertex(&self, node: u32, mode: VertexIterMode, mut f: impl FnMut(PbvhVertex)) {
        let n = &self.nodes[node as usize];

        match &self.data {
            PbvhData::Faces(mesh) => {
                let verts = match mode {
                    VertexIterMode::All => &n.vert_indices[..],
                    VertexIterMode::Unique => &n.vert_indices[..n.uniq_verts as usize],
                };

                for vert in verts {
                    let i = *vert as usize;
                    f(PbvhVertex {
                        index: i,
                        co: mesh.positions()[i],
                        no: mesh.vert_normals()[i],
                        mask: mesh.mask().map(|m| m[i]).unwrap_or(0.0),
                        hidden: mesh.is_vert_hidden(i),
                    })
                }
            }
            PbvhData::Grids(grids) => {
                let area = grids.key().grid_area as usize;

                for grid in self.node_prim_indices(node) {
                    let start = *grid as usize * area;
                    for i in start..start + area {
                        f(PbvhVertex {
                            index: i,
                            co: grids.positions()[i],
                            no: grids.normals()[i],
                            mask: grids.masks().map(|m| m[i]).unwrap_or(0.0),
                            hidden: grids.grid_hidden().map(|h| h[i]).unwrap_or(false),
                        })
                    }
                }
            }
            PbvhData::BMesh(data) => {
                let others = match mode {
                    VertexIterMode::All => Some(&n.bm_other_verts),
                    VertexIterMode::Unique => None,
                };

                for key in n.bm_unique_verts.iter().chain(others.into_iter().flatten()) {
                    if let Some(v) = data.mesh.vert(*key) {
                        f(PbvhVertex {
                            index: *key,
                            co: v.co,
                            no: v.no,
                            mask: if data.mesh.has_mask() { v.mask } else { 0.0 },
                            hidden: v.hidden,
                        })
                    }
                }
            }
        }
    }

    /// A copy of every vertex position, indexed by global vertex index.
    ///
    /// For dynamic-topology meshes the array is indexed by vertex key, unused keys hold
    /// the origin. The result can be handed to the ray queries as original coordinates.
    pub fn vert_coords_get(&self) -> Vec<Point<Real>> {
        match &self.data {
            PbvhData::Faces(mesh) => mesh.positions().to_vec(),
            PbvhData::Grids(grids) => grids.positions().to_vec(),
            PbvhData::BMesh(data) => {
                let len = data.mesh.verts().map(|(k, _)| k + 1).max().unwrap_or(0);
                let mut result = vec![Point::origin(); len];
                for (key, vert) in data.mesh.verts() {
                    result[key] = vert.co;
                }
                result
            }
        }
    }

    /// Replaces every vertex position, then recomputes all the boxes.
    ///
    /// Every leaf is tagged with [`PbvhNode::mark_update`], and the original boxes are
    /// snapshot from the new positions.
    pub fn vert_coords_apply(&mut self, coords: &[Point<Real>]) {
        match &mut self.data {
            PbvhData::Faces(mesh) => {
                debug_assert_eq!(coords.len(), mesh.num_verts());
                for (dst, src) in mesh.positions_mut().iter_mut().zip(coords) {
                    *dst = *src;
                }
            }
            PbvhData::Grids(grids) => {
                debug_assert_eq!(coords.len(), grids.positions().len());
                for (dst, src) in grids.positions_mut().iter_mut().zip(coords) {
                    *dst = *src;
                }
            }
            PbvhData::BMesh(data) => {
                for (key, co) in coords.iter().enumerate() {
                    if let Some(v) = data.mesh.vert_mut(key) {
                        v.co = *co;
                    }
                }
            }
        }

        self.deformed = true;

        for node in &mut self.nodes {
            if node.is_leaf() {
                node.mark_update();
            }
        }

        self.update_bounds(NodeFlags::UPDATE_BB | NodeFlags::UPDATE_ORIGINAL_BB);
    }

    /// Attaches a zeroed displacement buffer, one vector per unique vertex, to a leaf.
    pub fn node_add_proxy(&mut self, node: u32) -> &mut [Vector<Real>] {
        let len = self.node_num_unique_verts(node);
        let proxies = &mut self.nodes[node as usize].proxies;
        proxies.push(vec![Vector::zeros(); len]);
        let last = proxies.len() - 1;
        &mut proxies[last]
    }

    /// Frees all the displacement buffers of a leaf.
    pub fn node_free_proxies(&mut self, node: u32) {
        self.nodes[node as usize].proxies.clear();
    }

    /// The leaves carrying at least one displacement buffer.
    pub fn gather_proxies(&self) -> Vec<u32> {
        self.search_gather(|node| !node.is_leaf() || !node.proxies.is_empty())
    }

    /// Hides base faces from their hidden vertices, then tags every leaf for a
    /// visibility update.
    ///
    /// A mesh face is hidden if any of its vertices is. A base face of grids is hidden if
    /// the last sample of any of its grids is, and its grids then become fully hidden. A
    /// dynamic-topology face is hidden if any of its vertices is.
    pub fn sync_visibility_from_verts(&mut self) {
        match &mut self.data {
            PbvhData::Faces(mesh) => mesh.flush_hide_vert_to_faces(),
            PbvhData::Grids(grids) => {
                grids.flush_grid_hidden_to_faces();

                let hidden_faces: Vec<usize> = grids
                    .hide_poly()
                    .map(|hide| {
                        hide.iter()
                            .enumerate()
                            .filter_map(|(face, hidden)| hidden.then_some(face))
                            .collect()
                    })
                    .unwrap_or_default();

                for face in hidden_faces {
                    for grid in grids.face_grids(face) {
                        grids.set_grid_hidden(grid, true);
                    }
                }
            }
            PbvhData::BMesh(data) => {
                let faces: Vec<(usize, bool)> = data
                    .mesh
                    .faces()
                    .map(|(key, face)| {
                        let hidden = face
                            .verts()
                            .iter()
                            .any(|v| data.mesh.vert(*v).map(|v| v.hidden).unwrap_or(false));
                        (key, hidden)
                    })
                    .collect();

                for (key, hidden) in faces {
                    if let Some(face) = data.mesh.face_mut(key) {
                        face.hidden = hidden;
                    }
                }
            }
        }

        for node in &mut self.nodes {
            if node.is_leaf() {
                node.mark_update_visibility();
            }
        }
    }

    /// Recomputes the `FULLY_HIDDEN` bit of every leaf from the face hide state.
    ///
    /// Leaves whose bit changes are tagged for a draw-buffer rebuild.
    pub fn update_hide_from_mesh(&mut self) {
        let Self {
            nodes,
            prim_indices,
            data,
            ..
        } = self;

        for node in nodes.iter_mut().filter(|n| n.is_leaf()) {
            let prims = &prim_indices[node.prim_range()];
            let fully_hidden = match data {
                PbvhData::Faces(mesh) => mesh.hide_poly().is_some_and(|hide| {
                    prims
                        .iter()
                        .all(|tri| hide[mesh.tri_faces()[*tri as usize] as usize])
                }),
                PbvhData::Grids(grids) => {
                    let gs = grids.key().grid_size;
                    count_grid_quads(grids.grid_hidden(), prims, grids.key(), gs) == 0
                }
                PbvhData::BMesh(data) => !node
                    .bm_faces
                    .iter()
                    .any(|f| data.mesh.face(*f).is_some_and(|f| !f.hidden)),
            };

            if fully_hidden != node.fully_hidden() {
                node.fully_hidden_set(fully_hidden);
                node.mark_rebuild_draw();
            }
        }
    }
}

/// The number of visible quads of the given grids.
///
/// `grid_hidden` holds one flag per sample of every grid. When the grids are displayed at
/// a coarser `display_grid_size`, only one quad out of `skip` along each side is counted.
pub fn count_grid_quads(
    grid_hidden: Option<&[bool]>,
    grid_indices: &[u32],
    key: GridKey,
    display_grid_size: u32,
) -> usize {
    let gs = key.grid_size as usize;
    let area = key.grid_area as usize;

    let Some(grid_hidden) = grid_hidden else {
        return key.quads_per_grid() * grid_indices.len();
    };

    let depth1 = ((key.grid_size as f64 - 1.0).log2() + f64::EPSILON) as i32;
    let depth2 = ((display_grid_size as f64 - 1.0).log2() + f64::EPSILON) as i32;
    let skip = if depth2 < depth1 {
        1usize << (depth1 - depth2 - 1)
    } else {
        1
    };

    let mut totquad = 0;

    for grid in grid_indices {
        let start = *grid as usize * area;
        let gh = &grid_hidden[start..start + area];

        for y in (0..gs - skip).step_by(skip) {
            for x in (0..gs - skip).step_by(skip) {
                if !paint_is_grid_face_hidden(gh, gs, x, y) {
                    totquad += 1;
                }
            }
        }
    }

    totquad
}

#[cfg(test)]
mod test {
    use super::count_grid_quads;
    use crate::mesh::GridKey;

    #[test]
    fn grid_quad_count_honors_hidden_samples() {
        let key = GridKey::new(3);
        assert_eq!(count_grid_quads(None, &[0, 1], key, 3), 8);

        let mut hidden = vec![false; 18];
        assert_eq!(count_grid_quads(Some(&hidden), &[0, 1], key, 3), 8);

        // The central sample of the second grid touches its four quads.
        hidden[9 + 4] = true;
        assert_eq!(count_grid_quads(Some(&hidden), &[0, 1], key, 3), 4);
        assert_eq!(count_grid_quads(Some(&hidden), &[1], key, 3), 0);
    }
}
