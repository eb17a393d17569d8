use super::BatchHandle;
use crate::bounding_volume::Aabb;
use crate::math::{Real, Vector};
use crate::mesh::{FaceKey, VertKey};
use crate::utils::HashSet;
use core::ops::Range;

#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(transparent)]
/// State bits of a tree node.
///
/// Besides [`NodeFlags::LEAF`], most bits tag a cached quantity as stale. Each update pass
/// of [`Pbvh`](super::Pbvh) clears exactly the bits it serviced.
pub struct NodeFlags(u32);

bitflags::bitflags! {
    impl NodeFlags: u32 {
        /// The node has no children and owns a range of primitives.
        const LEAF = 1;
        /// Vertex normals must be recomputed.
        const UPDATE_NORMALS = 1 << 1;
        /// The current bounding box must be recomputed.
        const UPDATE_BB = 1 << 2;
        /// The original bounding box must be snapshot from the current one.
        const UPDATE_ORIGINAL_BB = 1 << 3;
        /// The draw buffers must be refreshed.
        const UPDATE_DRAW_BUFFERS = 1 << 4;
        /// The node must be redrawn.
        const UPDATE_REDRAW = 1 << 5;
        /// The cached mask state must be recomputed.
        const UPDATE_MASK = 1 << 6;
        /// The cached visibility state must be recomputed.
        const UPDATE_VISIBILITY = 1 << 7;
        /// The draw buffers must be recreated from scratch.
        const REBUILD_DRAW_BUFFERS = 1 << 8;
        /// Every element of the leaf is hidden.
        const FULLY_HIDDEN = 1 << 9;
        /// Every vertex of the leaf is fully masked.
        const FULLY_MASKED = 1 << 10;
        /// No vertex of the leaf is masked.
        const FULLY_UNMASKED = 1 << 11;
        /// The topology of a dynamic-topology leaf changed.
        const UPDATE_TOPOLOGY = 1 << 12;
        /// Vertex colors changed.
        const UPDATE_COLOR = 1 << 13;
        /// The leaf is a leaf of a texture-painting sub-tree.
        const TEX_LEAF = 1 << 14;
        /// Curvature directions must be recomputed.
        const UPDATE_CURVATURE_DIR = 1 << 15;
    }
}

static_assertions::assert_eq_size!(NodeFlags, u32);

/// A node of a [`Pbvh`](super::Pbvh).
///
/// A node is either a leaf, owning a range of the primitive array of the tree, or an
/// internal node with exactly two children stored at `children_offset` and
/// `children_offset + 1`.
#[derive(Clone, Debug, Default)]
pub struct PbvhNode {
    pub(crate) flag: NodeFlags,
    pub(crate) vb: Aabb,
    pub(crate) orig_vb: Aabb,
    pub(crate) children_offset: u32,
    pub(crate) prim_start: u32,
    pub(crate) prim_count: u32,
    /// Mesh leaves: the vertices of the leaf triangles, the ones owned by this leaf first.
    pub(crate) vert_indices: Vec<u32>,
    pub(crate) uniq_verts: u32,
    /// Mesh leaves: per triangle, the indices of its corners in `vert_indices`.
    pub(crate) face_vert_indices: Vec<[u32; 3]>,
    pub(crate) bm_faces: HashSet<FaceKey>,
    pub(crate) bm_unique_verts: HashSet<VertKey>,
    pub(crate) bm_other_verts: HashSet<VertKey>,
    pub(crate) tmin: Real,
    pub(crate) updategen: u32,
    pub(crate) debug_draw_gen: u32,
    pub(crate) proxies: Vec<Vec<Vector<Real>>>,
    pub(crate) draw_batches: Option<BatchHandle>,
}

impl PbvhNode {
    pub(crate) fn new_leaf() -> Self {
        Self {
            flag: NodeFlags::LEAF,
            ..Default::default()
        }
    }

    /// Is this node a leaf?
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flag.contains(NodeFlags::LEAF)
    }

    /// The state bits of this node.
    #[inline]
    pub fn flag(&self) -> NodeFlags {
        self.flag
    }

    /// The current bounding box.
    ///
    /// For internal nodes, this is the union of the boxes of both children.
    #[inline]
    pub fn vb(&self) -> &Aabb {
        &self.vb
    }

    /// The bounding box snapshot taken the last time `UPDATE_ORIGINAL_BB` was processed.
    #[inline]
    pub fn orig_vb(&self) -> &Aabb {
        &self.orig_vb
    }

    /// Index of the first child, or `0` for leaves.
    #[inline]
    pub fn children_offset(&self) -> u32 {
        self.children_offset
    }

    /// The indices of both children if this is an internal node.
    #[inline]
    pub fn children(&self) -> Option<[u32; 2]> {
        (!self.is_leaf()).then_some([self.children_offset, self.children_offset + 1])
    }

    /// The range of the tree primitive array referenced by this leaf.
    #[inline]
    pub fn prim_range(&self) -> Range<usize> {
        self.prim_start as usize..(self.prim_start + self.prim_count) as usize
    }

    /// The number of primitives of this leaf.
    #[inline]
    pub fn prim_count(&self) -> usize {
        self.prim_count as usize
    }

    /// Mesh leaves: all the vertices used by the leaf triangles.
    ///
    /// The first [`Self::unique_vert_count`] ones are owned by this leaf.
    #[inline]
    pub fn vert_indices(&self) -> &[u32] {
        &self.vert_indices
    }

    /// Mesh leaves: the number of vertices owned by this leaf.
    #[inline]
    pub fn unique_vert_count(&self) -> usize {
        self.uniq_verts as usize
    }

    /// Mesh leaves: the local corner indices of each triangle.
    #[inline]
    pub fn face_vert_indices(&self) -> &[[u32; 3]] {
        &self.face_vert_indices
    }

    /// Dynamic-topology leaves: the faces of this leaf.
    #[inline]
    pub fn bm_faces(&self) -> &HashSet<FaceKey> {
        &self.bm_faces
    }

    /// Dynamic-topology leaves: the vertices owned by this leaf.
    #[inline]
    pub fn bm_unique_verts(&self) -> &HashSet<VertKey> {
        &self.bm_unique_verts
    }

    /// Dynamic-topology leaves: the vertices used by this leaf but owned by another.
    #[inline]
    pub fn bm_other_verts(&self) -> &HashSet<VertKey> {
        &self.bm_other_verts
    }

    /// Distance along the ray (or squared distance to it) computed for this node by the
    /// last ray query.
    #[inline]
    pub fn tmin(&self) -> Real {
        self.tmin
    }

    /// The number of times the draw buffers of this node were refreshed.
    #[inline]
    pub fn updategen(&self) -> u32 {
        self.updategen
    }

    /// Debug counter bumped every time the draw buffers of this node are touched.
    #[inline]
    pub fn debug_draw_gen(&self) -> u32 {
        self.debug_draw_gen
    }

    /// The draw batch of this node, if any was created.
    #[inline]
    pub fn draw_batches(&self) -> Option<BatchHandle> {
        self.draw_batches
    }

    /// The displacement buffers attached to this node.
    #[inline]
    pub fn proxies(&self) -> &[Vec<Vector<Real>>] {
        &self.proxies
    }

    /// Tags every cached geometric quantity as stale.
    pub fn mark_update(&mut self) {
        self.flag |= NodeFlags::UPDATE_NORMALS
            | NodeFlags::UPDATE_BB
            | NodeFlags::UPDATE_ORIGINAL_BB
            | NodeFlags::UPDATE_DRAW_BUFFERS
            | NodeFlags::UPDATE_REDRAW
            | NodeFlags::UPDATE_CURVATURE_DIR;
    }

    /// Tags the mask state as stale.
    pub fn mark_update_mask(&mut self) {
        self.flag |=
            NodeFlags::UPDATE_MASK | NodeFlags::UPDATE_DRAW_BUFFERS | NodeFlags::UPDATE_REDRAW;
    }

    /// Tags the vertex colors as stale.
    pub fn mark_update_color(&mut self) {
        self.flag |=
            NodeFlags::UPDATE_COLOR | NodeFlags::UPDATE_DRAW_BUFFERS | NodeFlags::UPDATE_REDRAW;
    }

    /// Tags the visibility state as stale.
    pub fn mark_update_visibility(&mut self) {
        self.flag |= NodeFlags::UPDATE_VISIBILITY
            | NodeFlags::REBUILD_DRAW_BUFFERS
            | NodeFlags::UPDATE_DRAW_BUFFERS
            | NodeFlags::UPDATE_REDRAW;
    }

    /// Requests the draw buffers to be recreated from scratch.
    pub fn mark_rebuild_draw(&mut self) {
        self.flag |= NodeFlags::REBUILD_DRAW_BUFFERS
            | NodeFlags::UPDATE_DRAW_BUFFERS
            | NodeFlags::UPDATE_REDRAW;
    }

    /// Requests a redraw of this node.
    pub fn mark_redraw(&mut self) {
        self.flag |= NodeFlags::UPDATE_DRAW_BUFFERS | NodeFlags::UPDATE_REDRAW;
    }

    /// Tags the vertex normals as stale.
    pub fn mark_normals_update(&mut self) {
        self.flag |= NodeFlags::UPDATE_NORMALS;
    }

    /// Tags everything depending on vertex positions, except the original box, as stale.
    pub fn mark_positions_update(&mut self) {
        self.flag |= NodeFlags::UPDATE_NORMALS
            | NodeFlags::UPDATE_DRAW_BUFFERS
            | NodeFlags::UPDATE_REDRAW
            | NodeFlags::UPDATE_BB;
    }

    /// Requests the original box to be snapshot from the current one.
    pub fn mark_original_update(&mut self) {
        self.flag |= NodeFlags::UPDATE_ORIGINAL_BB;
    }

    /// Sets or clears the curvature-direction update request.
    pub fn curvature_update_set(&mut self, state: bool) {
        self.flag.set(NodeFlags::UPDATE_CURVATURE_DIR, state);
    }

    /// Are curvature directions stale?
    pub fn curvature_update_get(&self) -> bool {
        self.flag.contains(NodeFlags::UPDATE_CURVATURE_DIR)
    }

    /// Is every element of this leaf hidden?
    #[inline]
    pub fn fully_hidden(&self) -> bool {
        self.flag.contains(NodeFlags::FULLY_HIDDEN) && self.is_leaf()
    }

    /// Caches whether every element of this leaf is hidden.
    pub fn fully_hidden_set(&mut self, fully_hidden: bool) {
        debug_assert!(self.is_leaf());
        self.flag.set(NodeFlags::FULLY_HIDDEN, fully_hidden);
    }

    /// Is every vertex of this leaf fully masked?
    #[inline]
    pub fn fully_masked(&self) -> bool {
        self.flag.contains(NodeFlags::FULLY_MASKED) && self.is_leaf()
    }

    /// Caches whether every vertex of this leaf is fully masked.
    pub fn fully_masked_set(&mut self, fully_masked: bool) {
        debug_assert!(self.is_leaf());
        self.flag.set(NodeFlags::FULLY_MASKED, fully_masked);
    }

    /// Is no vertex of this leaf masked?
    #[inline]
    pub fn fully_unmasked(&self) -> bool {
        self.flag.contains(NodeFlags::FULLY_UNMASKED) && self.is_leaf()
    }

    /// Caches whether no vertex of this leaf is masked.
    pub fn fully_unmasked_set(&mut self, fully_unmasked: bool) {
        debug_assert!(self.is_leaf());
        self.flag.set(NodeFlags::FULLY_UNMASKED, fully_unmasked);
    }
}

#[cfg(test)]
mod test {
    use super::{NodeFlags, PbvhNode};

    #[test]
    fn mark_family_sets_expected_bits() {
        let mut node = PbvhNode::new_leaf();
        node.mark_update_mask();
        assert_eq!(
            node.flag(),
            NodeFlags::LEAF
                | NodeFlags::UPDATE_MASK
                | NodeFlags::UPDATE_DRAW_BUFFERS
                | NodeFlags::UPDATE_REDRAW
        );

        let mut node = PbvhNode::new_leaf();
        node.mark_update_visibility();
        assert!(node.flag().contains(NodeFlags::REBUILD_DRAW_BUFFERS));
        assert!(!node.flag().contains(NodeFlags::UPDATE_BB));

        let mut node = PbvhNode::new_leaf();
        node.mark_update();
        assert!(node
            .flag()
            .contains(NodeFlags::UPDATE_ORIGINAL_BB | NodeFlags::UPDATE_NORMALS));
        assert!(node.curvature_update_get());
        node.curvature_update_set(false);
        assert!(!node.curvature_update_get());
    }

    #[test]
    fn tri_state_bits_only_read_on_leaves() {
        let mut node = PbvhNode::new_leaf();
        node.fully_hidden_set(true);
        node.fully_masked_set(true);
        assert!(node.fully_hidden());
        assert!(node.fully_masked());
        assert!(!node.fully_unmasked());

        node.flag.remove(NodeFlags::LEAF);
        assert!(!node.fully_hidden());
    }
}
