//! A polygon bounding-volume hierarchy for sculpting.
//!
//! The tree is built once over a [`FacesMesh`](crate::mesh::FacesMesh), a set of
//! [`SubdivGrids`](crate::mesh::SubdivGrids) or a [`DynTopoMesh`](crate::mesh::DynTopoMesh).
//! Nodes live in a flat array and reference each other through `u32` indices: the two
//! children of an internal node are always stored next to each other.

pub use pbvh_bmesh::DynTopoData;
pub use pbvh_draw::{BatchHandle, DrawBackend, GpuArgs, GpuMeshArgs};
pub use pbvh_node::{NodeFlags, PbvhNode};
pub use pbvh_queries::RaycastHit;
pub use pbvh_tree::{
    count_grid_quads, Pbvh, PbvhBuildError, PbvhBuildOptions, PbvhData, PbvhType, PbvhVertex,
    VertexIterMode,
};

/// The maximum depth of the tree.
///
/// Ranges deeper than this become leaves regardless of their size.
pub const PBVH_STACK_FIXED_DEPTH: usize = 100;

mod pbvh_bmesh;
mod pbvh_build;
mod pbvh_draw;
mod pbvh_node;
mod pbvh_queries;
mod pbvh_traverse;
mod pbvh_tree;
mod pbvh_update;
mod pbvh_validation;
