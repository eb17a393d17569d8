//! Spatial partitioning tools.

pub use self::pbvh::{
    count_grid_quads, BatchHandle, DrawBackend, DynTopoData, GpuArgs, GpuMeshArgs, NodeFlags, Pbvh,
    PbvhBuildError, PbvhBuildOptions, PbvhData, PbvhNode, PbvhType, PbvhVertex, RaycastHit,
    VertexIterMode,
};

pub mod pbvh;
