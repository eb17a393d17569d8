//! The backing representations a tree can be built over.
//!
//! * [`FacesMesh`]: a polygon mesh, triangulated into corner triangles.
//! * [`SubdivGrids`]: multires grids, one square grid of samples per face corner.
//! * [`DynTopoMesh`]: a triangle mesh whose topology changes while sculpting.
//!
//! These types only hold the data and its topology maps. The tree owns one of them and
//! is responsible for keeping its nodes consistent with it.

pub use self::dyntopo::{DynFace, DynTopoError, DynTopoMesh, DynVert, FaceKey, VertKey};
pub use self::faces::{FacesMesh, MeshBuilderError};
pub use self::grids::{paint_is_grid_face_hidden, GridKey, GridsBuilderError, SubdivGrids};

mod dyntopo;
mod faces;
mod grids;
