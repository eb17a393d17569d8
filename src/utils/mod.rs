//! Various unsorted geometrical and logical operators.

pub use self::ccw_face_normal::{ccw_face_normal, ccw_polygon_normal, ccw_quad_normal};
pub use self::grouped_indices::GroupedIndices;
pub use self::hashmap::HashMap;
pub use self::hashset::HashSet;
pub use self::parallel::ParallelSettings;

mod ccw_face_normal;
mod grouped_indices;
pub mod hashmap;
pub mod hashset;
pub(crate) mod parallel;
