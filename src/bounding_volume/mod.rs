//! Bounding volumes.

#[doc(inline)]
pub use crate::bounding_volume::aabb::Aabb;
#[doc(inline)]
pub use crate::bounding_volume::aabb_centroid::CentroidAabb;

#[doc(hidden)]
pub mod aabb;
#[doc(hidden)]
pub mod aabb_centroid;
