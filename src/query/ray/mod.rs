//! Ray-casting and ray-distance primitives.

pub use self::ray::Ray;
pub use self::ray_aabb::RayAabbPrecalc;
pub use self::ray_distance::{
    dist_squared_ray_to_seg, dist_squared_ray_to_tri_fast, ray_face_nearest_quad,
    ray_face_nearest_tri, DistRayAabbPrecalc, RayDistance,
};
pub use self::ray_triangle::{
    ray_face_intersection_quad, ray_face_intersection_tri, WatertightRayPrecalc,
};

#[doc(hidden)]
pub mod ray;
mod ray_aabb;
mod ray_distance;
mod ray_triangle;
