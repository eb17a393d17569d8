//! Non-persistent geometric queries used by the tree.
//!
//! * [`Ray`] together with [`RayAabbPrecalc`] for slab tests against node boxes and
//!   [`WatertightRayPrecalc`] for ray-triangle tests against leaf primitives.
//! * [`DistRayAabbPrecalc`] and the `dist_squared_ray_to_*` functions for the
//!   nearest-to-ray queries.
//! * [`FrustumPlanes`] for view-frustum classification of node boxes.

pub use self::frustum::{test_frustum_aabb, FrustumPlanes, PlaneAabbIntersection};
pub use self::ray::{
    dist_squared_ray_to_seg, dist_squared_ray_to_tri_fast, ray_face_intersection_quad,
    ray_face_intersection_tri, ray_face_nearest_quad, ray_face_nearest_tri,
    DistRayAabbPrecalc, Ray, RayAabbPrecalc, RayDistance, WatertightRayPrecalc,
};

mod frustum;
mod ray;
