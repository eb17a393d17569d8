//! Squared distances between a ray and segments, boxes and triangles.
//!
//! All the functions of this module expect a ray with a unit-length direction.

use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector, DIM};
use crate::query::Ray;

/// The result of a ray-distance computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayDistance {
    /// Squared distance between the ray and the closest point.
    pub dist_sq: Real,
    /// The point of the tested geometry closest to the ray.
    pub point: Point<Real>,
    /// Position of the projection of `point` along the ray.
    pub depth: Real,
}

/// Parameter along the line `v0 -> v1` of its point closest to the ray line.
///
/// Returns `None` if both lines are parallel.
fn closest_ray_line_param(ray: &Ray, v0: &Point<Real>, v1: &Point<Real>) -> Option<Real> {
    let a = v1 - v0;
    let t = v0 - ray.origin;
    let n = a.cross(&ray.dir);
    let nlen = n.norm_squared();

    if nlen == 0.0 {
        return None;
    }

    let c = n - t;
    let cray = c.cross(&ray.dir);
    Some(cray.dot(&n) / nlen)
}

/// Squared distance between a ray and the segment `[v0, v1]`.
pub fn dist_squared_ray_to_seg(ray: &Ray, v0: &Point<Real>, v1: &Point<Real>) -> RayDistance {
    let point = match closest_ray_line_param(ray, v0, v1) {
        Some(lambda) if lambda <= 0.0 => *v0,
        Some(lambda) if lambda >= 1.0 => *v1,
        Some(lambda) => v0 + (v1 - v0) * lambda,
        // Parallel lines: any point of the segment is as close as the others.
        None => *v0,
    };

    let dvec = point - ray.origin;
    let depth = dvec.dot(&ray.dir);

    RayDistance {
        dist_sq: dvec.norm_squared() - depth * depth,
        point,
        depth,
    }
}

/// Approximate squared distance between a ray and a triangle.
///
/// Only the edges of the triangle are considered: a ray crossing the triangle interior
/// reports the distance to the closest edge.
pub fn dist_squared_ray_to_tri_fast(
    ray: &Ray,
    v0: &Point<Real>,
    v1: &Point<Real>,
    v2: &Point<Real>,
) -> RayDistance {
    let tri = [v0, v1, v2];
    let mut best = dist_squared_ray_to_seg(ray, tri[0], tri[2]);

    for (i, j) in [(1, 0), (2, 1)] {
        let test = dist_squared_ray_to_seg(ray, tri[i], tri[j]);
        if test.dist_sq < best.dist_sq {
            best = test;
        }
    }

    best
}

/// Updates `dist_sq` and `depth` if the triangle is closer to the ray than `dist_sq`.
pub fn ray_face_nearest_tri(
    ray: &Ray,
    t0: &Point<Real>,
    t1: &Point<Real>,
    t2: &Point<Real>,
    depth: &mut Real,
    dist_sq: &mut Real,
) -> bool {
    let test = dist_squared_ray_to_tri_fast(ray, t0, t1, t2);

    if test.dist_sq < *dist_sq {
        *dist_sq = test.dist_sq;
        *depth = test.depth;
        true
    } else {
        false
    }
}

/// Updates `dist_sq` and `depth` if the quad `(t0, t1, t2, t3)` is closer to the ray than
/// `dist_sq`.
///
/// The second triangle `(t0, t2, t3)` is only tested when the first one is not closer.
pub fn ray_face_nearest_quad(
    ray: &Ray,
    t0: &Point<Real>,
    t1: &Point<Real>,
    t2: &Point<Real>,
    t3: &Point<Real>,
    depth: &mut Real,
    dist_sq: &mut Real,
) -> bool {
    ray_face_nearest_tri(ray, t0, t1, t2, depth, dist_sq)
        || ray_face_nearest_tri(ray, t0, t2, t3, depth, dist_sq)
}

/// Ray data precomputed once per query for squared ray-box distances.
#[derive(Debug, Clone, Copy)]
pub struct DistRayAabbPrecalc {
    ray: Ray,
    inv_dir: Vector<Real>,
}

impl DistRayAabbPrecalc {
    /// Precomputes the data for `ray`, whose direction must be normalized.
    pub fn new(ray: &Ray) -> Self {
        Self {
            ray: *ray,
            inv_dir: ray
                .dir
                .map(|e| if e != 0.0 { 1.0 / e } else { Real::MAX }),
        }
    }

    /// Squared distance between the ray and `aabb`.
    ///
    /// The distance is zero if the ray line crosses the box. Otherwise it is the distance
    /// to the box edge closest to the ray.
    pub fn dist_squared(&self, aabb: &Aabb) -> RayDistance {
        let dir = &self.ray.dir;
        let origin = &self.ray.origin;

        // Corners of the box closest to and farthest from the ray origin along its direction.
        let mut near = Point::origin();
        let mut far = Point::origin();
        for i in 0..DIM {
            if dir[i] < 0.0 {
                near[i] = aabb.maxs[i];
                far[i] = aabb.mins[i];
            } else {
                near[i] = aabb.mins[i];
                far[i] = aabb.maxs[i];
            }
        }

        let tmin = (near - origin).component_mul(&self.inv_dir);
        let tmax = (far - origin).component_mul(&self.inv_dir);

        // `va` and `vb` are the end points of the box edge closest to the ray.
        let mut va = Point::origin();
        let mut vb = Point::origin();
        let mut main_axis: isize;

        let rtmax = if tmax[0] <= tmax[1] && tmax[0] <= tmax[2] {
            va[0] = far[0];
            vb[0] = far[0];
            main_axis = 3;
            tmax[0]
        } else if tmax[1] <= tmax[0] && tmax[1] <= tmax[2] {
            va[1] = far[1];
            vb[1] = far[1];
            main_axis = 2;
            tmax[1]
        } else {
            va[2] = far[2];
            vb[2] = far[2];
            main_axis = 1;
            tmax[2]
        };

        let rtmin = if tmin[0] >= tmin[1] && tmin[0] >= tmin[2] {
            va[0] = near[0];
            vb[0] = near[0];
            main_axis -= 3;
            tmin[0]
        } else if tmin[1] >= tmin[0] && tmin[1] >= tmin[2] {
            va[1] = near[1];
            vb[1] = near[1];
            main_axis -= 1;
            tmin[1]
        } else {
            va[2] = near[2];
            vb[2] = near[2];
            main_axis -= 2;
            tmin[2]
        };

        if main_axis < 0 {
            main_axis += 3;
        }

        if rtmin <= rtmax {
            return RayDistance {
                dist_sq: 0.0,
                point: far,
                depth: (far - origin).dot(dir),
            };
        }

        let main_axis = main_axis as usize;
        if dir[main_axis] >= 0.0 {
            va[main_axis] = near[main_axis];
            vb[main_axis] = far[main_axis];
        } else {
            va[main_axis] = far[main_axis];
            vb[main_axis] = near[main_axis];
        }

        dist_squared_ray_to_seg(&self.ray, &va, &vb)
    }
}

#[cfg(test)]
mod test {
    use super::{dist_squared_ray_to_seg, dist_squared_ray_to_tri_fast, DistRayAabbPrecalc};
    use crate::bounding_volume::Aabb;
    use crate::math::{Point, Vector};
    use crate::query::Ray;
    use approx::assert_relative_eq;

    #[test]
    fn segment_crossing_below_the_ray() {
        let ray = Ray::new(Point::new(0.0, 0.0, 10.0), Vector::new(0.0, 0.0, -1.0));
        let d = dist_squared_ray_to_seg(
            &ray,
            &Point::new(-1.0, 2.0, 0.0),
            &Point::new(1.0, 2.0, 0.0),
        );
        assert_relative_eq!(d.dist_sq, 4.0);
        assert_relative_eq!(d.depth, 10.0);
        assert_relative_eq!(d.point, Point::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn segment_end_point_is_clamped() {
        let ray = Ray::new(Point::new(0.0, 0.0, 10.0), Vector::new(0.0, 0.0, -1.0));
        let d = dist_squared_ray_to_seg(
            &ray,
            &Point::new(1.0, 0.0, 0.0),
            &Point::new(3.0, 0.0, 0.0),
        );
        assert_relative_eq!(d.dist_sq, 1.0);
        assert_relative_eq!(d.point, Point::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn triangle_distance_uses_edges() {
        let ray = Ray::new(Point::new(5.0, 0.0, 10.0), Vector::new(0.0, 0.0, -1.0));
        let d = dist_squared_ray_to_tri_fast(
            &ray,
            &Point::new(0.0, -1.0, 0.0),
            &Point::new(2.0, 0.0, 0.0),
            &Point::new(0.0, 1.0, 0.0),
        );
        assert_relative_eq!(d.dist_sq, 9.0, epsilon = 1.0e-5);
    }

    #[test]
    fn ray_through_box_has_zero_distance() {
        let ray = Ray::new(Point::new(0.0, 0.0, 10.0), Vector::new(0.0, 0.0, -1.0));
        let aabb = Aabb::new(Point::new(-1.0, -1.0, -1.0), Point::new(1.0, 1.0, 1.0));
        let d = DistRayAabbPrecalc::new(&ray).dist_squared(&aabb);
        assert_eq!(d.dist_sq, 0.0);
        assert!(d.depth > 0.0);
    }

    #[test]
    fn ray_beside_box_measures_edge_distance() {
        let ray = Ray::new(Point::new(3.0, 0.0, 10.0), Vector::new(0.0, 0.0, -1.0));
        let aabb = Aabb::new(Point::new(-1.0, -1.0, -1.0), Point::new(1.0, 1.0, 1.0));
        let d = DistRayAabbPrecalc::new(&ray).dist_squared(&aabb);
        assert_relative_eq!(d.dist_sq, 4.0, epsilon = 1.0e-5);
    }
}
