use crate::math::{Point, Real, Vector};
use crate::query::Ray;

/// Per-ray data for the watertight ray-triangle test.
///
/// The ray is transformed into a space where its dominant axis is `z` and its direction is
/// `(0, 0, 1)`, then triangles are tested with 2D edge functions. Edges shared by two
/// triangles are never missed nor hit twice.
///
/// See "Watertight Ray/Triangle Intersection", Woop, Benthin, Wald (JCGT 2013).
#[derive(Debug, Clone, Copy)]
pub struct WatertightRayPrecalc {
    kx: usize,
    ky: usize,
    kz: usize,
    sx: Real,
    sy: Real,
    sz: Real,
}

fn axis_dominant(v: &Vector<Real>) -> usize {
    let (x, y, z) = (v.x.abs(), v.y.abs(), v.z.abs());

    if x > y {
        if x > z {
            0
        } else {
            2
        }
    } else if y > z {
        1
    } else {
        2
    }
}

impl WatertightRayPrecalc {
    /// Precomputes the shear transform for rays with the given direction.
    pub fn new(dir: &Vector<Real>) -> Self {
        let kz = axis_dominant(dir);
        let mut kx = (kz + 1) % 3;
        let mut ky = (kx + 1) % 3;

        // Preserve the winding of the triangles.
        if dir[kz] < 0.0 {
            core::mem::swap(&mut kx, &mut ky);
        }

        let inv_dir_z = 1.0 / dir[kz];

        Self {
            kx,
            ky,
            kz,
            sx: dir[kx] * inv_dir_z,
            sy: dir[ky] * inv_dir_z,
            sz: inv_dir_z,
        }
    }

    /// Intersects the ray starting at `origin` with the triangle `(a, b, c)`.
    ///
    /// Returns the hit distance along the ray direction, and the barycentric coordinates
    /// of the hit associated to `a` and `b`. Hits behind the origin are rejected.
    pub fn intersect(
        &self,
        origin: &Point<Real>,
        a: &Point<Real>,
        b: &Point<Real>,
        c: &Point<Real>,
    ) -> Option<(Real, [Real; 2])> {
        let (kx, ky, kz) = (self.kx, self.ky, self.kz);

        let a = a - origin;
        let b = b - origin;
        let c = c - origin;

        let ax = a[kx] - self.sx * a[kz];
        let ay = a[ky] - self.sy * a[kz];
        let bx = b[kx] - self.sx * b[kz];
        let by = b[ky] - self.sy * b[kz];
        let cx = c[kx] - self.sx * c[kz];
        let cy = c[ky] - self.sy * c[kz];

        let u = cx * by - cy * bx;
        let v = ax * cy - ay * cx;
        let w = bx * ay - by * ax;

        if (u < 0.0 || v < 0.0 || w < 0.0) && (u > 0.0 || v > 0.0 || w > 0.0) {
            return None;
        }

        let det = u + v + w;

        if det == 0.0 || !det.is_finite() {
            return None;
        }

        // Scaled hit distance, still needs to be divided by `det`.
        let t = (u * a[kz] + v * b[kz] + w * c[kz]) * self.sz;
        let sign_t = if det < 0.0 { -t } else { t };

        if sign_t < 0.0 {
            return None;
        }

        let inv_det = 1.0 / det;
        Some((t * inv_det, [u * inv_det, v * inv_det]))
    }
}

/// Intersects `ray` with a triangle, keeping the hit only if it is closer than `depth`.
///
/// On success `depth` is updated and `true` is returned.
pub fn ray_face_intersection_tri(
    ray: &Ray,
    precalc: &WatertightRayPrecalc,
    t0: &Point<Real>,
    t1: &Point<Real>,
    t2: &Point<Real>,
    depth: &mut Real,
) -> bool {
    match precalc.intersect(&ray.origin, t0, t1, t2) {
        Some((depth_test, _)) if depth_test < *depth => {
            *depth = depth_test;
            true
        }
        _ => false,
    }
}

/// Intersects `ray` with the quad `(t0, t1, t2, t3)` split into the triangles
/// `(t0, t1, t2)` and `(t0, t2, t3)`, keeping the hit only if it is closer than `depth`.
pub fn ray_face_intersection_quad(
    ray: &Ray,
    precalc: &WatertightRayPrecalc,
    t0: &Point<Real>,
    t1: &Point<Real>,
    t2: &Point<Real>,
    t3: &Point<Real>,
    depth: &mut Real,
) -> bool {
    ray_face_intersection_tri(ray, precalc, t0, t1, t2, depth)
        || ray_face_intersection_tri(ray, precalc, t0, t2, t3, depth)
}

#[cfg(test)]
mod test {
    use super::{ray_face_intersection_quad, WatertightRayPrecalc};
    use crate::math::{Point, Real, Vector};
    use crate::query::Ray;

    #[test]
    fn hit_from_both_sides() {
        let a = Point::new(0.0, 0.0, 0.0);
        let b = Point::new(1.0, 0.0, 0.0);
        let c = Point::new(0.0, 1.0, 0.0);

        for dir in [-1.0, 1.0] {
            let origin = Point::new(0.25, 0.25, -3.0 * dir);
            let precalc = WatertightRayPrecalc::new(&Vector::new(0.0, 0.0, dir));
            let (t, uv) = precalc.intersect(&origin, &a, &b, &c).unwrap();
            approx::assert_relative_eq!(t, 3.0);
            approx::assert_relative_eq!(uv[0] + uv[1], 0.75, epsilon = 1.0e-6);
        }
    }

    #[test]
    fn miss_outside_and_behind() {
        let a = Point::new(0.0, 0.0, 0.0);
        let b = Point::new(1.0, 0.0, 0.0);
        let c = Point::new(0.0, 1.0, 0.0);
        let precalc = WatertightRayPrecalc::new(&Vector::new(0.0, 0.0, -1.0));

        assert!(precalc
            .intersect(&Point::new(0.9, 0.9, 1.0), &a, &b, &c)
            .is_none());
        assert!(precalc
            .intersect(&Point::new(0.2, 0.2, -1.0), &a, &b, &c)
            .is_none());
    }

    #[test]
    fn quad_diagonal_is_watertight() {
        let ray = Ray::new(Point::new(0.5, 0.5, 1.0), Vector::new(0.0, 0.0, -1.0));
        let precalc = WatertightRayPrecalc::new(&ray.dir);
        let mut depth = Real::MAX;

        assert!(ray_face_intersection_quad(
            &ray,
            &precalc,
            &Point::new(0.0, 1.0, 0.0),
            &Point::new(1.0, 1.0, 0.0),
            &Point::new(1.0, 0.0, 0.0),
            &Point::new(0.0, 0.0, 0.0),
            &mut depth,
        ));
        approx::assert_relative_eq!(depth, 1.0);
    }
}
