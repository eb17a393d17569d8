use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector, DIM};
use crate::query::Ray;

/// Ray data precomputed once per query for repeated slab tests against node boxes.
///
/// Zero direction components are replaced by `Real::MAX` in the reciprocal direction, so
/// rays parallel to a slab never produce `NaN`.
#[derive(Debug, Clone, Copy)]
pub struct RayAabbPrecalc {
    /// The ray origin.
    pub origin: Point<Real>,
    /// Component-wise reciprocal of the ray direction.
    pub inv_dir: Vector<Real>,
    /// For each axis, `1` if the ray goes toward negative coordinates.
    pub sign: [usize; DIM],
}

impl RayAabbPrecalc {
    /// Precomputes the data for slab tests of `ray`.
    pub fn new(ray: &Ray) -> Self {
        let inv_dir = ray
            .dir
            .map(|e| if e != 0.0 { 1.0 / e } else { Real::MAX });
        let sign = [
            (inv_dir.x < 0.0) as usize,
            (inv_dir.y < 0.0) as usize,
            (inv_dir.z < 0.0) as usize,
        ];

        Self {
            origin: ray.origin,
            inv_dir,
            sign,
        }
    }

    /// Tests the ray against `aabb`.
    ///
    /// Returns the distance at which the ray enters the box (negative if the origin is
    /// inside the box), or `None` if the ray misses it or the box is entirely behind the
    /// ray origin.
    pub fn intersect(&self, aabb: &Aabb) -> Option<Real> {
        let bbox = [&aabb.mins, &aabb.maxs];

        let mut tmin = (bbox[self.sign[0]].x - self.origin.x) * self.inv_dir.x;
        let mut tmax = (bbox[1 - self.sign[0]].x - self.origin.x) * self.inv_dir.x;

        for i in 1..DIM {
            let near = (bbox[self.sign[i]][i] - self.origin[i]) * self.inv_dir[i];
            let far = (bbox[1 - self.sign[i]][i] - self.origin[i]) * self.inv_dir[i];

            if tmin > far || near > tmax {
                return None;
            }

            if near > tmin {
                tmin = near;
            }
            if far < tmax {
                tmax = far;
            }
        }

        if tmax < 0.0 {
            return None;
        }

        Some(tmin)
    }
}

#[cfg(test)]
mod test {
    use super::RayAabbPrecalc;
    use crate::bounding_volume::Aabb;
    use crate::math::{Point, Vector};
    use crate::query::Ray;

    fn unit_box() -> Aabb {
        Aabb::new(Point::new(-1.0, -1.0, -1.0), Point::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn axis_aligned_ray_enters_at_the_face() {
        let ray = Ray::new(Point::new(0.0, 0.0, 5.0), Vector::new(0.0, 0.0, -1.0));
        let tmin = RayAabbPrecalc::new(&ray).intersect(&unit_box());
        assert_eq!(tmin, Some(4.0));
    }

    #[test]
    fn ray_pointing_away_misses() {
        let ray = Ray::new(Point::new(0.0, 0.0, 5.0), Vector::new(0.0, 0.0, 1.0));
        assert_eq!(RayAabbPrecalc::new(&ray).intersect(&unit_box()), None);
    }

    #[test]
    fn parallel_ray_outside_the_slab_misses() {
        let ray = Ray::new(Point::new(2.0, 0.0, 5.0), Vector::new(0.0, 0.0, -1.0));
        assert_eq!(RayAabbPrecalc::new(&ray).intersect(&unit_box()), None);
    }

    #[test]
    fn origin_inside_gives_negative_entry() {
        let ray = Ray::new(Point::origin(), Vector::new(1.0, 0.0, 0.0));
        let tmin = RayAabbPrecalc::new(&ray).intersect(&unit_box()).unwrap();
        assert!(tmin < 0.0);
    }
}
