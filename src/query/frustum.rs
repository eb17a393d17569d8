//! Classification of boxes against a set of half-spaces.

use crate::bounding_volume::Aabb;
use crate::math::{Real, Vector, Vector4, DIM};
use smallvec::SmallVec;

/// The position of a box relative to a set of planes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaneAabbIntersection {
    /// The box is on the inner side of every plane.
    Inside,
    /// The box crosses at least one plane but is not fully outside any of them.
    Intersect,
    /// The box is fully on the outer side of at least one plane.
    Outside,
}

/// A set of planes bounding a (usually convex) volume, like a view frustum.
///
/// Each plane is stored as `(nx, ny, nz, d)`: a point `p` is on the inner side of the plane
/// if `n.dot(p) + d > 0`. Six planes are stored inline, more spill to the heap.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FrustumPlanes {
    /// The bounding planes.
    pub planes: SmallVec<[Vector4<Real>; 6]>,
}

impl FrustumPlanes {
    /// Creates a frustum from its planes.
    pub fn new(planes: impl IntoIterator<Item = Vector4<Real>>) -> Self {
        Self {
            planes: planes.into_iter().collect(),
        }
    }

    /// The number of planes of this frustum.
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    /// Builds the six planes of the box `aabb`, oriented toward its interior.
    pub fn from_aabb(aabb: &Aabb) -> Self {
        let mut planes = SmallVec::new();

        for i in 0..DIM {
            let mut n = Vector::zeros();
            n[i] = 1.0;
            planes.push(Vector4::new(n.x, n.y, n.z, -aabb.mins[i]));
            planes.push(Vector4::new(-n.x, -n.y, -n.z, aabb.maxs[i]));
        }

        Self { planes }
    }

    /// Is `aabb` at least partially on the inner side of every plane?
    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        test_frustum_aabb(aabb, self) != PlaneAabbIntersection::Outside
    }

    /// Is `aabb` at least partially on the outer side of some plane?
    pub fn excludes_aabb(&self, aabb: &Aabb) -> bool {
        test_frustum_aabb(aabb, self) != PlaneAabbIntersection::Inside
    }
}

/// Classifies `aabb` against all the planes of `frustum`.
///
/// For each plane, only the two box corners that are extreme along its normal are tested.
pub fn test_frustum_aabb(aabb: &Aabb, frustum: &FrustumPlanes) -> PlaneAabbIntersection {
    let mut result = PlaneAabbIntersection::Inside;

    for plane in &frustum.planes {
        let normal = plane.xyz();
        let mut vmin = Vector::zeros();
        let mut vmax = Vector::zeros();

        for axis in 0..DIM {
            if normal[axis] < 0.0 {
                vmin[axis] = aabb.mins[axis];
                vmax[axis] = aabb.maxs[axis];
            } else {
                vmin[axis] = aabb.maxs[axis];
                vmax[axis] = aabb.mins[axis];
            }
        }

        if normal.dot(&vmin) + plane.w < 0.0 {
            return PlaneAabbIntersection::Outside;
        }

        if normal.dot(&vmax) + plane.w <= 0.0 {
            result = PlaneAabbIntersection::Intersect;
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::{test_frustum_aabb, FrustumPlanes, PlaneAabbIntersection};
    use crate::bounding_volume::Aabb;
    use crate::math::{Point, Real};

    fn cube(min: Real, max: Real) -> Aabb {
        Aabb::new(Point::new(min, min, min), Point::new(max, max, max))
    }

    #[test]
    fn classify_against_box_planes() {
        let frustum = FrustumPlanes::from_aabb(&cube(0.0, 10.0));
        assert_eq!(frustum.num_planes(), 6);

        assert_eq!(
            test_frustum_aabb(&cube(1.0, 2.0), &frustum),
            PlaneAabbIntersection::Inside
        );
        assert_eq!(
            test_frustum_aabb(&cube(9.0, 11.0), &frustum),
            PlaneAabbIntersection::Intersect
        );
        assert_eq!(
            test_frustum_aabb(&cube(11.0, 12.0), &frustum),
            PlaneAabbIntersection::Outside
        );

        assert!(frustum.contains_aabb(&cube(9.0, 11.0)));
        assert!(frustum.excludes_aabb(&cube(9.0, 11.0)));
        assert!(!frustum.excludes_aabb(&cube(1.0, 2.0)));
        assert!(!frustum.contains_aabb(&cube(11.0, 12.0)));
    }

    #[test]
    fn empty_frustum_contains_everything() {
        let frustum = FrustumPlanes::default();
        assert_eq!(
            test_frustum_aabb(&cube(-1.0, 1.0), &frustum),
            PlaneAabbIntersection::Inside
        );
    }
}
