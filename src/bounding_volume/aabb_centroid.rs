//! Bounding box carrying a precomputed centroid, used as a sort key while building.

use crate::bounding_volume::Aabb;
use crate::math::{Point, Real};

/// An [`Aabb`] together with its center.
///
/// One of these is computed per primitive before the tree is built. The builder only
/// ever reads them: the centroid decides on which side of a split a primitive goes.
#[derive(Debug, PartialEq, Copy, Clone)]
pub struct CentroidAabb {
    /// The bounding box of the primitive.
    pub aabb: Aabb,
    /// The center of `aabb`.
    pub centroid: Point<Real>,
}

impl CentroidAabb {
    /// Builds a `CentroidAabb` from a box, computing its centroid.
    #[inline]
    pub fn from_aabb(aabb: Aabb) -> Self {
        Self {
            aabb,
            centroid: aabb.center(),
        }
    }
}

impl From<Aabb> for CentroidAabb {
    fn from(aabb: Aabb) -> Self {
        Self::from_aabb(aabb)
    }
}
