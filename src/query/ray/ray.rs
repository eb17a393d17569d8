//! Structure needed to cast rays.

use crate::math::{Point, Real, Vector};

/// A Ray.
///
/// The direction does not need to be normalized for ray-casts: hit distances are then
/// expressed in multiples of `dir`. Nearest-to-ray queries normalize it themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[repr(C)]
pub struct Ray {
    /// Starting point of the ray.
    pub origin: Point<Real>,
    /// Direction of the ray.
    pub dir: Vector<Real>,
}

impl Ray {
    /// Creates a new ray starting from `origin` and with the direction `dir`.
    pub fn new(origin: Point<Real>, dir: Vector<Real>) -> Ray {
        Ray { origin, dir }
    }

    /// Computes the point at the given parameter on this line.
    ///
    /// This computes `self.origin + self.dir * t`.
    #[inline]
    pub fn point_at(&self, t: Real) -> Point<Real> {
        self.origin + self.dir * t
    }

    /// This ray with a unit-length direction.
    ///
    /// A zero direction is left untouched.
    #[inline]
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self::new(
            self.origin,
            self.dir.try_normalize(0.0).unwrap_or(self.dir),
        )
    }
}
