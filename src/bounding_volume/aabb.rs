//! Axis Aligned Bounding Box.

use crate::math::{Point, Real, Vector, DIM};

/// An Axis-Aligned Bounding Box (AABB).
///
/// Every node of the tree stores two of these: the current box and the "original" box
/// snapshot used to compare against a pre-deformation pose.
///
/// A freshly reset box has `mins` at `+Real::MAX` and `maxs` at `-Real::MAX` on every axis,
/// so that expanding it with any point yields a degenerate box around that point.
/// Expanding never shrinks a box.
///
/// # Example
///
/// ```rust
/// # #[cfg(feature = "f32")] {
/// use pbvh3d::bounding_volume::Aabb;
/// use nalgebra::Point3;
///
/// let mut aabb = Aabb::new_invalid();
/// aabb.expand(&Point3::new(1.0, 2.0, 3.0));
/// aabb.expand(&Point3::new(-1.0, 4.0, 2.0));
///
/// assert_eq!(aabb.mins, Point3::new(-1.0, 2.0, 2.0));
/// assert_eq!(aabb.maxs, Point3::new(1.0, 4.0, 3.0));
/// assert_eq!(aabb.widest_axis(), 0);
/// # }
/// ```
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(C)]
pub struct Aabb {
    /// The point with minimum coordinates.
    pub mins: Point<Real>,
    /// The point with maximum coordinates.
    pub maxs: Point<Real>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new_invalid()
    }
}

impl Aabb {
    /// Creates a new Aabb.
    ///
    /// # Arguments:
    ///   * `mins` - position of the point with the smallest coordinates.
    ///   * `maxs` - position of the point with the highest coordinates. Each component of `mins`
    ///     must be smaller than the related components of `maxs`.
    #[inline]
    pub fn new(mins: Point<Real>, maxs: Point<Real>) -> Aabb {
        Aabb { mins, maxs }
    }

    /// Creates an invalid `Aabb` with `mins` components set to `Real::MAX` and `maxs`components
    /// set to `-Real::MAX`.
    ///
    /// This is the reset state of a box: it contains nothing and merging it with any other
    /// box or point yields that box or point.
    #[inline]
    pub fn new_invalid() -> Self {
        Self::new(
            Vector::repeat(Real::MAX).into(),
            Vector::repeat(-Real::MAX).into(),
        )
    }

    /// A degenerate box located at the origin.
    ///
    /// Used for leaves that own no vertex at all.
    #[inline]
    pub fn zero() -> Self {
        Self::new(Point::origin(), Point::origin())
    }

    /// Creates a new `Aabb` from its center and its half-extents.
    #[inline]
    pub fn from_half_extents(center: Point<Real>, half_extents: Vector<Real>) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    /// Computes the `Aabb` bounding the given set of points.
    pub fn from_points<'a, I>(pts: I) -> Self
    where
        I: IntoIterator<Item = &'a Point<Real>>,
    {
        let mut result = Self::new_invalid();

        for pt in pts {
            result.expand(pt);
        }

        result
    }

    /// Puts this box back into its empty state.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new_invalid();
    }

    /// Enlarges this box so it also contains the point `pt`.
    #[inline]
    pub fn expand(&mut self, pt: &Point<Real>) {
        self.mins = self.mins.inf(pt);
        self.maxs = self.maxs.sup(pt);
    }

    /// Enlarges this box so it also contains `other`.
    #[inline]
    pub fn expand_with_bb(&mut self, other: &Aabb) {
        self.mins = self.mins.inf(&other.mins);
        self.maxs = self.maxs.sup(&other.maxs);
    }

    /// The smallest box containing both `self` and `other`.
    #[inline]
    #[must_use]
    pub fn merged(&self, other: &Aabb) -> Aabb {
        let mut result = *self;
        result.expand_with_bb(other);
        result
    }

    /// The center of this `Aabb`.
    #[inline]
    pub fn center(&self) -> Point<Real> {
        na::center(&self.mins, &self.maxs)
    }

    /// The half extents of this `Aabb`.
    #[inline]
    pub fn half_extents(&self) -> Vector<Real> {
        (self.maxs - self.mins) * 0.5
    }

    /// The extents of this `Aabb`.
    #[inline]
    pub fn extents(&self) -> Vector<Real> {
        self.maxs - self.mins
    }

    /// Does this box contain at least one point?
    ///
    /// This is `false` for a box in its reset state.
    #[inline]
    pub fn is_valid(&self) -> bool {
        (0..DIM).all(|i| self.mins[i] <= self.maxs[i])
    }

    /// Are all the coordinates of this box finite?
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.mins
            .iter()
            .chain(self.maxs.iter())
            .all(|e| e.is_finite())
    }

    /// Does this box fully contain `other`?
    #[inline]
    pub fn contains(&self, other: &Aabb) -> bool {
        (0..DIM).all(|i| self.mins[i] <= other.mins[i] && self.maxs[i] >= other.maxs[i])
    }

    /// The axis along which this box is the widest.
    ///
    /// Axis 0 is compared against axis 1 first, then the winner is compared against
    /// axis 2. On equal extents the lower axis index wins.
    #[inline]
    pub fn widest_axis(&self) -> usize {
        let dim = self.extents();

        if dim.x >= dim.y {
            if dim.x >= dim.z {
                0
            } else {
                2
            }
        } else if dim.y >= dim.z {
            1
        } else {
            2
        }
    }
}
