use crate::math::{Point, Real, Vector};

/// Computes the unit normal of a counter-clock-wise triangle.
///
/// Returns a zero vector if the triangle is degenerate.
#[inline]
pub fn ccw_face_normal(pts: [&Point<Real>; 3]) -> Vector<Real> {
    let ab = pts[1] - pts[0];
    let ac = pts[2] - pts[0];
    ab.cross(&ac)
        .try_normalize(0.0)
        .unwrap_or_else(Vector::zeros)
}

/// Computes the unit normal of a counter-clock-wise quad from its diagonals.
///
/// Returns a zero vector if the quad is degenerate.
#[inline]
pub fn ccw_quad_normal(pts: [&Point<Real>; 4]) -> Vector<Real> {
    let d1 = pts[0] - pts[2];
    let d2 = pts[1] - pts[3];
    d1.cross(&d2)
        .try_normalize(0.0)
        .unwrap_or_else(Vector::zeros)
}

/// Computes the unit normal of a counter-clock-wise polygon with Newell's method.
///
/// Returns a zero vector if the polygon is degenerate.
pub fn ccw_polygon_normal<'a>(
    pts: impl ExactSizeIterator<Item = &'a Point<Real>> + Clone,
) -> Vector<Real> {
    let mut normal = Vector::zeros();
    let mut prev = match pts.clone().last() {
        Some(last) => last,
        None => return normal,
    };

    for curr in pts {
        normal.x += (prev.y - curr.y) * (prev.z + curr.z);
        normal.y += (prev.z - curr.z) * (prev.x + curr.x);
        normal.z += (prev.x - curr.x) * (prev.y + curr.y);
        prev = curr;
    }

    normal.try_normalize(0.0).unwrap_or_else(Vector::zeros)
}

#[cfg(test)]
mod test {
    use super::{ccw_face_normal, ccw_polygon_normal, ccw_quad_normal};
    use crate::math::{Point, Vector};

    #[test]
    fn planar_normals_agree() {
        let pts = [
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(1.0, 1.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ];

        assert_eq!(ccw_face_normal([&pts[0], &pts[1], &pts[2]]), Vector::z());
        assert_eq!(ccw_quad_normal([&pts[0], &pts[1], &pts[2], &pts[3]]), Vector::z());
        assert_eq!(ccw_polygon_normal(pts.iter()), Vector::z());
    }

    #[test]
    fn degenerate_triangle_has_zero_normal() {
        let a = Point::new(0.0, 0.0, 0.0);
        let b = Point::new(1.0, 0.0, 0.0);
        let c = Point::new(2.0, 0.0, 0.0);
        assert_eq!(ccw_face_normal([&a, &b, &c]), Vector::zeros());
    }
}
