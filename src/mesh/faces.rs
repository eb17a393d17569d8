use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector};
use crate::utils::{ccw_face_normal, ccw_polygon_normal, GroupedIndices};

/// Indicates an inconsistency in the arrays describing a polygon mesh.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeshBuilderError {
    /// The face offsets do not describe contiguous corner ranges.
    #[error("face offsets must start at 0, be non-decreasing and end at the corner count ({num_corners})")]
    InvalidFaceOffsets {
        /// The number of corners of the mesh.
        num_corners: usize,
    },
    /// A face has fewer than three corners.
    #[error("face {face} has {num_corners} corners, at least 3 are required")]
    DegenerateFace {
        /// The index of the face.
        face: usize,
        /// Its number of corners.
        num_corners: usize,
    },
    /// A corner refers to a vertex that does not exist.
    #[error("corner {corner} refers to vertex {vertex} but the mesh only has {num_verts} vertices")]
    VertexOutOfBounds {
        /// The index of the corner.
        corner: usize,
        /// The referenced vertex.
        vertex: u32,
        /// The number of vertices of the mesh.
        num_verts: usize,
    },
    /// An attribute layer does not have one element per vertex or per face.
    #[error("the `{layer}` layer has {len} elements, {expected} were expected")]
    LayerLengthMismatch {
        /// The name of the layer.
        layer: &'static str,
        /// Its actual length.
        len: usize,
        /// The required length.
        expected: usize,
    },
}

fn check_layer_len(
    layer: &'static str,
    len: usize,
    expected: usize,
) -> Result<(), MeshBuilderError> {
    if len == expected {
        Ok(())
    } else {
        Err(MeshBuilderError::LayerLengthMismatch {
            layer,
            len,
            expected,
        })
    }
}

/// A polygon mesh, triangulated into corner triangles.
///
/// Faces are stored as ranges of corners, each corner referencing a vertex. Every face is
/// fan-triangulated at construction: triangle `t` belongs to face `tri_faces()[t]` and its
/// three entries in `corner_tris()` are corner indices.
///
/// Optional layers (material index, sharp flag, hide flags, sculpt mask) are `None` when
/// absent. A missing layer behaves like a layer filled with its default value.
#[derive(Clone, Debug)]
pub struct FacesMesh {
    positions: Vec<Point<Real>>,
    faces: GroupedIndices,
    corner_tris: Vec<[u32; 3]>,
    tri_faces: Vec<u32>,
    vert_to_face_map: GroupedIndices,
    vert_normals: Vec<Vector<Real>>,
    face_normals: Vec<Vector<Real>>,
    material_indices: Option<Vec<i32>>,
    sharp_faces: Option<Vec<bool>>,
    hide_vert: Option<Vec<bool>>,
    hide_poly: Option<Vec<bool>>,
    mask: Option<Vec<Real>>,
    active_color_attribute: Option<String>,
    render_color_attribute: Option<String>,
}

impl FacesMesh {
    /// Creates a mesh from its vertex positions, face offsets and corner vertices.
    ///
    /// Face `f` is made of the corners `face_offsets[f]..face_offsets[f + 1]`, and corner
    /// `c` refers to the vertex `corner_verts[c]`.
    pub fn new(
        positions: Vec<Point<Real>>,
        face_offsets: Vec<u32>,
        corner_verts: Vec<u32>,
    ) -> Result<Self, MeshBuilderError> {
        if !GroupedIndices::offsets_are_valid(&face_offsets, corner_verts.len()) {
            return Err(MeshBuilderError::InvalidFaceOffsets {
                num_corners: corner_verts.len(),
            });
        }

        if let Some((corner, vertex)) = corner_verts
            .iter()
            .enumerate()
            .find(|(_, v)| **v as usize >= positions.len())
        {
            return Err(MeshBuilderError::VertexOutOfBounds {
                corner,
                vertex: *vertex,
                num_verts: positions.len(),
            });
        }

        let faces = GroupedIndices::new(face_offsets, corner_verts);

        let mut corner_tris = Vec::with_capacity(faces.indices().len());
        let mut tri_faces = Vec::with_capacity(faces.indices().len());

        for face in 0..faces.len() {
            let range = faces.range(face);

            if range.len() < 3 {
                return Err(MeshBuilderError::DegenerateFace {
                    face,
                    num_corners: range.len(),
                });
            }

            let first = range.start as u32;
            for corner in range.start + 1..range.end - 1 {
                corner_tris.push([first, corner as u32, corner as u32 + 1]);
                tri_faces.push(face as u32);
            }
        }

        let vert_to_face_map = faces.reverse(positions.len());
        let num_verts = positions.len();
        let num_faces = faces.len();

        let mut result = Self {
            positions,
            faces,
            corner_tris,
            tri_faces,
            vert_to_face_map,
            vert_normals: vec![Vector::zeros(); num_verts],
            face_normals: vec![Vector::zeros(); num_faces],
            material_indices: None,
            sharp_faces: None,
            hide_vert: None,
            hide_poly: None,
            mask: None,
            active_color_attribute: None,
            render_color_attribute: None,
        };
        result.recompute_normals();
        Ok(result)
    }

    /// Sets the per-face material indices.
    pub fn with_material_indices(
        mut self,
        material_indices: Vec<i32>,
    ) -> Result<Self, MeshBuilderError> {
        check_layer_len("material_index", material_indices.len(), self.num_faces())?;
        self.material_indices = Some(material_indices);
        Ok(self)
    }

    /// Sets the per-face sharp (flat shaded) flags.
    pub fn with_sharp_faces(mut self, sharp_faces: Vec<bool>) -> Result<Self, MeshBuilderError> {
        check_layer_len("sharp_face", sharp_faces.len(), self.num_faces())?;
        self.sharp_faces = Some(sharp_faces);
        Ok(self)
    }

    /// Sets the per-vertex hide flags.
    pub fn with_hide_vert(mut self, hide_vert: Vec<bool>) -> Result<Self, MeshBuilderError> {
        check_layer_len("hide_vert", hide_vert.len(), self.num_verts())?;
        self.hide_vert = Some(hide_vert);
        Ok(self)
    }

    /// Sets the per-face hide flags.
    pub fn with_hide_poly(mut self, hide_poly: Vec<bool>) -> Result<Self, MeshBuilderError> {
        check_layer_len("hide_poly", hide_poly.len(), self.num_faces())?;
        self.hide_poly = Some(hide_poly);
        Ok(self)
    }

    /// Sets the per-vertex sculpt mask.
    pub fn with_mask(mut self, mask: Vec<Real>) -> Result<Self, MeshBuilderError> {
        check_layer_len("mask", mask.len(), self.num_verts())?;
        self.mask = Some(mask);
        Ok(self)
    }

    /// Sets the names of the active and render color attributes handed to the draw backend.
    pub fn with_color_attributes(mut self, active: Option<String>, render: Option<String>) -> Self {
        self.active_color_attribute = active;
        self.render_color_attribute = render;
        self
    }

    /// The number of vertices.
    #[inline]
    pub fn num_verts(&self) -> usize {
        self.positions.len()
    }

    /// The number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// The number of corner triangles.
    #[inline]
    pub fn num_corner_tris(&self) -> usize {
        self.corner_tris.len()
    }

    /// The vertex positions.
    #[inline]
    pub fn positions(&self) -> &[Point<Real>] {
        &self.positions
    }

    /// Mutable access to the vertex positions.
    ///
    /// The nodes containing modified vertices must then be tagged with
    /// `Pbvh::mark_update` (or `mark_positions_update` and a bounds update).
    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Point<Real>] {
        &mut self.positions
    }

    /// The faces of the mesh, each as the list of its corner vertices.
    #[inline]
    pub fn faces(&self) -> &GroupedIndices {
        &self.faces
    }

    /// The vertex referenced by each corner.
    #[inline]
    pub fn corner_verts(&self) -> &[u32] {
        self.faces.indices()
    }

    /// The three corners of each triangle.
    #[inline]
    pub fn corner_tris(&self) -> &[[u32; 3]] {
        &self.corner_tris
    }

    /// The face each triangle was generated from.
    #[inline]
    pub fn tri_faces(&self) -> &[u32] {
        &self.tri_faces
    }

    /// The three vertices of the triangle `tri`.
    #[inline]
    pub fn tri_verts(&self, tri: usize) -> [u32; 3] {
        let corner_verts = self.faces.indices();
        self.corner_tris[tri].map(|c| corner_verts[c as usize])
    }

    /// The faces around each vertex.
    #[inline]
    pub fn vert_to_face_map(&self) -> &GroupedIndices {
        &self.vert_to_face_map
    }

    /// The vertex normals.
    #[inline]
    pub fn vert_normals(&self) -> &[Vector<Real>] {
        &self.vert_normals
    }

    /// The face normals.
    #[inline]
    pub fn face_normals(&self) -> &[Vector<Real>] {
        &self.face_normals
    }

    /// The per-face material indices, if any.
    #[inline]
    pub fn material_indices(&self) -> Option<&[i32]> {
        self.material_indices.as_deref()
    }

    /// The per-face sharp flags, if any.
    #[inline]
    pub fn sharp_faces(&self) -> Option<&[bool]> {
        self.sharp_faces.as_deref()
    }

    /// The per-vertex hide flags, if any.
    #[inline]
    pub fn hide_vert(&self) -> Option<&[bool]> {
        self.hide_vert.as_deref()
    }

    /// The per-face hide flags, if any.
    #[inline]
    pub fn hide_poly(&self) -> Option<&[bool]> {
        self.hide_poly.as_deref()
    }

    /// The per-vertex sculpt mask, if any.
    #[inline]
    pub fn mask(&self) -> Option<&[Real]> {
        self.mask.as_deref()
    }

    /// The sculpt mask, created and filled with zeros if missing.
    pub fn mask_mut(&mut self) -> &mut [Real] {
        let num_verts = self.num_verts();
        self.mask.get_or_insert_with(|| vec![0.0; num_verts])
    }

    /// The name of the active color attribute, if any.
    pub fn active_color_attribute(&self) -> Option<&str> {
        self.active_color_attribute.as_deref()
    }

    /// The name of the color attribute used for rendering, if any.
    pub fn render_color_attribute(&self) -> Option<&str> {
        self.render_color_attribute.as_deref()
    }

    /// Is the vertex `vert` hidden?
    #[inline]
    pub fn is_vert_hidden(&self, vert: usize) -> bool {
        self.hide_vert.as_ref().is_some_and(|h| h[vert])
    }

    /// Is the face `face` hidden?
    #[inline]
    pub fn is_face_hidden(&self, face: usize) -> bool {
        self.hide_poly.as_ref().is_some_and(|h| h[face])
    }

    /// Hides or reveals a vertex, creating the hide layer if needed.
    pub fn set_vert_hidden(&mut self, vert: usize, hidden: bool) {
        let num_verts = self.num_verts();
        self.hide_vert.get_or_insert_with(|| vec![false; num_verts])[vert] = hidden;
    }

    /// Hides or reveals a face, creating the hide layer if needed.
    pub fn set_face_hidden(&mut self, face: usize, hidden: bool) {
        let num_faces = self.num_faces();
        self.hide_poly.get_or_insert_with(|| vec![false; num_faces])[face] = hidden;
    }

    /// Removes the vertex hide layer, revealing every vertex.
    pub fn clear_hide_vert(&mut self) {
        self.hide_vert = None;
    }

    /// Removes the face hide layer, revealing every face.
    pub fn clear_hide_poly(&mut self) {
        self.hide_poly = None;
    }

    /// Hides every face with at least one hidden vertex, and reveals the others.
    ///
    /// The face hide layer is removed if no face ends up hidden.
    pub fn flush_hide_vert_to_faces(&mut self) {
        let Some(hide_vert) = &self.hide_vert else {
            self.hide_poly = None;
            return;
        };

        let hide_poly: Vec<bool> = self
            .faces
            .iter()
            .map(|verts| verts.iter().any(|v| hide_vert[*v as usize]))
            .collect();

        self.hide_poly = hide_poly.contains(&true).then_some(hide_poly);
    }

    /// Can two faces end up in the same leaf, i.e., do they share their material and
    /// shading?
    pub fn face_materials_match(&self, a: usize, b: usize) -> bool {
        if let Some(sharp) = &self.sharp_faces {
            if sharp[a] != sharp[b] {
                return false;
            }
        }

        if let Some(materials) = &self.material_indices {
            if materials[a] != materials[b] {
                return false;
            }
        }

        true
    }

    /// The bounding box of the triangle `tri`.
    pub fn tri_aabb(&self, tri: usize) -> Aabb {
        let verts = self.tri_verts(tri);
        Aabb::from_points(verts.iter().map(|v| &self.positions[*v as usize]))
    }

    /// Computes the normal of `face` from the current positions.
    pub fn face_normal_calc(&self, face: usize) -> Vector<Real> {
        let verts = self.faces.group(face);

        if let [a, b, c] = verts {
            ccw_face_normal([
                &self.positions[*a as usize],
                &self.positions[*b as usize],
                &self.positions[*c as usize],
            ])
        } else {
            ccw_polygon_normal(verts.iter().map(|v| &self.positions[*v as usize]))
        }
    }

    /// Computes the normal of `vert` as the normalized sum of the normals of its faces.
    ///
    /// A zero sum gives a zero normal.
    pub fn vert_normal_calc(&self, vert: usize) -> Vector<Real> {
        let sum: Vector<Real> = self
            .vert_to_face_map
            .group(vert)
            .iter()
            .map(|f| self.face_normals[*f as usize])
            .sum();
        sum.try_normalize(0.0).unwrap_or_else(Vector::zeros)
    }

    pub(crate) fn face_normals_mut(&mut self) -> &mut [Vector<Real>] {
        &mut self.face_normals
    }

    pub(crate) fn vert_normals_mut(&mut self) -> &mut [Vector<Real>] {
        &mut self.vert_normals
    }

    /// Recomputes every face and vertex normal.
    pub fn recompute_normals(&mut self) {
        self.face_normals = (0..self.num_faces())
            .map(|f| self.face_normal_calc(f))
            .collect();
        self.vert_normals = (0..self.num_verts())
            .map(|v| self.vert_normal_calc(v))
            .collect();
    }
}

#[cfg(test)]
mod test {
    use super::{FacesMesh, MeshBuilderError};
    use crate::math::{Point, Vector};

    fn quad() -> Vec<Point<crate::math::Real>> {
        vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 0.0, 0.0),
            Point::new(1.0, 1.0, 0.0),
            Point::new(0.0, 1.0, 0.0),
        ]
    }

    #[test]
    fn quad_is_fan_triangulated() {
        let mesh = FacesMesh::new(quad(), vec![0, 4], vec![0, 1, 2, 3]).unwrap();
        assert_eq!(mesh.num_corner_tris(), 2);
        assert_eq!(mesh.tri_verts(0), [0, 1, 2]);
        assert_eq!(mesh.tri_verts(1), [0, 2, 3]);
        assert_eq!(mesh.tri_faces(), &[0, 0]);
        assert_eq!(mesh.face_normals()[0], Vector::z());
        assert_eq!(mesh.vert_normals()[3], Vector::z());
    }

    #[test]
    fn invalid_inputs_are_reported() {
        assert_eq!(
            FacesMesh::new(quad(), vec![0, 3], vec![0, 1, 2, 3]).unwrap_err(),
            MeshBuilderError::InvalidFaceOffsets { num_corners: 4 }
        );
        assert_eq!(
            FacesMesh::new(quad(), vec![0, 2, 4], vec![0, 1, 2, 3]).unwrap_err(),
            MeshBuilderError::DegenerateFace {
                face: 0,
                num_corners: 2
            }
        );
        assert_eq!(
            FacesMesh::new(quad(), vec![0, 4], vec![0, 1, 2, 7]).unwrap_err(),
            MeshBuilderError::VertexOutOfBounds {
                corner: 3,
                vertex: 7,
                num_verts: 4
            }
        );

        let mesh = FacesMesh::new(quad(), vec![0, 4], vec![0, 1, 2, 3]).unwrap();
        assert!(matches!(
            mesh.with_mask(vec![0.0; 3]),
            Err(MeshBuilderError::LayerLengthMismatch { layer: "mask", .. })
        ));
    }

    #[test]
    fn hidden_vertex_hides_its_faces() {
        let mut mesh = FacesMesh::new(
            quad(),
            vec![0, 3, 6],
            vec![0, 1, 2, 0, 2, 3],
        )
        .unwrap();
        mesh.set_vert_hidden(3, true);
        mesh.flush_hide_vert_to_faces();
        assert_eq!(mesh.hide_poly(), Some(&[false, true][..]));

        mesh.set_vert_hidden(3, false);
        mesh.flush_hide_vert_to_faces();
        assert_eq!(mesh.hide_poly(), None);
    }

    #[test]
    fn hide_layers() {
        let mut mesh = FacesMesh::new(quad(), vec![0, 3, 6], vec![0, 1, 2, 0, 2, 3])
            .unwrap()
            .with_hide_vert(vec![false, false, false, true])
            .unwrap()
            .with_hide_poly(vec![true, false])
            .unwrap();
        assert!(mesh.is_vert_hidden(3));
        assert!(mesh.is_face_hidden(0));

        mesh.set_face_hidden(1, true);
        assert_eq!(mesh.hide_poly(), Some(&[true, true][..]));

        mesh.clear_hide_poly();
        mesh.clear_hide_vert();
        assert!(!mesh.is_face_hidden(0));
        assert!(!mesh.is_vert_hidden(3));
    }
}
