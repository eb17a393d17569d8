use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector};
use crate::utils::ccw_face_normal;
use slab::Slab;
use smallvec::SmallVec;

/// Handle of a vertex of a [`DynTopoMesh`].
pub type VertKey = usize;
/// Handle of a triangle of a [`DynTopoMesh`].
pub type FaceKey = usize;

/// Errors raised when editing a [`DynTopoMesh`].
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum DynTopoError {
    /// The vertex key does not identify a live vertex.
    #[error("no vertex with the key {vert}")]
    InvalidVertex {
        /// The rejected key.
        vert: VertKey,
    },
    /// The face key does not identify a live face.
    #[error("no face with the key {face}")]
    InvalidFace {
        /// The rejected key.
        face: FaceKey,
    },
    /// A triangle cannot reference the same vertex twice.
    #[error("the triangle {verts:?} references the same vertex twice")]
    DegenerateFace {
        /// The rejected vertices.
        verts: [VertKey; 3],
    },
    /// The vertex is still referenced by some triangles.
    #[error("the vertex {vert} is still used by {num_faces} faces")]
    VertexInUse {
        /// The vertex.
        vert: VertKey,
        /// The number of triangles using it.
        num_faces: usize,
    },
}

/// A vertex of a dynamic-topology mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct DynVert {
    /// The vertex position.
    pub co: Point<Real>,
    /// The vertex normal.
    pub no: Vector<Real>,
    /// Is this vertex hidden?
    pub hidden: bool,
    /// The paint mask of this vertex, only meaningful if the mesh has a mask layer.
    pub mask: Real,
    faces: SmallVec<[FaceKey; 8]>,
}

impl DynVert {
    /// The triangles using this vertex.
    #[inline]
    pub fn faces(&self) -> &[FaceKey] {
        &self.faces
    }
}

/// A triangle of a dynamic-topology mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct DynFace {
    verts: [VertKey; 3],
    /// The face normal.
    pub no: Vector<Real>,
    /// Is this face hidden?
    pub hidden: bool,
}

impl DynFace {
    /// The three vertices of this triangle, counter-clockwise.
    #[inline]
    pub fn verts(&self) -> [VertKey; 3] {
        self.verts
    }
}

/// A triangle mesh whose topology can be edited while a tree references it.
///
/// Vertices and faces are stored in slabs so their keys stay stable across insertions
/// and removals. Every vertex keeps the list of the faces using it.
#[derive(Clone, Debug, Default)]
pub struct DynTopoMesh {
    verts: Slab<DynVert>,
    faces: Slab<DynFace>,
    has_mask: bool,
}

impl DynTopoMesh {
    /// An empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a mesh from vertex positions and triangles indexing them.
    ///
    /// Vertex `i` of `positions` gets the key `i`, triangle `i` of `triangles` gets the
    /// face key `i`.
    pub fn from_triangles(
        positions: &[Point<Real>],
        triangles: &[[u32; 3]],
    ) -> Result<Self, DynTopoError> {
        let mut result = Self::new();

        for pt in positions {
            let _ = result.add_vert(*pt);
        }

        for tri in triangles {
            let _ = result.add_face(tri.map(|v| v as VertKey))?;
        }

        result.recompute_normals();
        Ok(result)
    }

    /// Adds an isolated vertex.
    pub fn add_vert(&mut self, co: Point<Real>) -> VertKey {
        self.verts.insert(DynVert {
            co,
            no: Vector::zeros(),
            hidden: false,
            mask: 0.0,
            faces: SmallVec::new(),
        })
    }

    /// Removes a vertex no longer used by any triangle.
    pub fn remove_vert(&mut self, vert: VertKey) -> Result<DynVert, DynTopoError> {
        let num_faces = self
            .verts
            .get(vert)
            .ok_or(DynTopoError::InvalidVertex { vert })?
            .faces
            .len();

        if num_faces != 0 {
            return Err(DynTopoError::VertexInUse { vert, num_faces });
        }

        Ok(self.verts.remove(vert))
    }

    /// Adds a triangle between three existing vertices.
    ///
    /// Its normal is computed from the current vertex positions.
    pub fn add_face(&mut self, verts: [VertKey; 3]) -> Result<FaceKey, DynTopoError> {
        for vert in verts {
            if !self.verts.contains(vert) {
                return Err(DynTopoError::InvalidVertex { vert });
            }
        }

        if verts[0] == verts[1] || verts[1] == verts[2] || verts[2] == verts[0] {
            return Err(DynTopoError::DegenerateFace { verts });
        }

        let no = ccw_face_normal(verts.map(|v| &self.verts[v].co));
        let key = self.faces.insert(DynFace {
            verts,
            no,
            hidden: false,
        });

        for vert in verts {
            self.verts[vert].faces.push(key);
        }

        Ok(key)
    }

    /// Removes a triangle, leaving its vertices in place.
    pub fn remove_face(&mut self, face: FaceKey) -> Result<DynFace, DynTopoError> {
        let removed = self
            .faces
            .try_remove(face)
            .ok_or(DynTopoError::InvalidFace { face })?;

        for vert in removed.verts {
            if let Some(v) = self.verts.get_mut(vert) {
                v.faces.retain(|f| *f != face);
            }
        }

        Ok(removed)
    }

    /// The number of live vertices.
    #[inline]
    pub fn num_verts(&self) -> usize {
        self.verts.len()
    }

    /// The number of live triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// The vertex with the given key.
    #[inline]
    pub fn vert(&self, vert: VertKey) -> Option<&DynVert> {
        self.verts.get(vert)
    }

    /// Mutable access to the vertex with the given key.
    ///
    /// Its face list cannot be modified through this reference.
    #[inline]
    pub fn vert_mut(&mut self, vert: VertKey) -> Option<&mut DynVert> {
        self.verts.get_mut(vert)
    }

    /// The triangle with the given key.
    #[inline]
    pub fn face(&self, face: FaceKey) -> Option<&DynFace> {
        self.faces.get(face)
    }

    /// Mutable access to the triangle with the given key.
    #[inline]
    pub fn face_mut(&mut self, face: FaceKey) -> Option<&mut DynFace> {
        self.faces.get_mut(face)
    }

    /// Iterates through all the live vertices.
    pub fn verts(&self) -> impl Iterator<Item = (VertKey, &DynVert)> {
        self.verts.iter()
    }

    /// Iterates through all the live triangles.
    pub fn faces(&self) -> impl Iterator<Item = (FaceKey, &DynFace)> {
        self.faces.iter()
    }

    /// Does this mesh carry a paint mask?
    #[inline]
    pub fn has_mask(&self) -> bool {
        self.has_mask
    }

    /// Sets the mask of a vertex, enabling the mask layer.
    pub fn set_vert_mask(&mut self, vert: VertKey, mask: Real) -> Result<(), DynTopoError> {
        self.verts
            .get_mut(vert)
            .ok_or(DynTopoError::InvalidVertex { vert })?
            .mask = mask;
        self.has_mask = true;
        Ok(())
    }

    /// Removes the mask layer.
    pub fn clear_mask(&mut self) {
        self.has_mask = false;
        for (_, v) in self.verts.iter_mut() {
            v.mask = 0.0;
        }
    }

    /// The positions of the three vertices of a triangle.
    #[inline]
    pub fn face_positions(&self, face: &DynFace) -> [&Point<Real>; 3] {
        face.verts.map(|v| &self.verts[v].co)
    }

    /// The bounding box of a triangle.
    pub fn face_aabb(&self, face: &DynFace) -> Aabb {
        Aabb::from_points(self.face_positions(face))
    }

    /// The counter-clockwise normal of a triangle, computed from current positions.
    pub fn face_normal_calc(&self, face: &DynFace) -> Vector<Real> {
        ccw_face_normal(self.face_positions(face))
    }

    /// The normalized sum of the stored normals of the triangles around a vertex.
    ///
    /// Returns a zero vector if the vertex is isolated or its face normals cancel out.
    pub fn vert_normal_calc(&self, vert: &DynVert) -> Vector<Real> {
        vert.faces
            .iter()
            .filter_map(|f| self.faces.get(*f))
            .map(|f| f.no)
            .sum::<Vector<Real>>()
            .try_normalize(0.0)
            .unwrap_or_else(Vector::zeros)
    }

    /// Recomputes the normal of one face.
    pub fn update_face_normal(&mut self, face: FaceKey) {
        if let Some(f) = self.faces.get(face) {
            let no = self.face_normal_calc(f);
            self.faces[face].no = no;
        }
    }

    /// Recomputes the normal of one vertex from the stored face normals.
    pub fn update_vert_normal(&mut self, vert: VertKey) {
        if let Some(v) = self.verts.get(vert) {
            let no = self.vert_normal_calc(v);
            self.verts[vert].no = no;
        }
    }

    /// Recomputes every face normal, then every vertex normal.
    pub fn recompute_normals(&mut self) {
        let face_keys: Vec<FaceKey> = self.faces.iter().map(|(k, _)| k).collect();
        for face in face_keys {
            self.update_face_normal(face);
        }

        let vert_keys: Vec<VertKey> = self.verts.iter().map(|(k, _)| k).collect();
        for vert in vert_keys {
            self.update_vert_normal(vert);
        }
    }
}

#[cfg(test)]
mod test {
    use super::{DynTopoError, DynTopoMesh};
    use crate::math::{Point, Vector};

    fn quad() -> DynTopoMesh {
        DynTopoMesh::from_triangles(
            &[
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(1.0, 1.0, 0.0),
                Point::new(0.0, 1.0, 0.0),
            ],
            &[[0, 1, 2], [0, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn vertices_track_their_faces() {
        let mut mesh = quad();
        assert_eq!(mesh.vert(0).unwrap().faces(), &[0, 1]);
        assert_eq!(mesh.vert(2).unwrap().no, Vector::z());

        let removed = mesh.remove_face(0).unwrap();
        assert_eq!(removed.verts(), [0, 1, 2]);
        assert_eq!(mesh.vert(0).unwrap().faces(), &[1]);
        assert!(mesh.vert(1).unwrap().faces().is_empty());
        assert_eq!(mesh.num_faces(), 1);
        assert!(mesh.remove_vert(1).is_ok());
    }

    #[test]
    fn invalid_edits_are_rejected() {
        let mut mesh = quad();
        assert_eq!(
            mesh.add_face([0, 0, 1]),
            Err(DynTopoError::DegenerateFace { verts: [0, 0, 1] })
        );
        assert_eq!(
            mesh.add_face([0, 1, 7]),
            Err(DynTopoError::InvalidVertex { vert: 7 })
        );
        assert_eq!(
            mesh.remove_vert(0).unwrap_err(),
            DynTopoError::VertexInUse {
                vert: 0,
                num_faces: 2
            }
        );
        assert_eq!(
            mesh.remove_face(5).unwrap_err(),
            DynTopoError::InvalidFace { face: 5 }
        );
    }

    #[test]
    fn mask_layer() {
        let mut mesh = quad();
        assert!(!mesh.has_mask());

        mesh.set_vert_mask(2, 0.75).unwrap();
        assert!(mesh.has_mask());
        assert_eq!(mesh.vert(2).unwrap().mask, 0.75);
        assert_eq!(
            mesh.set_vert_mask(9, 1.0),
            Err(DynTopoError::InvalidVertex { vert: 9 })
        );

        mesh.clear_mask();
        assert!(!mesh.has_mask());
        assert_eq!(mesh.vert(2).unwrap().mask, 0.0);
    }
}
