use crate::bounding_volume::Aabb;
use crate::math::{Point, Real, Vector};
use crate::utils::{ccw_quad_normal, GroupedIndices};
use core::ops::Range;

/// Indicates an inconsistency in the arrays describing multires grids.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum GridsBuilderError {
    /// Grids need at least two samples per side to contain a quad.
    #[error("the grid size must be at least 2, found {grid_size}")]
    GridSizeTooSmall {
        /// The rejected grid size.
        grid_size: u32,
    },
    /// The face offsets do not describe contiguous grid ranges.
    #[error("face offsets must start at 0, be non-decreasing and end at the grid count ({num_grids})")]
    InvalidFaceOffsets {
        /// The number of grids.
        num_grids: usize,
    },
    /// A per-sample or per-face array does not have the expected length.
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
) -> Result<(), GridsBuilderError> {
    if len == expected {
        Ok(())
    } else {
        Err(GridsBuilderError::LayerLengthMismatch {
            layer,
            len,
            expected,
        })
    }
}

/// Dimensions of the grids.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct GridKey {
    /// Number of samples along each side of a grid.
    pub grid_size: u32,
    /// Number of samples of a grid, i.e., `grid_size * grid_size`.
    pub grid_area: u32,
}

impl GridKey {
    /// The key of grids with `grid_size` samples per side.
    pub fn new(grid_size: u32) -> Self {
        Self {
            grid_size,
            grid_area: grid_size * grid_size,
        }
    }

    /// Index of the sample `(x, y)` of `grid` in the flat sample arrays.
    #[inline]
    pub fn sample_index(&self, grid: usize, x: usize, y: usize) -> usize {
        grid * self.grid_area as usize + y * self.grid_size as usize + x
    }

    /// Number of quads of one grid.
    #[inline]
    pub fn quads_per_grid(&self) -> usize {
        let side = self.grid_size as usize - 1;
        side * side
    }
}

/// Is the quad `(x, y)` of a grid hidden?
///
/// A quad is hidden if any of its four corner samples is hidden. `grid_hidden` holds one
/// flag per sample of the grid.
#[inline]
pub fn paint_is_grid_face_hidden(
    grid_hidden: &[bool],
    grid_size: usize,
    x: usize,
    y: usize,
) -> bool {
    grid_hidden[y * grid_size + x]
        || grid_hidden[y * grid_size + x + 1]
        || grid_hidden[(y + 1) * grid_size + x + 1]
        || grid_hidden[(y + 1) * grid_size + x]
}

/// Multires grids: one square grid of samples per face corner of a base mesh.
///
/// Sample `(x, y)` of grid `g` is stored at `key.sample_index(g, x, y)` in every
/// per-sample array. The grids of face `f` are `face_grids(f)`, so each grid belongs to
/// exactly one base face.
#[derive(Clone, Debug)]
pub struct SubdivGrids {
    key: GridKey,
    positions: Vec<Point<Real>>,
    normals: Vec<Vector<Real>>,
    masks: Option<Vec<Real>>,
    grid_hidden: Option<Vec<bool>>,
    face_offsets: Vec<u32>,
    grid_to_face_map: Vec<u32>,
    material_indices: Option<Vec<i32>>,
    sharp_faces: Option<Vec<bool>>,
    hide_poly: Option<Vec<bool>>,
}

impl SubdivGrids {
    /// Creates grids from their sample positions.
    ///
    /// Face `f` of the base mesh owns the grids `face_offsets[f]..face_offsets[f + 1]`.
    pub fn new(
        grid_size: u32,
        face_offsets: Vec<u32>,
        positions: Vec<Point<Real>>,
    ) -> Result<Self, GridsBuilderError> {
        if grid_size < 2 {
            return Err(GridsBuilderError::GridSizeTooSmall { grid_size });
        }

        let key = GridKey::new(grid_size);
        let num_grids = face_offsets.last().copied().unwrap_or(0) as usize;

        if !GroupedIndices::offsets_are_valid(&face_offsets, num_grids) {
            return Err(GridsBuilderError::InvalidFaceOffsets { num_grids });
        }

        check_layer_len("position", positions.len(), num_grids * key.grid_area as usize)?;

        let mut grid_to_face_map = Vec::with_capacity(num_grids);
        for (face, w) in face_offsets.windows(2).enumerate() {
            grid_to_face_map.extend((w[0]..w[1]).map(|_| face as u32));
        }

        let mut result = Self {
            key,
            normals: vec![Vector::zeros(); positions.len()],
            positions,
            masks: None,
            grid_hidden: None,
            face_offsets,
            grid_to_face_map,
            material_indices: None,
            sharp_faces: None,
            hide_poly: None,
        };
        result.recompute_normals();
        Ok(result)
    }

    /// Sets the material index of every base face.
    pub fn with_material_indices(
        mut self,
        material_indices: Vec<i32>,
    ) -> Result<Self, GridsBuilderError> {
        check_layer_len("material_index", material_indices.len(), self.num_faces())?;
        self.material_indices = Some(material_indices);
        Ok(self)
    }

    /// Sets the sharp flag of every base face.
    pub fn with_sharp_faces(mut self, sharp_faces: Vec<bool>) -> Result<Self, GridsBuilderError> {
        check_layer_len("sharp_face", sharp_faces.len(), self.num_faces())?;
        self.sharp_faces = Some(sharp_faces);
        Ok(self)
    }

    /// Sets the per-sample mask.
    pub fn with_masks(mut self, masks: Vec<Real>) -> Result<Self, GridsBuilderError> {
        check_layer_len("mask", masks.len(), self.positions.len())?;
        self.masks = Some(masks);
        Ok(self)
    }

    /// Sets the per-sample hide flags.
    pub fn with_grid_hidden(mut self, grid_hidden: Vec<bool>) -> Result<Self, GridsBuilderError> {
        check_layer_len("grid_hidden", grid_hidden.len(), self.positions.len())?;
        self.grid_hidden = Some(grid_hidden);
        Ok(self)
    }

    /// The dimensions of the grids.
    #[inline]
    pub fn key(&self) -> GridKey {
        self.key
    }

    /// The number of grids.
    #[inline]
    pub fn num_grids(&self) -> usize {
        self.grid_to_face_map.len()
    }

    /// The number of base faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.face_offsets.len() - 1
    }

    /// The grids owned by the base face `face`.
    #[inline]
    pub fn face_grids(&self, face: usize) -> Range<usize> {
        self.face_offsets[face] as usize..self.face_offsets[face + 1] as usize
    }

    /// The base face of each grid.
    #[inline]
    pub fn grid_to_face_map(&self) -> &[u32] {
        &self.grid_to_face_map
    }

    /// The largest number of grids of a single face.
    pub fn max_grids_per_face(&self) -> usize {
        self.face_offsets
            .windows(2)
            .map(|w| (w[1] - w[0]) as usize)
            .max()
            .unwrap_or(0)
    }

    /// The positions of all the samples.
    #[inline]
    pub fn positions(&self) -> &[Point<Real>] {
        &self.positions
    }

    /// Mutable access to the positions of all the samples.
    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Point<Real>] {
        &mut self.positions
    }

    /// The normals of all the samples.
    #[inline]
    pub fn normals(&self) -> &[Vector<Real>] {
        &self.normals
    }

    /// The samples of the grid `grid`.
    #[inline]
    pub fn grid_positions(&self, grid: usize) -> &[Point<Real>] {
        let area = self.key.grid_area as usize;
        &self.positions[grid * area..(grid + 1) * area]
    }

    /// The per-sample mask, if any.
    #[inline]
    pub fn masks(&self) -> Option<&[Real]> {
        self.masks.as_deref()
    }

    /// The per-sample mask, created and filled with zeros if missing.
    pub fn masks_mut(&mut self) -> &mut [Real] {
        let len = self.positions.len();
        self.masks.get_or_insert_with(|| vec![0.0; len])
    }

    /// The per-sample hide flags of all the grids, if any.
    #[inline]
    pub fn grid_hidden(&self) -> Option<&[bool]> {
        self.grid_hidden.as_deref()
    }

    /// The per-sample hide flags of one grid, if any.
    #[inline]
    pub fn grid_hidden_of(&self, grid: usize) -> Option<&[bool]> {
        let area = self.key.grid_area as usize;
        self.grid_hidden
            .as_deref()
            .map(|h| &h[grid * area..(grid + 1) * area])
    }

    /// Hides or reveals one sample, creating the hide layer if needed.
    pub fn set_sample_hidden(&mut self, grid: usize, x: usize, y: usize, hidden: bool) {
        let index = self.key.sample_index(grid, x, y);
        let len = self.positions.len();
        self.grid_hidden.get_or_insert_with(|| vec![false; len])[index] = hidden;
    }

    /// Hides or reveals every sample of a grid, creating the hide layer if needed.
    pub fn set_grid_hidden(&mut self, grid: usize, hidden: bool) {
        let area = self.key.grid_area as usize;
        let len = self.positions.len();
        self.grid_hidden.get_or_insert_with(|| vec![false; len])[grid * area..(grid + 1) * area]
            .fill(hidden);
    }

    /// Removes the hide layer, revealing every sample.
    pub fn clear_grid_hidden(&mut self) {
        self.grid_hidden = None;
    }

    /// The per-face hide flags, if any.
    #[inline]
    pub fn hide_poly(&self) -> Option<&[bool]> {
        self.hide_poly.as_deref()
    }

    /// Hides every base face with at least one grid whose last sample is hidden.
    ///
    /// The face hide layer is removed if no face ends up hidden.
    pub fn flush_grid_hidden_to_faces(&mut self) {
        let Some(grid_hidden) = &self.grid_hidden else {
            self.hide_poly = None;
            return;
        };

        let area = self.key.grid_area as usize;
        let hide_poly: Vec<bool> = (0..self.num_faces())
            .map(|face| {
                self.face_grids(face)
                    .any(|grid| grid_hidden[grid * area + area - 1])
            })
            .collect();

        self.hide_poly = hide_poly.contains(&true).then_some(hide_poly);
    }

    /// Can two grids end up in the same leaf, i.e., do their faces share their material
    /// and shading?
    pub fn grid_materials_match(&self, a: usize, b: usize) -> bool {
        let fa = self.grid_to_face_map[a] as usize;
        let fb = self.grid_to_face_map[b] as usize;

        if fa == fb {
            return true;
        }

        if let Some(sharp) = &self.sharp_faces {
            if sharp[fa] != sharp[fb] {
                return false;
            }
        }

        if let Some(materials) = &self.material_indices {
            if materials[fa] != materials[fb] {
                return false;
            }
        }

        true
    }

    /// The bounding box of all the samples of `grid`.
    pub fn grid_aabb(&self, grid: usize) -> Aabb {
        Aabb::from_points(self.grid_positions(grid))
    }

    /// The four corners of the quad `(x, y)` of `grid`, in the order used for ray-casting:
    /// `(x, y + 1)`, `(x + 1, y + 1)`, `(x + 1, y)`, `(x, y)`.
    #[inline]
    pub fn quad_sample_indices(&self, grid: usize, x: usize, y: usize) -> [usize; 4] {
        [
            self.key.sample_index(grid, x, y + 1),
            self.key.sample_index(grid, x + 1, y + 1),
            self.key.sample_index(grid, x + 1, y),
            self.key.sample_index(grid, x, y),
        ]
    }

    /// The normal of the quad `(x, y)` of `grid`.
    ///
    /// It points toward `+z` for a grid whose sample `(x, y)` lies at `(x, y, 0)`.
    pub fn quad_normal(&self, grid: usize, x: usize, y: usize) -> Vector<Real> {
        let [c0, c1, c2, c3] = self.quad_sample_indices(grid, x, y);
        let p = &self.positions;
        ccw_quad_normal([&p[c3], &p[c2], &p[c1], &p[c0]])
    }

    fn grid_normals_calc(&self, grid: usize) -> Vec<Vector<Real>> {
        let gs = self.key.grid_size as usize;
        let mut normals = vec![Vector::zeros(); self.key.grid_area as usize];

        for y in 0..gs - 1 {
            for x in 0..gs - 1 {
                let n = self.quad_normal(grid, x, y);
                for (sx, sy) in [(x, y), (x + 1, y), (x + 1, y + 1), (x, y + 1)] {
                    normals[sy * gs + sx] += n;
                }
            }
        }

        for n in &mut normals {
            *n = n.try_normalize(0.0).unwrap_or_else(Vector::zeros);
        }

        normals
    }

    /// Recomputes the sample normals of the given grids.
    ///
    /// Each sample normal is the normalized sum of the normals of the quads around it
    /// within its own grid.
    pub fn update_normals(&mut self, grids: &[usize]) {
        let area = self.key.grid_area as usize;

        for grid in grids {
            let normals = self.grid_normals_calc(*grid);
            self.normals[grid * area..(grid + 1) * area].copy_from_slice(&normals);
        }
    }

    pub(crate) fn set_grid_normals(&mut self, grid: usize, normals: &[Vector<Real>]) {
        let area = self.key.grid_area as usize;
        self.normals[grid * area..(grid + 1) * area].copy_from_slice(normals);
    }

    pub(crate) fn compute_grid_normals(&self, grid: usize) -> Vec<Vector<Real>> {
        self.grid_normals_calc(grid)
    }

    /// Recomputes the normals of every sample.
    pub fn recompute_normals(&mut self) {
        let all: Vec<usize> = (0..self.num_grids()).collect();
        self.update_normals(&all);
    }
}

#[cfg(test)]
mod test {
    use super::{paint_is_grid_face_hidden, GridsBuilderError, SubdivGrids};
    use crate::math::{Point, Real, Vector};

    fn flat_grid(grid_size: u32) -> Vec<Point<Real>> {
        let gs = grid_size as usize;
        (0..gs * gs)
            .map(|i| Point::new((i % gs) as Real, (i / gs) as Real, 0.0))
            .collect()
    }

    #[test]
    fn flat_grid_normals_point_up() {
        let grids = SubdivGrids::new(3, vec![0, 1], flat_grid(3)).unwrap();
        assert_eq!(grids.num_grids(), 1);
        assert!(grids.normals().iter().all(|n| *n == Vector::z()));
        assert_eq!(grids.quad_normal(0, 1, 1), Vector::z());
    }

    #[test]
    fn quad_hidden_if_any_corner_hidden() {
        let mut hidden = vec![false; 9];
        hidden[4] = true;
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert!(paint_is_grid_face_hidden(&hidden, 3, x, y));
        }
        hidden[4] = false;
        hidden[0] = true;
        assert!(paint_is_grid_face_hidden(&hidden, 3, 0, 0));
        assert!(!paint_is_grid_face_hidden(&hidden, 3, 1, 1));
    }

    #[test]
    fn invalid_grids_are_reported() {
        assert_eq!(
            SubdivGrids::new(1, vec![0, 1], vec![Point::origin()]).unwrap_err(),
            GridsBuilderError::GridSizeTooSmall { grid_size: 1 }
        );
        assert!(matches!(
            SubdivGrids::new(3, vec![0, 2], flat_grid(3)),
            Err(GridsBuilderError::LayerLengthMismatch { layer: "position", .. })
        ));
    }

    #[test]
    fn grid_layers() {
        let positions = [flat_grid(3), flat_grid(3)].concat();
        let mut grids = SubdivGrids::new(3, vec![0, 1, 2], positions)
            .unwrap()
            .with_grid_hidden(vec![false; 18])
            .unwrap();

        // Only the last sample of a grid decides if its face is hidden.
        grids.set_sample_hidden(1, 0, 0, true);
        grids.flush_grid_hidden_to_faces();
        assert_eq!(grids.hide_poly(), None);

        grids.set_sample_hidden(1, 2, 2, true);
        grids.flush_grid_hidden_to_faces();
        assert_eq!(grids.hide_poly(), Some(&[false, true][..]));

        grids.clear_grid_hidden();
        assert!(grids.grid_hidden().is_none());

        assert!(grids.masks().is_none());
        grids.masks_mut()[10] = 0.5;
        assert_eq!(grids.masks().map(|m| m.len()), Some(18));

        let grids = grids.with_masks(vec![1.0; 18]).unwrap();
        assert!(grids.masks().unwrap().iter().all(|m| *m == 1.0));
    }
}
