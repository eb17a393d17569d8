use core::ops::Range;

/// A list of index groups stored contiguously, like the corners of every face of a mesh.
///
/// Group `i` is `indices[offsets[i]..offsets[i + 1]]`. There is always one more offset
/// than groups, and the last offset is the total number of indices.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct GroupedIndices {
    offsets: Vec<u32>,
    indices: Vec<u32>,
}

impl Default for GroupedIndices {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            indices: Vec::new(),
        }
    }
}

impl GroupedIndices {
    /// Creates the groups from their offsets and the grouped indices.
    ///
    /// The offsets must start at zero, be non-decreasing and end at `indices.len()`.
    pub fn new(offsets: Vec<u32>, indices: Vec<u32>) -> Self {
        debug_assert_eq!(offsets.first().copied(), Some(0));
        debug_assert_eq!(offsets.last().copied(), Some(indices.len() as u32));
        Self { offsets, indices }
    }

    /// Checks that `offsets` describe valid groups over `num_indices` indices.
    pub fn offsets_are_valid(offsets: &[u32], num_indices: usize) -> bool {
        offsets.first() == Some(&0)
            && offsets.last().map(|e| *e as usize) == Some(num_indices)
            && offsets.windows(2).all(|w| w[0] <= w[1])
    }

    /// The number of groups.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Is there no group at all?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The range of `self.indices()` covered by the `i`-th group.
    #[inline]
    pub fn range(&self, i: usize) -> Range<usize> {
        self.offsets[i] as usize..self.offsets[i + 1] as usize
    }

    /// The indices of the `i`-th group.
    #[inline]
    pub fn group(&self, i: usize) -> &[u32] {
        &self.indices[self.range(i)]
    }

    /// The group offsets.
    #[inline]
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// All the indices, group after group.
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Iterates through all the groups.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u32]> + '_ {
        (0..self.len()).map(move |i| self.group(i))
    }

    /// The number of indices of the largest group.
    pub fn max_group_len(&self) -> usize {
        self.offsets
            .windows(2)
            .map(|w| (w[1] - w[0]) as usize)
            .max()
            .unwrap_or(0)
    }

    /// Computes the reverse mapping: for each value in `0..num_values`, the groups it
    /// appears in, in increasing order.
    ///
    /// With the corner vertices of every face, this gives the faces around every vertex.
    pub fn reverse(&self, num_values: usize) -> Self {
        let mut offsets = vec![0u32; num_values + 1];

        for value in &self.indices {
            offsets[*value as usize + 1] += 1;
        }

        for i in 0..num_values {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor: Vec<u32> = offsets[..num_values].to_vec();
        let mut indices = vec![0u32; self.indices.len()];

        for (group, values) in self.iter().enumerate() {
            for value in values {
                let slot = &mut cursor[*value as usize];
                indices[*slot as usize] = group as u32;
                *slot += 1;
            }
        }

        Self { offsets, indices }
    }
}

#[cfg(test)]
mod test {
    use super::GroupedIndices;

    #[test]
    fn reverse_lists_faces_around_vertices() {
        // Two triangles sharing the edge 1-2.
        let faces = GroupedIndices::new(vec![0, 3, 6], vec![0, 1, 2, 2, 1, 3]);
        let vert_to_face = faces.reverse(4);

        assert_eq!(vert_to_face.len(), 4);
        assert_eq!(vert_to_face.group(0), &[0]);
        assert_eq!(vert_to_face.group(1), &[0, 1]);
        assert_eq!(vert_to_face.group(2), &[0, 1]);
        assert_eq!(vert_to_face.group(3), &[1]);
        assert_eq!(faces.max_group_len(), 3);
    }

    #[test]
    fn offsets_validation() {
        assert!(GroupedIndices::offsets_are_valid(&[0, 3, 6], 6));
        assert!(!GroupedIndices::offsets_are_valid(&[0, 3, 6], 7));
        assert!(!GroupedIndices::offsets_are_valid(&[1, 3, 6], 6));
        assert!(!GroupedIndices::offsets_are_valid(&[0, 4, 3, 6], 6));
        assert!(!GroupedIndices::offsets_are_valid(&[], 0));
    }
}
