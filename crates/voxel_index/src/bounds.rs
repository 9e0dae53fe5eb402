//! Rectangular index regions.

use crate::index::Index;

/// An axis-aligned region of index space.
///
/// Stored as a lower corner plus per-dimension lengths. The upper corner is
/// derived so that `upper = lower + dimensions - 1` always holds.
///
/// # Example
/// ```
/// use voxel_index::{Index3D, IndexingBounds};
///
/// let bounds = IndexingBounds::new(Index3D::new(-1, 0, 2), Index3D::new(4, 2, 3));
/// assert_eq!(bounds.upper(), Index3D::new(2, 1, 4));
/// assert_eq!(bounds.len(), 24);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexingBounds<const N: usize> {
    lower: Index<N>,
    dimensions: Index<N>,
}

impl<const N: usize> IndexingBounds<N> {
    /// Create bounds from a lower corner and per-dimension lengths.
    ///
    /// # Panics
    /// Panics if any dimension is not strictly positive, or if the upper
    /// corner would overflow `i32`.
    pub fn new(lower: Index<N>, dimensions: Index<N>) -> Self {
        assert!(
            dimensions.all_positive(),
            "bounds dimensions must be positive, got {dimensions}"
        );
        for d in 0..N {
            assert!(
                lower.get(d).checked_add(dimensions.get(d) - 1).is_some(),
                "upper bound overflows along dimension {d}"
            );
        }
        Self { lower, dimensions }
    }

    /// Bounds starting at the origin.
    pub fn from_dimensions(dimensions: Index<N>) -> Self {
        Self::new(Index::ZERO, dimensions)
    }

    /// Bounds covering `lower..=upper`.
    pub fn from_corners(lower: Index<N>, upper: Index<N>) -> Self {
        Self::new(lower, upper - lower + Index::ONE)
    }

    /// Bounds of a hypercube with the given side length.
    pub fn cube(lower: Index<N>, side: i32) -> Self {
        Self::new(lower, Index::splat(side))
    }

    #[inline]
    pub fn lower(&self) -> Index<N> {
        self.lower
    }

    #[inline]
    pub fn upper(&self) -> Index<N> {
        self.lower + self.dimensions - Index::ONE
    }

    #[inline]
    pub fn dimensions(&self) -> Index<N> {
        self.dimensions
    }

    /// Number of dimensions.
    #[inline]
    pub const fn rank(&self) -> usize {
        N
    }

    /// Total cell count, `None` if it does not fit in `u64`.
    pub fn checked_len(&self) -> Option<u64> {
        self.dimensions.checked_volume()
    }

    /// Total cell count as `u64`.
    ///
    /// # Panics
    /// Panics on overflow.
    pub fn long_len(&self) -> u64 {
        self.checked_len()
            .unwrap_or_else(|| panic!("length of bounds {:?} overflows u64", self.dimensions))
    }

    /// Total cell count as `usize`.
    ///
    /// # Panics
    /// Panics if the count does not fit in `usize`.
    pub fn len(&self) -> usize {
        let len = self.long_len();
        usize::try_from(len).unwrap_or_else(|_| panic!("length {len} overflows usize"))
    }

    /// Bounds always contain at least one cell.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `index` lies inside the bounds.
    #[inline]
    pub fn contains(&self, index: Index<N>) -> bool {
        (0..N).all(|d| {
            let offset = index.get(d) as i64 - self.lower.get(d) as i64;
            offset >= 0 && offset < self.dimensions.get(d) as i64
        })
    }

    /// Whether `other` lies entirely inside these bounds.
    pub fn contains_bounds(&self, other: &Self) -> bool {
        self.contains(other.lower) && self.contains(other.upper())
    }

    /// Bounds shifted by `offset`.
    pub fn translated(&self, offset: Index<N>) -> Self {
        Self::new(self.lower + offset, self.dimensions)
    }

    /// Intersection of two bounds, `None` when disjoint.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let lower = self.lower.max(other.lower);
        let upper = self.upper().min(other.upper());
        if (0..N).any(|d| lower.get(d) > upper.get(d)) {
            return None;
        }
        Some(Self::from_corners(lower, upper))
    }

    /// Canonical flat position of `index`: dimension 0 is outermost and the
    /// last dimension varies fastest. `None` when out of bounds.
    #[inline]
    pub fn linear_index(&self, index: Index<N>) -> Option<usize> {
        if !self.contains(index) {
            return None;
        }
        let mut flat = 0usize;
        for d in 0..N {
            let offset = (index.get(d) - self.lower.get(d)) as usize;
            flat = flat * self.dimensions.get(d) as usize + offset;
        }
        Some(flat)
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    ///
    /// # Panics
    /// Panics if `flat >= self.len()`.
    pub fn index_at(&self, flat: usize) -> Index<N> {
        assert!(flat < self.len(), "flat index {flat} out of range");
        let mut coords = [0i32; N];
        let mut rest = flat;
        for d in (0..N).rev() {
            let dim = self.dimensions.get(d) as usize;
            coords[d] = self.lower.get(d) + (rest % dim) as i32;
            rest /= dim;
        }
        Index::from_array(coords)
    }

    /// Iterate every index in canonical order.
    pub fn iter(&self) -> BoundsIter<N> {
        BoundsIter {
            bounds: *self,
            next: Some(self.lower),
            remaining: self.len(),
        }
    }
}

impl<const N: usize> IntoIterator for IndexingBounds<N> {
    type Item = Index<N>;
    type IntoIter = BoundsIter<N>;

    fn into_iter(self) -> BoundsIter<N> {
        self.iter()
    }
}

impl<const N: usize> IntoIterator for &IndexingBounds<N> {
    type Item = Index<N>;
    type IntoIter = BoundsIter<N>;

    fn into_iter(self) -> BoundsIter<N> {
        self.iter()
    }
}

/// Iterator over the indices of an [`IndexingBounds`] in canonical order.
#[derive(Clone, Debug)]
pub struct BoundsIter<const N: usize> {
    bounds: IndexingBounds<N>,
    next: Option<Index<N>>,
    remaining: usize,
}

impl<const N: usize> Iterator for BoundsIter<N> {
    type Item = Index<N>;

    fn next(&mut self) -> Option<Index<N>> {
        let current = self.next?;
        self.remaining -= 1;
        self.next = if self.remaining == 0 {
            None
        } else {
            let mut coords = current.to_array();
            let upper = self.bounds.upper();
            for d in (0..N).rev() {
                if coords[d] < upper.get(d) {
                    coords[d] += 1;
                    break;
                }
                coords[d] = self.bounds.lower.get(d);
            }
            Some(Index::from_array(coords))
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<const N: usize> ExactSizeIterator for BoundsIter<N> {}
