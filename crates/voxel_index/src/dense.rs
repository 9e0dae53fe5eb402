//! Dense arrays backed by a flat buffer.

use crate::bounds::IndexingBounds;
use crate::error::IndexError;
use crate::index::Index;
use crate::indexable::{BoundedIndexable, BoundedIndexableMut};

/// Dense N-dimensional array with O(1) access.
///
/// Cells are stored in canonical order (dimension 0 outermost, last
/// dimension fastest), the same order serializers walk.
///
/// # Example
/// ```
/// use voxel_index::{BoundedIndexable, BoundedIndexableMut, DenseArray, Index2D, IndexingBounds};
///
/// let mut array = DenseArray::new(IndexingBounds::from_dimensions(Index2D::new(4, 4)), 0u8);
/// array.set(Index2D::new(1, 2), 7);
/// assert_eq!(array.get(Index2D::new(1, 2)), 7);
/// assert_eq!(array.try_get(Index2D::new(4, 0)), None);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DenseArray<T, const N: usize> {
    bounds: IndexingBounds<N>,
    data: Vec<T>,
}

pub type Array1D<T> = DenseArray<T, 1>;
pub type Array2D<T> = DenseArray<T, 2>;
pub type Array3D<T> = DenseArray<T, 3>;
pub type Array4D<T> = DenseArray<T, 4>;

impl<T: Clone, const N: usize> DenseArray<T, N> {
    /// Create an array with every cell set to `fill`.
    pub fn new(bounds: IndexingBounds<N>, fill: T) -> Self {
        Self {
            bounds,
            data: vec![fill; bounds.len()],
        }
    }

    /// Overwrite every cell with `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T: Clone + Default, const N: usize> DenseArray<T, N> {
    /// Create an array filled with `T::default()`.
    pub fn with_default(bounds: IndexingBounds<N>) -> Self {
        Self::new(bounds, T::default())
    }
}

impl<T, const N: usize> DenseArray<T, N> {
    /// Wrap an existing buffer laid out in canonical order.
    ///
    /// # Panics
    /// Panics if `data.len()` differs from `bounds.len()`.
    pub fn from_vec(bounds: IndexingBounds<N>, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            bounds.len(),
            "buffer length does not match bounds length"
        );
        Self { bounds, data }
    }

    /// Build an array by evaluating `f` for each index in canonical order.
    pub fn from_fn(bounds: IndexingBounds<N>, f: impl FnMut(Index<N>) -> T) -> Self {
        let data = bounds.iter().map(f).collect();
        Self { bounds, data }
    }

    /// Borrow the value at `index`.
    #[inline]
    pub fn get_ref(&self, index: Index<N>) -> Option<&T> {
        self.bounds.linear_index(index).map(|i| &self.data[i])
    }

    /// Mutably borrow the value at `index`.
    #[inline]
    pub fn get_mut(&mut self, index: Index<N>) -> Option<&mut T> {
        self.bounds.linear_index(index).map(move |i| &mut self.data[i])
    }

    /// Move the array to new lower bounds without touching the cells.
    pub fn rebase(&mut self, lower: Index<N>) {
        self.bounds = IndexingBounds::new(lower, self.bounds.dimensions());
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Clone, const N: usize> BoundedIndexable<N> for DenseArray<T, N> {
    type Value = T;

    #[inline]
    fn bounds(&self) -> IndexingBounds<N> {
        self.bounds
    }

    #[inline]
    fn try_get(&self, index: Index<N>) -> Option<T> {
        self.get_ref(index).cloned()
    }
}

impl<T: Clone, const N: usize> BoundedIndexableMut<N> for DenseArray<T, N> {
    #[inline]
    fn try_set(&mut self, index: Index<N>, value: T) -> Result<(), IndexError> {
        match self.bounds.linear_index(index) {
            Some(i) => {
                self.data[i] = value;
                Ok(())
            }
            None => Err(IndexError::invalid(index, &self.bounds)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Index1D, Index3D, Index4D};

    #[test]
    fn new_array_is_filled() {
        let array = Array3D::new(IndexingBounds::cube(Index3D::ZERO, 3), 9u16);
        assert_eq!(array.len(), 27);
        assert!(array.iter().all(|(_, v)| v == 9));
    }

    #[test]
    fn set_then_get_with_negative_lower_bounds() {
        let bounds = IndexingBounds::new(Index3D::new(-2, -2, -2), Index3D::splat(4));
        let mut array = Array3D::new(bounds, 0i32);
        array.set(Index3D::new(-2, 1, 0), 42);
        assert_eq!(array.get(Index3D::new(-2, 1, 0)), 42);
        assert_eq!(array.get(Index3D::new(-2, 1, 1)), 0);
    }

    #[test]
    fn try_set_out_of_bounds_is_invalid_index() {
        let mut array = Array1D::new(IndexingBounds::from_dimensions(Index1D::new(4)), 0u8);
        let err = array.try_set(Index1D::new(4), 1).unwrap_err();
        assert!(matches!(err, IndexError::InvalidIndex { .. }));
        assert_eq!(array.try_get(Index1D::new(-1)), None);
    }

    #[test]
    #[should_panic(expected = "outside bounds")]
    fn set_out_of_bounds_panics() {
        let mut array = Array1D::new(IndexingBounds::from_dimensions(Index1D::new(4)), 0u8);
        array.set(Index1D::new(10), 1);
    }

    #[test]
    fn enumeration_yields_every_index_once() {
        let bounds = IndexingBounds::new(Index4D::new(1, 2, 3, 4), Index4D::new(2, 3, 1, 2));
        let array = DenseArray::from_fn(bounds, |i| i);
        let pairs: Vec<_> = array.iter().collect();
        assert_eq!(pairs.len() as u64, bounds.long_len());
        for (index, value) in &pairs {
            assert_eq!(index, value);
            assert!(bounds.contains(*index));
        }
        let mut unique: Vec<_> = pairs.iter().map(|(i, _)| *i).collect();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), pairs.len());
    }

    #[test]
    fn from_vec_uses_canonical_order() {
        let bounds = IndexingBounds::from_dimensions(Index3D::new(2, 2, 2));
        let array = DenseArray::from_vec(bounds, (0..8).collect());
        assert_eq!(array.get(Index3D::new(0, 0, 1)), 1);
        assert_eq!(array.get(Index3D::new(0, 1, 0)), 2);
        assert_eq!(array.get(Index3D::new(1, 0, 0)), 4);
    }

    #[test]
    fn copy_from_only_touches_overlap() {
        let mut target = Array1D::new(IndexingBounds::from_dimensions(Index1D::new(6)), 0);
        let source = Array1D::new(IndexingBounds::new(Index1D::new(4), Index1D::new(6)), 5);
        let copied = target.copy_from(&source).unwrap();
        assert_eq!(copied, 2);
        assert_eq!(target.as_slice(), &[0, 0, 0, 0, 5, 5]);
    }

    #[test]
    fn rebase_moves_bounds() {
        let mut array = DenseArray::from_fn(IndexingBounds::from_dimensions(Index1D::new(3)), |i| i.x());
        array.rebase(Index1D::new(10));
        assert_eq!(array.get(Index1D::new(12)), 2);
        assert!(!array.is_index_valid(Index1D::new(0)));
    }
}
