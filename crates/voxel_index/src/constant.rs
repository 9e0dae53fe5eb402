//! Arrays holding one value for every index.

use crate::bounds::IndexingBounds;
use crate::error::IndexError;
use crate::index::Index;
use crate::indexable::{BoundedIndexable, BoundedIndexableMut};

/// Bounded indexable returning the same value everywhere.
///
/// Used for regions outside the generated world: the storage cost is one
/// value no matter how large the bounds are. Writes are either rejected with
/// [`IndexError::Unsupported`] or silently dropped, depending on
/// `set_errors`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstantArray<T, const N: usize> {
    bounds: IndexingBounds<N>,
    value: T,
    set_errors: bool,
}

impl<T: Clone, const N: usize> ConstantArray<T, N> {
    /// Create a constant array.
    ///
    /// When `set_errors` is true, writes fail with `Unsupported`; otherwise
    /// in-bounds writes are ignored.
    pub fn new(bounds: IndexingBounds<N>, value: T, set_errors: bool) -> Self {
        Self {
            bounds,
            value,
            set_errors,
        }
    }

    /// The value returned for every index.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn set_errors(&self) -> bool {
        self.set_errors
    }
}

impl<T: Clone, const N: usize> BoundedIndexable<N> for ConstantArray<T, N> {
    type Value = T;

    fn bounds(&self) -> IndexingBounds<N> {
        self.bounds
    }

    fn try_get(&self, index: Index<N>) -> Option<T> {
        self.bounds.contains(index).then(|| self.value.clone())
    }
}

impl<T: Clone, const N: usize> BoundedIndexableMut<N> for ConstantArray<T, N> {
    fn try_set(&mut self, index: Index<N>, _value: T) -> Result<(), IndexError> {
        if self.set_errors {
            return Err(IndexError::Unsupported);
        }
        if !self.bounds.contains(index) {
            return Err(IndexError::invalid(index, &self.bounds));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::Index3D;

    fn bounds() -> IndexingBounds<3> {
        IndexingBounds::new(Index3D::new(-8, -8, -8), Index3D::splat(16))
    }

    #[test]
    fn returns_constant_for_every_index() {
        let array = ConstantArray::new(bounds(), 3u8, true);
        assert_eq!(array.iter().count(), 16 * 16 * 16);
        assert!(array.iter().all(|(_, v)| v == 3));
        assert_eq!(array.try_get(Index3D::new(8, 0, 0)), None);
    }

    #[test]
    fn set_with_errors_reports_unsupported() {
        let mut array = ConstantArray::new(bounds(), 3u8, true);
        for index in bounds().iter().step_by(97) {
            assert_eq!(array.try_set(index, 9), Err(IndexError::Unsupported));
        }
    }

    #[test]
    #[should_panic(expected = "does not support writes")]
    fn panicking_set_with_errors() {
        let mut array = ConstantArray::new(bounds(), 3u8, true);
        array.set(Index3D::ZERO, 1);
    }

    #[test]
    fn set_without_errors_is_a_no_op() {
        let mut array = ConstantArray::new(bounds(), 3u8, false);
        for index in bounds().iter() {
            array.set(index, 200);
        }
        assert!(array.iter().all(|(_, v)| v == 3));
    }

    #[test]
    fn silent_set_still_checks_bounds() {
        let mut array = ConstantArray::new(bounds(), 3u8, false);
        assert!(array.try_set(Index3D::splat(100), 1).is_err());
    }
}
