//! The bounded indexable abstraction.
//!
//! Every storage strategy (dense buffers, constant fills, offset views and
//! trees) implements [`BoundedIndexable`], so serializers, chunk views and
//! populators are written once against the trait.

use crate::bounds::{BoundsIter, IndexingBounds};
use crate::error::IndexError;
use crate::index::Index;

/// Read access to values addressed by an N-dimensional index inside bounds.
///
/// `try_get` never panics; `get` treats an out-of-bounds index as a caller
/// bug and panics. `is_index_valid` must agree with `bounds()`.
pub trait BoundedIndexable<const N: usize> {
    type Value: Clone;

    /// Region of index space holding values.
    fn bounds(&self) -> IndexingBounds<N>;

    /// Value at `index`, or `None` when out of bounds.
    fn try_get(&self, index: Index<N>) -> Option<Self::Value>;

    /// Number of dimensions.
    fn rank(&self) -> usize {
        N
    }

    /// Whether `index` addresses a value.
    fn is_index_valid(&self, index: Index<N>) -> bool {
        self.bounds().contains(index)
    }

    /// Value at `index`.
    ///
    /// # Panics
    /// Panics if `index` is outside the bounds.
    fn get(&self, index: Index<N>) -> Self::Value {
        match self.try_get(index) {
            Some(value) => value,
            None => panic!("{}", IndexError::invalid(index, &self.bounds())),
        }
    }

    /// Number of values (always the bounds' length).
    fn len(&self) -> usize {
        self.bounds().len()
    }

    /// Bounded indexables are never empty.
    fn is_empty(&self) -> bool {
        false
    }

    /// Iterate `(index, value)` pairs over the whole bounded region in
    /// canonical order.
    fn iter(&self) -> IndexableIter<'_, Self, N>
    where
        Self: Sized,
    {
        IndexableIter {
            source: self,
            indices: self.bounds().iter(),
        }
    }
}

/// Write access for bounded indexables.
pub trait BoundedIndexableMut<const N: usize>: BoundedIndexable<N> {
    /// Store `value` at `index`. Never panics.
    fn try_set(&mut self, index: Index<N>, value: Self::Value) -> Result<(), IndexError>;

    /// Store `value` at `index`.
    ///
    /// # Panics
    /// Panics if `try_set` fails (out-of-bounds index, or an indexable that
    /// rejects writes).
    fn set(&mut self, index: Index<N>, value: Self::Value) {
        if let Err(err) = self.try_set(index, value) {
            panic!("{err}");
        }
    }

    /// Overwrite every value with `f(index)`.
    fn fill_with<F>(&mut self, mut f: F) -> Result<(), IndexError>
    where
        Self: Sized,
        F: FnMut(Index<N>) -> Self::Value,
    {
        for index in self.bounds().iter() {
            self.try_set(index, f(index))?;
        }
        Ok(())
    }

    /// Copy every value of `source` that lies inside these bounds.
    ///
    /// Returns the number of copied values.
    fn copy_from<S>(&mut self, source: &S) -> Result<usize, IndexError>
    where
        Self: Sized,
        S: BoundedIndexable<N, Value = Self::Value>,
    {
        let Some(overlap) = self.bounds().intersect(&source.bounds()) else {
            return Ok(0);
        };
        let mut copied = 0;
        for index in overlap.iter() {
            if let Some(value) = source.try_get(index) {
                self.try_set(index, value)?;
                copied += 1;
            }
        }
        Ok(copied)
    }
}

/// Iterator over `(index, value)` pairs of a [`BoundedIndexable`].
pub struct IndexableIter<'a, A: ?Sized, const N: usize> {
    source: &'a A,
    indices: BoundsIter<N>,
}

impl<'a, A, const N: usize> Iterator for IndexableIter<'a, A, N>
where
    A: BoundedIndexable<N> + ?Sized,
{
    type Item = (Index<N>, A::Value);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.indices.next()?;
        Some((index, self.source.get(index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.indices.size_hint()
    }
}

impl<'a, A, const N: usize> ExactSizeIterator for IndexableIter<'a, A, N> where
    A: BoundedIndexable<N> + ?Sized
{
}

impl<A, const N: usize> BoundedIndexable<N> for &A
where
    A: BoundedIndexable<N> + ?Sized,
{
    type Value = A::Value;

    fn bounds(&self) -> IndexingBounds<N> {
        (**self).bounds()
    }

    fn try_get(&self, index: Index<N>) -> Option<A::Value> {
        (**self).try_get(index)
    }
}

impl<A, const N: usize> BoundedIndexable<N> for &mut A
where
    A: BoundedIndexable<N> + ?Sized,
{
    type Value = A::Value;

    fn bounds(&self) -> IndexingBounds<N> {
        (**self).bounds()
    }

    fn try_get(&self, index: Index<N>) -> Option<A::Value> {
        (**self).try_get(index)
    }
}

impl<A, const N: usize> BoundedIndexableMut<N> for &mut A
where
    A: BoundedIndexableMut<N> + ?Sized,
{
    fn try_set(&mut self, index: Index<N>, value: A::Value) -> Result<(), IndexError> {
        (**self).try_set(index, value)
    }
}

impl<A, const N: usize> BoundedIndexable<N> for Box<A>
where
    A: BoundedIndexable<N> + ?Sized,
{
    type Value = A::Value;

    fn bounds(&self) -> IndexingBounds<N> {
        (**self).bounds()
    }

    fn try_get(&self, index: Index<N>) -> Option<A::Value> {
        (**self).try_get(index)
    }
}

impl<A, const N: usize> BoundedIndexableMut<N> for Box<A>
where
    A: BoundedIndexableMut<N> + ?Sized,
{
    fn try_set(&mut self, index: Index<N>, value: A::Value) -> Result<(), IndexError> {
        (**self).try_set(index, value)
    }
}
