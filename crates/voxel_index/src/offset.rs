//! Views that rebase another indexable's coordinates.

use crate::bounds::IndexingBounds;
use crate::error::IndexError;
use crate::index::Index;
use crate::indexable::{BoundedIndexable, BoundedIndexableMut};

/// Presents `inner` at shifted coordinates without copying.
///
/// An index `i` of the view maps to `i - offset` in `inner`, so the view's
/// bounds are the inner bounds translated by `offset`. Chunks use this to
/// expose chunk-local voxel storage in stage-global coordinates.
///
/// # Example
/// ```
/// use voxel_index::{BoundedIndexable, DenseArray, Index2D, IndexingBounds, OffsetArray};
///
/// let local = DenseArray::from_fn(IndexingBounds::from_dimensions(Index2D::new(2, 2)), |i| i.x());
/// let global = OffsetArray::new(&local, Index2D::new(32, 64));
/// assert_eq!(global.get(Index2D::new(33, 64)), 1);
/// assert_eq!(global.bounds().lower(), Index2D::new(32, 64));
/// ```
#[derive(Clone, Debug)]
pub struct OffsetArray<A, const N: usize> {
    inner: A,
    offset: Index<N>,
}

impl<A, const N: usize> OffsetArray<A, N> {
    pub fn new(inner: A, offset: Index<N>) -> Self {
        Self { inner, offset }
    }

    #[inline]
    pub fn offset(&self) -> Index<N> {
        self.offset
    }

    pub fn inner(&self) -> &A {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut A {
        &mut self.inner
    }

    pub fn into_inner(self) -> A {
        self.inner
    }

    /// Map an index of this view to the inner indexable's coordinates.
    #[inline]
    pub fn to_inner(&self, index: Index<N>) -> Index<N> {
        index - self.offset
    }

    /// Map an inner index to this view's coordinates.
    #[inline]
    pub fn to_outer(&self, index: Index<N>) -> Index<N> {
        index + self.offset
    }
}

impl<A, const N: usize> BoundedIndexable<N> for OffsetArray<A, N>
where
    A: BoundedIndexable<N>,
{
    type Value = A::Value;

    fn bounds(&self) -> IndexingBounds<N> {
        self.inner.bounds().translated(self.offset)
    }

    fn try_get(&self, index: Index<N>) -> Option<A::Value> {
        self.inner.try_get(self.to_inner(index))
    }
}

impl<A, const N: usize> BoundedIndexableMut<N> for OffsetArray<A, N>
where
    A: BoundedIndexableMut<N>,
{
    fn try_set(&mut self, index: Index<N>, value: A::Value) -> Result<(), IndexError> {
        let inner_index = self.to_inner(index);
        match self.inner.try_set(inner_index, value) {
            Err(IndexError::InvalidIndex { .. }) => Err(IndexError::invalid(index, &self.bounds())),
            other => other,
        }
    }
}
