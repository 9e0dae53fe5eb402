//! Enumeration of a stage's chunk keys in oscillating order.
//!
//! Each pass walks the stage row by row. The outer axis is the shorter
//! horizontal axis; the first pass ascends along it, the next descends, and
//! so on. Consecutive passes therefore start where the previous one ended,
//! which keeps sparse caches and stores warm.

use std::sync::atomic::{AtomicU64, Ordering};

use voxel_index::{BoundsIter, Index, IndexingBounds};

use crate::bounds::StageBounds;
use crate::key::{ChunkKey, ChunkOverheadKey};

/// A finite, re-enumerable set of keys.
pub trait KeyCollection<K>: Send + Sync {
    /// Number of keys one pass yields.
    fn count(&self) -> u64;

    /// Start a new pass over every key.
    fn keys(&self) -> Box<dyn Iterator<Item = K> + Send>;
}

/// Iterates bounds with axes visited in `order` (outermost first) and the
/// outer axis optionally reversed.
#[derive(Clone, Debug)]
struct OscillatingIter<const N: usize> {
    lower: Index<N>,
    dimensions: Index<N>,
    order: [usize; N],
    descending: bool,
    inner: BoundsIter<N>,
}

impl<const N: usize> OscillatingIter<N> {
    fn new(bounds: IndexingBounds<N>, order: [usize; N], descending: bool) -> Self {
        let permuted = bounds.dimensions().project(order);
        Self {
            lower: bounds.lower(),
            dimensions: bounds.dimensions(),
            order,
            descending,
            inner: IndexingBounds::from_dimensions(permuted).iter(),
        }
    }
}

impl<const N: usize> Iterator for OscillatingIter<N> {
    type Item = Index<N>;

    fn next(&mut self) -> Option<Index<N>> {
        let step = self.inner.next()?;
        let mut coords = self.lower.to_array();
        for (position, &axis) in self.order.iter().enumerate() {
            let mut offset = step.get(position);
            if position == 0 && self.descending {
                offset = self.dimensions.get(axis) - 1 - offset;
            }
            coords[axis] += offset;
        }
        Some(Index::from_array(coords))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<const N: usize> ExactSizeIterator for OscillatingIter<N> {}

/// Every 3D chunk key of a stage.
#[derive(Debug)]
pub struct ChunkKeyCollection {
    bounds: StageBounds,
    order: [usize; 3],
    passes: AtomicU64,
}

impl ChunkKeyCollection {
    pub fn new(bounds: StageBounds) -> Self {
        let dims = bounds.dimensions();
        // Shorter of X and Z outermost, the other horizontal axis next, Y innermost.
        let order = if dims.z() < dims.x() { [2, 0, 1] } else { [0, 2, 1] };
        Self {
            bounds,
            order,
            passes: AtomicU64::new(0),
        }
    }

    pub fn bounds(&self) -> StageBounds {
        self.bounds
    }

    /// The axis whose direction alternates between passes.
    pub fn oscillating_axis(&self) -> usize {
        self.order[0]
    }
}

impl KeyCollection<ChunkKey> for ChunkKeyCollection {
    fn count(&self) -> u64 {
        self.bounds.chunk_count()
    }

    fn keys(&self) -> Box<dyn Iterator<Item = ChunkKey> + Send> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed);
        let iter = OscillatingIter::new(self.bounds.chunk_bounds(), self.order, pass % 2 == 1);
        Box::new(iter.map(ChunkKey))
    }
}

/// Every column (overhead key) of a stage.
#[derive(Debug)]
pub struct ChunkOverheadKeyCollection {
    bounds: StageBounds,
    order: [usize; 2],
    passes: AtomicU64,
}

impl ChunkOverheadKeyCollection {
    pub fn new(bounds: StageBounds) -> Self {
        let order = match bounds.overhead_bounds().dimensions().min_dimension() {
            0 => [0, 1],
            _ => [1, 0],
        };
        Self {
            bounds,
            order,
            passes: AtomicU64::new(0),
        }
    }

    pub fn bounds(&self) -> StageBounds {
        self.bounds
    }

    pub fn oscillating_axis(&self) -> usize {
        self.order[0]
    }
}

impl KeyCollection<ChunkOverheadKey> for ChunkOverheadKeyCollection {
    fn count(&self) -> u64 {
        self.bounds.overhead_chunk_count()
    }

    fn keys(&self) -> Box<dyn Iterator<Item = ChunkOverheadKey> + Send> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed);
        let iter = OscillatingIter::new(self.bounds.overhead_bounds(), self.order, pass % 2 == 1);
        Box::new(iter.map(ChunkOverheadKey))
    }
}

/// A fixed list of keys, yielded in the same order every pass.
#[derive(Clone, Debug)]
pub struct ListKeyCollection<K> {
    keys: std::sync::Arc<[K]>,
}

impl<K> ListKeyCollection<K> {
    pub fn new(keys: impl Into<std::sync::Arc<[K]>>) -> Self {
        Self { keys: keys.into() }
    }
}

impl<K: Clone + Send + Sync + 'static> KeyCollection<K> for ListKeyCollection<K> {
    fn count(&self) -> u64 {
        self.keys.len() as u64
    }

    fn keys(&self) -> Box<dyn Iterator<Item = K> + Send> {
        let keys = std::sync::Arc::clone(&self.keys);
        Box::new((0..keys.len()).map(move |i| keys[i].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use voxel_index::Index3D;

    fn collection(dims: Index3D) -> ChunkKeyCollection {
        ChunkKeyCollection::new(StageBounds::new(ChunkKey::new(-1, 4, 10), dims))
    }

    #[test]
    fn yields_every_key_once() {
        let keys = collection(Index3D::new(3, 2, 4));
        let pass: Vec<_> = keys.keys().collect();
        assert_eq!(pass.len() as u64, keys.count());
        let unique: HashSet<_> = pass.iter().copied().collect();
        assert_eq!(unique.len(), 24);
        assert!(pass.iter().all(|key| keys.bounds().contains(*key)));
    }

    #[test]
    fn y_varies_fastest() {
        let keys = collection(Index3D::new(2, 3, 2));
        let pass: Vec<_> = keys.keys().take(3).collect();
        assert_eq!(
            pass,
            vec![ChunkKey::new(-1, 4, 10), ChunkKey::new(-1, 5, 10), ChunkKey::new(-1, 6, 10)]
        );
    }

    #[test]
    fn shorter_horizontal_axis_is_outermost() {
        assert_eq!(collection(Index3D::new(2, 1, 5)).oscillating_axis(), 0);
        assert_eq!(collection(Index3D::new(5, 1, 2)).oscillating_axis(), 2);
        assert_eq!(collection(Index3D::new(3, 1, 3)).oscillating_axis(), 0);
    }

    #[test]
    fn passes_alternate_direction_along_outer_axis() {
        let keys = collection(Index3D::new(5, 1, 2));
        let first: Vec<_> = keys.keys().collect();
        let second: Vec<_> = keys.keys().collect();
        let third: Vec<_> = keys.keys().collect();

        let outer = |pass: &[ChunkKey]| -> Vec<i32> { pass.iter().map(|k| k.z()).collect() };
        assert!(outer(&first).windows(2).all(|w| w[0] <= w[1]));
        assert!(outer(&second).windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(first, third);

        let a: HashSet<_> = first.into_iter().collect();
        let b: HashSet<_> = second.into_iter().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn descending_pass_keeps_inner_rows_ascending() {
        let keys = collection(Index3D::new(2, 1, 3));
        keys.keys().for_each(drop);
        let second: Vec<_> = keys.keys().collect();
        assert_eq!(second[0], ChunkKey::new(0, 4, 10));
        assert_eq!(second[1], ChunkKey::new(0, 4, 11));
        assert_eq!(second[3], ChunkKey::new(-1, 4, 10));
    }

    #[test]
    fn overhead_keys_oscillate() {
        let bounds = StageBounds::new(ChunkKey::new(0, 0, 0), Index3D::new(4, 7, 2));
        let keys = ChunkOverheadKeyCollection::new(bounds);
        assert_eq!(keys.count(), 8);
        assert_eq!(keys.oscillating_axis(), 1);

        let first: Vec<_> = keys.keys().collect();
        let second: Vec<_> = keys.keys().collect();
        assert_eq!(first[0], ChunkOverheadKey::new(0, 0));
        assert_eq!(first[1], ChunkOverheadKey::new(1, 0));
        assert_eq!(second[0], ChunkOverheadKey::new(0, 1));
        assert_eq!(second.last(), Some(&ChunkOverheadKey::new(3, 0)));
    }

    #[test]
    fn list_collection_repeats_in_order() {
        let keys = ListKeyCollection::new(vec![3, 1, 2]);
        assert_eq!(keys.count(), 3);
        assert_eq!(keys.keys().collect::<Vec<_>>(), vec![3, 1, 2]);
        assert_eq!(keys.keys().collect::<Vec<_>>(), vec![3, 1, 2]);
    }
}
