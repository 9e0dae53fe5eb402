//! The region of chunk space a stage generates.

use voxel_index::{Index3D, IndexingBounds};

use crate::key::{ChunkGrid, ChunkKey, ChunkOverheadKey};

/// Minimum chunk key plus a positive size in chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageBounds {
    min: ChunkKey,
    dimensions: Index3D,
}

impl StageBounds {
    /// # Panics
    /// Panics unless every dimension is positive.
    pub fn new(min: ChunkKey, dimensions: Index3D) -> Self {
        assert!(
            dimensions.all_positive(),
            "stage dimensions must be positive, got {dimensions}"
        );
        Self { min, dimensions }
    }

    /// Bounds from a center key and a half-extent in chunks per axis.
    pub fn around(center: ChunkKey, radius: Index3D) -> Self {
        Self::new(ChunkKey(center.0 - radius), radius * 2 + Index3D::ONE)
    }

    pub fn min(&self) -> ChunkKey {
        self.min
    }

    /// Inclusive maximum key.
    pub fn max(&self) -> ChunkKey {
        ChunkKey(self.chunk_bounds().upper())
    }

    pub fn dimensions(&self) -> Index3D {
        self.dimensions
    }

    /// The stage's 3D chunk keys as bounds.
    pub fn chunk_bounds(&self) -> IndexingBounds<3> {
        IndexingBounds::new(self.min.0, self.dimensions)
    }

    /// The stage's columns as 2D bounds over X and Z.
    pub fn overhead_bounds(&self) -> IndexingBounds<2> {
        IndexingBounds::new(self.min.0.project_down(), self.dimensions.project_down())
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.chunk_bounds().contains(key.0)
    }

    pub fn contains_overhead(&self, key: ChunkOverheadKey) -> bool {
        self.overhead_bounds().contains(key.0)
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_bounds().long_len()
    }

    pub fn overhead_chunk_count(&self) -> u64 {
        self.overhead_bounds().long_len()
    }

    /// Voxel bounds covered by the stage in stage coordinates.
    pub fn voxel_bounds(&self, grid: &ChunkGrid) -> IndexingBounds<3> {
        IndexingBounds::new(grid.voxel_origin(self.min), self.dimensions * grid.chunk_size)
    }
}
