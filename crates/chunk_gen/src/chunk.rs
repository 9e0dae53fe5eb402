//! Chunks: a key plus the resources holding its data.

use std::borrow::{Borrow, BorrowMut};
use std::fmt;

use voxel_index::{BoundedIndexable, Index2D, Index3D, OffsetArray};

use crate::key::{ChunkKey, ChunkOverheadKey};
use crate::sky_island::SkyIslandMaps;
use crate::voxel::VoxelGrid;

/// A chunk of the world.
///
/// `R` is whatever owns the chunk's storage: a pooled loan, a plain value
/// or a shared reference. Storage is always indexed locally from zero; the
/// stage views rebase it by `key * chunk_size` without copying.
pub struct Chunk<K, R> {
    key: K,
    resources: R,
}

impl<K: Copy, R> Chunk<K, R> {
    pub fn new(key: K, resources: R) -> Self {
        Self { key, resources }
    }

    pub fn key(&self) -> K {
        self.key
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut R {
        &mut self.resources
    }

    pub fn into_resources(self) -> R {
        self.resources
    }

    /// Same key, resources transformed by `f`.
    pub fn map<S>(self, f: impl FnOnce(R) -> S) -> Chunk<K, S> {
        Chunk {
            key: self.key,
            resources: f(self.resources),
        }
    }
}

impl<K: fmt::Debug, R> fmt::Debug for Chunk<K, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk").field("key", &self.key).finish_non_exhaustive()
    }
}

/// A 3D chunk holding voxels.
pub type VoxelChunk<R> = Chunk<ChunkKey, R>;

/// A column chunk holding sky-island height maps.
pub type SkyIslandChunk<R> = Chunk<ChunkOverheadKey, R>;

impl<R: Borrow<VoxelGrid>> Chunk<ChunkKey, R> {
    /// Voxels in chunk-local coordinates.
    pub fn voxels(&self) -> &VoxelGrid {
        self.resources.borrow()
    }

    /// Voxels along one axis of the chunk.
    pub fn chunk_size(&self) -> i32 {
        self.voxels().bounds().dimensions().x()
    }

    fn stage_offset(&self) -> Index3D {
        self.key.0 * self.chunk_size()
    }

    /// Voxels in stage coordinates.
    pub fn stage_voxels(&self) -> OffsetArray<&VoxelGrid, 3> {
        OffsetArray::new(self.voxels(), self.stage_offset())
    }
}

impl<R: BorrowMut<VoxelGrid>> Chunk<ChunkKey, R> {
    pub fn voxels_mut(&mut self) -> &mut VoxelGrid {
        self.resources.borrow_mut()
    }

    /// Writable voxels in stage coordinates.
    pub fn stage_voxels_mut(&mut self) -> OffsetArray<&mut VoxelGrid, 3> {
        let offset = self.stage_offset();
        OffsetArray::new(self.voxels_mut(), offset)
    }
}

impl<R: Borrow<SkyIslandMaps>> Chunk<ChunkOverheadKey, R> {
    pub fn maps(&self) -> &SkyIslandMaps {
        self.resources.borrow()
    }

    /// Offset from column-local to stage overhead coordinates.
    pub fn stage_offset(&self) -> Index2D {
        self.key.0 * self.maps().chunk_size()
    }

    /// Top heights in stage overhead coordinates.
    pub fn stage_top(&self) -> OffsetArray<&voxel_index::Array2D<f32>, 2> {
        OffsetArray::new(&self.maps().top, self.stage_offset())
    }

    /// Bottom heights in stage overhead coordinates.
    pub fn stage_bottom(&self) -> OffsetArray<&voxel_index::Array2D<f32>, 2> {
        OffsetArray::new(&self.maps().bottom, self.stage_offset())
    }
}

impl<R: BorrowMut<SkyIslandMaps>> Chunk<ChunkOverheadKey, R> {
    pub fn maps_mut(&mut self) -> &mut SkyIslandMaps {
        self.resources.borrow_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{empty_grid, Voxel};
    use voxel_index::{BoundedIndexableMut, IndexingBounds};

    fn chunk(key: ChunkKey) -> VoxelChunk<VoxelGrid> {
        Chunk::new(key, empty_grid(IndexingBounds::cube(Index3D::ZERO, 8)))
    }

    #[test]
    fn stage_view_is_offset_by_key() {
        let mut chunk = chunk(ChunkKey::new(1, -1, 0));
        chunk.voxels_mut().set(Index3D::new(2, 3, 4), Voxel::solid(9));

        let stage = chunk.stage_voxels();
        assert_eq!(stage.bounds().lower(), Index3D::new(8, -8, 0));
        assert_eq!(stage.get(Index3D::new(10, -5, 4)), Voxel::solid(9));
        assert_eq!(stage.try_get(Index3D::new(2, 3, 4)), None);
    }

    #[test]
    fn stage_writes_land_in_local_storage() {
        let mut chunk = chunk(ChunkKey::new(-1, 0, 0));
        chunk.stage_voxels_mut().set(Index3D::new(-1, 0, 0), Voxel::solid(3));
        assert_eq!(chunk.voxels().get(Index3D::new(7, 0, 0)), Voxel::solid(3));
        assert!(chunk.stage_voxels_mut().try_set(Index3D::new(0, 0, 0), Voxel::AIR).is_err());
    }

    #[test]
    fn borrowed_resources_work() {
        let grid = empty_grid(IndexingBounds::cube(Index3D::ZERO, 4));
        let chunk = Chunk::new(ChunkKey::new(0, 2, 0), &grid);
        assert_eq!(chunk.chunk_size(), 4);
        assert_eq!(chunk.stage_voxels().bounds().lower(), Index3D::new(0, 8, 0));
    }

    #[test]
    fn sky_island_stage_views() {
        let maps = SkyIslandMaps::new(4);
        let chunk = Chunk::new(ChunkOverheadKey::new(2, -1), maps);
        assert_eq!(chunk.stage_top().bounds().lower(), Index2D::new(8, -4));
        assert_eq!(chunk.stage_bottom().bounds().dimensions(), Index2D::new(4, 4));
    }
}
