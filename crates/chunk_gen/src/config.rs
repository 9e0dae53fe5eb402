//! Settings of a generation run and the pieces built from them.

use chunk_cache::{PoolHooks, PoolStash, PoolStashConfig};
use voxel_index::Index3D;
use voxel_serial::Endianness;

use crate::bounds::StageBounds;
use crate::error::ConfigError;
use crate::key::{ChunkGrid, ChunkKey};
use crate::keys::{ChunkKeyCollection, ChunkOverheadKeyCollection};
use crate::persist::VoxelChunkPersister;
use crate::phase::{BatchingConfig, PhaseConfig};
use crate::sky_island::SkyIslandMaps;
use crate::voxel::{empty_grid, Voxel, VoxelGrid};

/// Everything a generation run needs to know up front.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GenerationConfig {
    /// Chunk and voxel sizes.
    pub grid: ChunkGrid,
    /// Chunks to generate.
    pub stage: StageBounds,
    /// Chunk resources held in reserve, and how many evicted chunks a cache
    /// keeps alive per pooled resource.
    pub pool: PoolStashConfig,
    /// Parallelism of every phase.
    pub phase: PhaseConfig,
    /// Chunks written to a store per batch.
    pub max_buffered_chunks: usize,
    /// Byte order of persisted chunks.
    pub endianness: Endianness,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            grid: ChunkGrid::default(),
            stage: StageBounds::new(ChunkKey::ZERO, Index3D::new(8, 4, 8)),
            pool: PoolStashConfig::default(),
            phase: PhaseConfig::default(),
            max_buffered_chunks: BatchingConfig::default().max_buffered_chunks,
            endianness: Endianness::Little,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.chunk_size <= 0 {
            return Err(ConfigError::new("chunk size", "must be positive"));
        }
        if self.grid.voxel_size.is_nan() || self.grid.voxel_size <= 0.0 {
            return Err(ConfigError::new("voxel size", "must be positive"));
        }
        if self.grid.local_bounds().checked_len().is_none() {
            return Err(ConfigError::new(
                "chunk size",
                format!("{}³ voxels do not fit in memory", self.grid.chunk_size),
            ));
        }
        if self.pool.pool.capacity.is_none() {
            return Err(ConfigError::new(
                "pool capacity",
                "chunk resources must come from a bounded pool",
            ));
        }
        self.pool.validate()?;
        self.batching().validate()
    }

    pub fn batching(&self) -> BatchingConfig {
        BatchingConfig {
            phase: self.phase,
            max_buffered_chunks: self.max_buffered_chunks,
        }
    }

    /// Stage keys in traversal order.
    pub fn chunk_keys(&self) -> ChunkKeyCollection {
        ChunkKeyCollection::new(self.stage)
    }

    pub fn overhead_keys(&self) -> ChunkOverheadKeyCollection {
        ChunkOverheadKeyCollection::new(self.stage)
    }

    pub fn persister(&self) -> VoxelChunkPersister {
        VoxelChunkPersister::new(self.grid.local_bounds(), self.endianness)
    }

    /// Pre-filled voxel grids that are cleared to air when returned.
    ///
    /// # Panics
    /// Panics if the config is invalid.
    pub fn voxel_pool(&self) -> PoolStash<VoxelGrid> {
        let bounds = self.grid.local_bounds();
        let hooks = PoolHooks::new().reset(|grid: &mut VoxelGrid| grid.fill(Voxel::AIR));
        PoolStash::filled(self.pool, hooks, || empty_grid(bounds))
    }

    /// Pre-filled overhead maps that are cleared when returned.
    ///
    /// # Panics
    /// Panics if the config is invalid.
    pub fn sky_island_pool(&self) -> PoolStash<SkyIslandMaps> {
        let chunk_size = self.grid.chunk_size;
        let hooks = PoolHooks::new().reset(SkyIslandMaps::clear);
        PoolStash::filled(self.pool, hooks, || SkyIslandMaps::new(chunk_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyCollection;
    use chunk_cache::{PoolConfig, StashCapacity};
    use voxel_index::BoundedIndexable;

    fn small() -> GenerationConfig {
        GenerationConfig {
            grid: ChunkGrid::new(4, 0.5),
            stage: StageBounds::new(ChunkKey::new(-1, 0, -1), Index3D::new(3, 1, 3)),
            pool: PoolStashConfig {
                pool: PoolConfig::bounded(4),
                stash_capacity_multiplier: 2,
            },
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn default_is_valid() {
        assert!(GenerationConfig::default().validate().is_ok());
        assert!(small().validate().is_ok());
    }

    #[test]
    fn rejects_bad_settings() {
        let mut config = small();
        config.grid.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = small();
        config.max_buffered_chunks = 0;
        assert_eq!(config.validate().unwrap_err().field, "max_buffered_chunks");

        let mut config = small();
        config.pool.pool = PoolConfig::unbounded();
        assert!(config.validate().is_err());

        let mut config = small();
        config.grid.voxel_size = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn derived_pieces_follow_the_config() {
        let mut config = small();
        assert_eq!(config.chunk_keys().count(), 9);
        assert_eq!(config.overhead_keys().count(), 9);
        assert_eq!(config.persister().persisted_len(), 4 + 64 * 4);

        config.pool.pool = PoolConfig::bounded(1);
        let voxels = config.voxel_pool();
        assert_eq!(voxels.pool().available_count(), 1);
        assert_eq!(voxels.stash_capacity(), StashCapacity::Bounded(2));
        let mut grid = voxels.pool().take_loan().unwrap();
        assert_eq!(grid.bounds(), config.grid.local_bounds());
        grid.fill(Voxel::solid(3));
        drop(grid);
        let grid = voxels.pool().take_loan().unwrap();
        assert!(grid.iter().all(|(_, voxel)| voxel == Voxel::AIR));
    }
}
