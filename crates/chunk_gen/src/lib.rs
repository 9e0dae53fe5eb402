//! Chunk model, stages and the multi-phase generation pipeline.
//!
//! A world is split into cubic chunks addressed by [`ChunkKey`]. Generation
//! runs as a sequence of phases over the chunks of a [`StageBounds`]:
//!
//! - **Chunks** ([`chunk`], [`voxel`], [`sky_island`]): a key plus pooled
//!   resources, viewed in local or stage coordinates
//! - **Factories** ([`factory`], [`populator`]): borrow resources from a
//!   pool, fill them from a store or procedurally, share one exterior chunk
//!   outside the stage, and pin chunks through a cache
//! - **Phases** ([`phase`]): cancelable background jobs that visit every
//!   key in oscillating order and report progress
//! - **Persistence** ([`persist`], [`stats_store`]): chunk blobs and scalar
//!   statistics behind store traits
//! - **Stages** ([`stage`]): keep one live chunk per active key
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chunk_gen::factory::PoolingChunkFactory;
//! use chunk_gen::phase::{
//!     ChunkedBatchingPhase, GenerationPhase, NoopProcessor, PhaseIdentity, PhaseOutcome,
//!     StageIdentity,
//! };
//! use chunk_gen::persist::MemoryChunkStore;
//! use chunk_gen::populator::{SyncPopulator, UniformPopulator};
//! use chunk_gen::{ChunkGrid, GenerationConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let config = GenerationConfig {
//!     grid: ChunkGrid::new(8, 1.0),
//!     ..GenerationConfig::default()
//! };
//! config.validate().unwrap();
//!
//! let resources = config.voxel_pool();
//! let factory = PoolingChunkFactory::new(
//!     resources.pool().clone(),
//!     SyncPopulator(UniformPopulator::material(1)),
//! );
//! let store = Arc::new(MemoryChunkStore::new());
//! let phase = ChunkedBatchingPhase::spawn(
//!     StageIdentity::new("overworld"),
//!     PhaseIdentity::new("terrain"),
//!     Arc::new(config.chunk_keys()),
//!     Arc::new(factory),
//!     Arc::new(NoopProcessor),
//!     Arc::new(config.persister()),
//!     Arc::clone(&store),
//!     config.batching(),
//! );
//!
//! assert_eq!(phase.completion().await.unwrap(), PhaseOutcome::Completed);
//! assert_eq!(store.len() as u64, phase.progress_total_count());
//! # }
//! ```

pub mod bounds;
pub mod chunk;
pub mod config;
pub mod error;
pub mod external;
pub mod factory;
pub mod key;
pub mod keys;
pub mod persist;
pub mod phase;
pub mod populator;
pub mod sky_island;
pub mod stage;
pub mod stats_store;
pub mod voxel;

pub use crate::bounds::StageBounds;
pub use crate::chunk::{Chunk, SkyIslandChunk, VoxelChunk};
pub use crate::config::GenerationConfig;
pub use crate::error::{ConfigError, GenerationError, StageGenerationError, StoreError};
pub use crate::external::{Contour, DivisibleMesh, Noise};
pub use crate::factory::{
    AsyncChunkFactory, CachedChunkFactory, ChunkFactory, ExteriorChunkFactory, FnChunkFactory,
    PoolingChunkFactory, StageKey,
};
pub use crate::key::{ChunkGrid, ChunkKey, ChunkOverheadKey};
pub use crate::keys::{ChunkKeyCollection, ChunkOverheadKeyCollection, KeyCollection, ListKeyCollection};
pub use crate::persist::{
    ChunkPersister, ChunkStore, Keyed, MemoryChunkStore, SerializedChunk, VoxelChunkPersister,
};
pub use crate::sky_island::{SkyIslandHeightRange, SkyIslandMaps};
pub use crate::stage::{Stage, StageEvent};
pub use crate::stats_store::{KeyValueStore, KeyValueStoreExt, MemoryKeyValueStore, ValueKey};
pub use crate::voxel::{MaterialId, Voxel, VoxelGrid};
