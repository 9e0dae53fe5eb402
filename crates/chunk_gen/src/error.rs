//! Error types for chunk generation.

use std::sync::Arc;

use chunk_cache::{CacheError, PoolError, SharedError};
use thiserror::Error;
use voxel_index::IndexError;
use voxel_serial::{DeserializeError, SerializeError};

use crate::phase::{PhaseIdentity, StageIdentity};

pub use chunk_cache::ConfigError;

/// Failure of a chunk store or key-value store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The operation observed its cancellation token.
    #[error("store operation canceled")]
    Canceled,
    /// A stored value could not be parsed back.
    #[error("stored value for {key:?} is corrupt: {value:?}")]
    Corrupt { key: String, value: String },
    /// The backing store failed.
    #[error("store backend failed: {0}")]
    Backend(#[source] SharedError),
}

/// Anything that can go wrong while generating chunks.
///
/// Clone so a phase's completion and progress stream can both report it.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("chunk serialization failed: {0}")]
    Serialize(#[from] SerializeError),

    #[error("chunk deserialization failed: {0}")]
    Deserialize(#[source] Arc<DeserializeError>),

    /// A chunk processor, populator or other collaborator failed.
    #[error("chunk processing failed: {0}")]
    Processing(#[source] SharedError),

    /// The task running a phase panicked.
    #[error("phase task panicked: {0}")]
    Panicked(String),

    /// Work was abandoned because its phase was canceled.
    #[error("generation canceled")]
    Canceled,

    /// A failure attributed to a stage and phase.
    #[error(transparent)]
    Stage(#[from] StageGenerationError),
}

impl GenerationError {
    /// Wrap a collaborator's error.
    pub fn processing(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Processing(Arc::new(err))
    }

    /// Wrap a plain message.
    pub fn message(message: impl Into<String>) -> Self {
        Self::Processing(Arc::new(MessageError(message.into())))
    }
}

impl From<DeserializeError> for GenerationError {
    fn from(err: DeserializeError) -> Self {
        Self::Deserialize(Arc::new(err))
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

/// A generation failure attributed to the stage and phase it happened in.
#[derive(Debug, Clone, Error)]
#[error("Exception generating {phase}")]
pub struct StageGenerationError {
    pub stage: StageIdentity,
    pub phase: PhaseIdentity,
    #[source]
    pub source: Arc<GenerationError>,
}

impl StageGenerationError {
    /// Attribute `err` to `stage`/`phase`. Errors that are already
    /// attributed pass through unchanged.
    pub fn wrap(stage: &StageIdentity, phase: &PhaseIdentity, err: GenerationError) -> Self {
        match err {
            GenerationError::Stage(attributed) => attributed,
            other => Self {
                stage: stage.clone(),
                phase: phase.clone(),
                source: Arc::new(other),
            },
        }
    }
}
