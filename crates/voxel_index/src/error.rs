//! Error types for indexable access.

use thiserror::Error;

/// Failure of a non-panicking indexable write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// The index lies outside the indexable's bounds.
    #[error("index {index} is outside bounds {lower}..={upper}")]
    InvalidIndex {
        index: String,
        lower: String,
        upper: String,
    },

    /// The indexable is read-only.
    #[error("indexable does not support writes")]
    Unsupported,
}

impl IndexError {
    pub(crate) fn invalid<const N: usize>(
        index: crate::Index<N>,
        bounds: &crate::IndexingBounds<N>,
    ) -> Self {
        IndexError::InvalidIndex {
            index: index.to_string(),
            lower: bounds.lower().to_string(),
            upper: bounds.upper().to_string(),
        }
    }
}
