//! Error types for pools and caches.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A foreign error that several awaiters may observe.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Failure taking a value from a [`Pool`](crate::Pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool was closed while (or before) waiting for a value.
    #[error("pool is closed")]
    Closed,
}

/// Failure pinning a cache value.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// `complete()` has been called; no new pins are handed out.
    #[error("cache has been completed")]
    Completed,
    /// The value factory failed. Every caller awaiting the same creation
    /// receives the same error.
    #[error("value creation failed: {0}")]
    Creation(#[source] SharedError),
}

/// Completion was attempted while values were still pinned.
///
/// Recoverable: release the listed pins and call `complete()` again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cache completed with {} pinned key(s): {:?}", .keys.len(), .keys)]
pub struct CacheCompletionError<K: fmt::Debug> {
    /// Keys that held at least one pin when completion was attempted.
    pub keys: Vec<K>,
}

/// An invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_error_lists_every_key() {
        let err = CacheCompletionError { keys: vec![3, 1] };
        assert_eq!(err.to_string(), "cache completed with 2 pinned key(s): [3, 1]");
    }

    #[test]
    fn creation_error_exposes_source() {
        use std::error::Error as _;
        let io: SharedError = Arc::new(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"));
        let err = CacheError::Creation(io);
        assert_eq!(err.to_string(), "value creation failed: disk gone");
        assert!(err.source().is_some());
    }
}
