//! Resource pools, expiry stashes and an async pinning cache.
//!
//! - [`Pool`] / [`TrackingPool`]: bounded, thread-safe pools of reusable
//!   values with reset and release hooks
//! - [`ExpiryStash`]: deferred, version-checked disposal of unpinned values
//! - [`PoolStash`]: a pool plus a stash sized from its capacity
//! - [`AsyncCache`]: at-most-one creation per key, reference-counted pins
//! - [`BoundedChunkCache`]: caches only keys inside a region
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chunk_cache::{AsyncCache, PoolStash, PoolStashConfig, PoolHooks, SharedError};
//!
//! # futures::executor::block_on(async {
//! let resources = PoolStash::filled(PoolStashConfig::default(), PoolHooks::new(), || vec![0u8; 16]);
//! let pool = resources.pool().clone();
//! let cache = AsyncCache::new(resources.stash_capacity(), move |key: u32| {
//!     let pool = pool.clone();
//!     async move {
//!         let mut buffer = pool.take_loan_async().await.map_err(|e| Arc::new(e) as SharedError)?;
//!         buffer[0] = key as u8;
//!         Ok(buffer)
//!     }
//! });
//!
//! let pin = cache.get_pin(3).await.unwrap();
//! assert_eq!(pin[0], 3);
//! assert_eq!(resources.pool().available_count(), 63);
//! # });
//! ```

pub mod bounded;
pub mod cache;
pub mod error;
pub mod expiry;
pub mod pool;
pub mod pool_stash;

pub use crate::bounded::BoundedChunkCache;
pub use crate::cache::{AsyncCache, CacheKey, CacheStats, PinnedValue};
pub use crate::error::{CacheCompletionError, CacheError, ConfigError, PoolError, SharedError};
pub use crate::expiry::{ExpiryStash, ExpiryToken, StashCapacity};
pub use crate::pool::{Pool, PoolConfig, PoolHooks, Pooled, TrackingPool};
pub use crate::pool_stash::{PoolStash, PoolStashConfig};
