//! A cache restricted to a region of keys.

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::cache::{AsyncCache, CacheKey, CacheStats, PinnedValue};
use crate::error::CacheError;

/// Wraps an [`AsyncCache`] so that only keys inside a region are cached.
///
/// Keys outside the region are served by a synchronous fallback factory as
/// detached pins: nothing is cached or pooled for them, and dropping the pin
/// drops the value.
pub struct BoundedChunkCache<K: CacheKey, V: Send + Sync + 'static> {
    cache: AsyncCache<K, V>,
    contains: Arc<dyn Fn(&K) -> bool + Send + Sync>,
    fallback: Arc<dyn Fn(&K) -> V + Send + Sync>,
}

impl<K: CacheKey, V: Send + Sync + 'static> Clone for BoundedChunkCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            contains: Arc::clone(&self.contains),
            fallback: Arc::clone(&self.fallback),
        }
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> fmt::Debug for BoundedChunkCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChunkCache")
            .field("entries", &self.cache.len())
            .field("stats", &self.cache.stats())
            .finish()
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> BoundedChunkCache<K, V> {
    pub fn new(
        cache: AsyncCache<K, V>,
        contains: impl Fn(&K) -> bool + Send + Sync + 'static,
        fallback: impl Fn(&K) -> V + Send + Sync + 'static,
    ) -> Self {
        Self {
            cache,
            contains: Arc::new(contains),
            fallback: Arc::new(fallback),
        }
    }

    /// Whether `key` is served by the inner cache.
    pub fn is_cached_region(&self, key: &K) -> bool {
        (self.contains)(key)
    }

    /// Pin `key` through the cache, or build a detached pin when the key is
    /// outside the region.
    pub async fn get_pin(&self, key: K) -> Result<PinnedValue<K, V>, CacheError> {
        if self.is_cached_region(&key) {
            return self.cache.get_pin(key).await;
        }
        if self.cache.is_completed() {
            return Err(CacheError::Completed);
        }
        trace!("bypassing cache for out-of-region key {key:?}");
        self.cache.count_bypass();
        let value = (self.fallback)(&key);
        Ok(PinnedValue::detached(key, value))
    }

    pub fn cache(&self) -> &AsyncCache<K, V> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SharedError;
    use crate::expiry::StashCapacity;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn region_cache(created: &Arc<AtomicUsize>) -> BoundedChunkCache<i32, String> {
        let counter = Arc::clone(created);
        let cache = AsyncCache::new(StashCapacity::Unbounded, move |key: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, SharedError>(format!("chunk {key}")) }
        });
        BoundedChunkCache::new(cache, |key| (0..4).contains(key), |_| "exterior".to_string())
    }

    #[tokio::test]
    async fn inside_keys_are_cached() {
        let created = Arc::new(AtomicUsize::new(0));
        let cache = region_cache(&created);
        let a = cache.get_pin(2).await.unwrap();
        let b = cache.get_pin(2).await.unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.value(), "chunk 2");
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn outside_keys_get_detached_pins() {
        let created = Arc::new(AtomicUsize::new(0));
        let cache = region_cache(&created);
        let pin = cache.get_pin(10).await.unwrap();
        assert!(pin.is_detached());
        assert_eq!(pin.value(), "exterior");
        assert_eq!(created.load(Ordering::SeqCst), 0);
        assert!(!cache.cache().contains_key(&10));
        assert_eq!(cache.stats().bypasses, 1);

        drop(pin);
        assert_eq!(cache.cache().stash_len(), 0);
    }

    #[tokio::test]
    async fn completed_cache_rejects_every_key() {
        let created = Arc::new(AtomicUsize::new(0));
        let cache = region_cache(&created);
        cache.cache().complete().await.unwrap();
        assert!(matches!(cache.get_pin(1).await, Err(CacheError::Completed)));
        assert!(matches!(cache.get_pin(-1).await, Err(CacheError::Completed)));
    }
}
