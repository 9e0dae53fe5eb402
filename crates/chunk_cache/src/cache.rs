//! Async cache of reference-counted, lazily created values.
//!
//! Each key maps to at most one entry. An entry is either being created (a
//! shared future every concurrent caller awaits) or ready. Callers hold
//! [`PinnedValue`]s; while any pin is alive the entry cannot be torn down.
//! When the last pin goes away the entry stays cached and an
//! [`ExpiryToken`] is handed to the stash, which decides when it actually
//! expires (see [`crate::expiry`]).
//!
//! All bookkeeping lives behind one mutex per cache. Values are never
//! dropped while that mutex is held.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, trace, warn};

use crate::error::{CacheCompletionError, CacheError, SharedError};
use crate::expiry::{ExpiryStash, ExpiryToken, StashCapacity};

type Creation<V> = Shared<BoxFuture<'static, Result<Arc<V>, CacheError>>>;
type Factory<K, V> = dyn Fn(K) -> BoxFuture<'static, Result<V, SharedError>> + Send + Sync;

/// Key bound shared by every cache.
pub trait CacheKey: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static> CacheKey for T {}

/// Counters describing cache traffic since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Pins served by an existing (ready or in-flight) entry.
    pub hits: u64,
    /// Pins that had to start a creation.
    pub misses: u64,
    /// Factory invocations that produced a value.
    pub creations: u64,
    /// Factory invocations that failed.
    pub failures: u64,
    /// Entries torn down by expiry or completion.
    pub expirations: u64,
    /// Pins served outside the cache by a bounded wrapper.
    pub bypasses: u64,
}

impl CacheStats {
    /// Fraction of pins served from the cache, `0.0` with no traffic.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
pub(crate) struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    creations: AtomicU64,
    failures: AtomicU64,
    expirations: AtomicU64,
    pub(crate) bypasses: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            creations: self.creations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }
}

enum EntryState<V> {
    Creating(Creation<V>),
    Ready(Arc<V>),
}

/// Bookkeeping record for one cached key.
struct CacheValue<V> {
    id: u64,
    pins: usize,
    version: u64,
    state: EntryState<V>,
}

struct CacheState<K, V> {
    entries: HashMap<K, CacheValue<V>>,
    stash: ExpiryStash<K>,
    next_id: u64,
    completed: bool,
}

impl<K: CacheKey, V> CacheState<K, V> {
    fn is_current(entries: &HashMap<K, CacheValue<V>>, token: &ExpiryToken<K>) -> bool {
        entries.get(token.key()).is_some_and(|entry| {
            entry.id == token.entry() && entry.version == token.version() && entry.pins == 0
        })
    }

    /// Removes the entry `token` refers to if the token is still current.
    fn expire(&mut self, token: &ExpiryToken<K>) -> Option<Arc<V>> {
        if !Self::is_current(&self.entries, token) {
            return None;
        }
        match self.entries.remove(token.key())?.state {
            EntryState::Ready(value) => Some(value),
            EntryState::Creating(_) => None,
        }
    }

    fn pinned_keys(&self) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.pins > 0)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

struct CacheInner<K, V> {
    state: Mutex<CacheState<K, V>>,
    factory: Box<Factory<K, V>>,
    stats: StatCounters,
}

impl<K: CacheKey, V: Send + Sync + 'static> CacheInner<K, V> {
    fn state(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Releases one pin on entry `id` of `key`. Returns a value to drop
    /// outside the lock when the stash forces an expiry.
    fn unpin(&self, key: &K, id: u64) {
        let expired = {
            let mut guard = self.state();
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(key).filter(|entry| entry.id == id) else {
                return;
            };
            assert!(entry.pins > 0, "unpinned cache entry {key:?} more often than it was pinned");
            entry.pins -= 1;
            if entry.pins > 0 {
                return;
            }
            entry.version += 1;
            if let EntryState::Creating(_) = entry.state {
                // Every waiter went away before the creation finished.
                debug!("abandoning unfinished creation for {key:?}");
                state.entries.remove(key);
                return;
            }
            let token = ExpiryToken::new(key.clone(), entry.id, entry.version);
            let entries = &state.entries;
            let forced = state
                .stash
                .add(token, |queued| CacheState::is_current(entries, queued));
            forced.and_then(|token| state.expire(&token))
        };
        if let Some(value) = expired {
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
            trace!("expired {key:?} on unpin");
            drop(value);
        }
    }

    fn repin(&self, key: &K, id: u64) {
        let mut state = self.state();
        if let Some(entry) = state.entries.get_mut(key).filter(|entry| entry.id == id) {
            entry.pins += 1;
            entry.version += 1;
        }
    }
}

/// Releases a pin taken for an in-flight creation if the waiting future is
/// dropped before the value is handed over.
struct PendingPin<K: CacheKey, V: Send + Sync + 'static> {
    cache: Arc<CacheInner<K, V>>,
    key: Option<K>,
    id: u64,
}

impl<K: CacheKey, V: Send + Sync + 'static> PendingPin<K, V> {
    fn into_pin(mut self, value: Arc<V>) -> PinnedValue<K, V> {
        let key = match self.key.take() {
            Some(key) => key,
            None => unreachable!("pending pin converted twice"),
        };
        PinnedValue {
            cache: Some(Arc::clone(&self.cache)),
            key,
            id: self.id,
            value,
        }
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> Drop for PendingPin<K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.cache.unpin(&key, self.id);
        }
    }
}

/// A lease on a cached value. The value stays alive and cached while any
/// pin for it exists; dropping the last pin queues the entry for expiry.
pub struct PinnedValue<K: CacheKey, V: Send + Sync + 'static> {
    cache: Option<Arc<CacheInner<K, V>>>,
    key: K,
    id: u64,
    value: Arc<V>,
}

impl<K: CacheKey, V: Send + Sync + 'static> PinnedValue<K, V> {
    /// A pin that is not backed by any cache; dropping it drops the value.
    pub fn detached(key: K, value: V) -> Self {
        Self {
            cache: None,
            key,
            id: 0,
            value: Arc::new(value),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Whether this pin bypassed the cache.
    pub fn is_detached(&self) -> bool {
        self.cache.is_none()
    }

    /// Whether both pins refer to the same value instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> Clone for PinnedValue<K, V> {
    fn clone(&self) -> Self {
        if let Some(cache) = &self.cache {
            cache.repin(&self.key, self.id);
        }
        Self {
            cache: self.cache.clone(),
            key: self.key.clone(),
            id: self.id,
            value: Arc::clone(&self.value),
        }
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> Deref for PinnedValue<K, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> Borrow<V> for PinnedValue<K, V> {
    fn borrow(&self) -> &V {
        &self.value
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> AsRef<V> for PinnedValue<K, V> {
    fn as_ref(&self) -> &V {
        &self.value
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> Drop for PinnedValue<K, V> {
    fn drop(&mut self) {
        if let Some(cache) = &self.cache {
            cache.unpin(&self.key, self.id);
        }
    }
}

impl<K: CacheKey, V: Send + Sync + fmt::Debug + 'static> fmt::Debug for PinnedValue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedValue")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("detached", &self.is_detached())
            .finish()
    }
}

/// Cache whose values are produced by an async factory, at most once per
/// key while the entry lives. Clones share the same cache.
///
/// # Example
/// ```
/// use chunk_cache::{AsyncCache, SharedError, StashCapacity};
///
/// # futures::executor::block_on(async {
/// let cache = AsyncCache::new(StashCapacity::Unbounded, |key: u32| async move {
///     Ok::<_, SharedError>(key * 10)
/// });
/// let pin = cache.get_pin(4).await.unwrap();
/// assert_eq!(*pin, 40);
/// drop(pin);
/// assert!(cache.try_expire_token());
/// assert!(cache.complete().await.is_ok());
/// # });
/// ```
pub struct AsyncCache<K: CacheKey, V: Send + Sync + 'static> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K: CacheKey, V: Send + Sync + 'static> Clone for AsyncCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: CacheKey, V: Send + Sync + 'static> AsyncCache<K, V> {
    pub fn new<F, Fut>(stash_capacity: StashCapacity, factory: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, SharedError>> + Send + 'static,
    {
        Self {
            inner: Arc::new(CacheInner {
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    stash: ExpiryStash::new(stash_capacity),
                    next_id: 1,
                    completed: false,
                }),
                factory: Box::new(move |key| factory(key).boxed()),
                stats: StatCounters::default(),
            }),
        }
    }

    /// Pin the value for `key`, creating it if no entry exists.
    ///
    /// Concurrent callers for the same uncached key share one factory call
    /// and its result (value or error). A failed creation leaves no entry
    /// behind, so a later call retries.
    pub async fn get_pin(&self, key: K) -> Result<PinnedValue<K, V>, CacheError> {
        let (id, creation) = {
            let mut state = self.inner.state();
            if state.completed {
                return Err(CacheError::Completed);
            }
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.pins += 1;
                entry.version += 1;
                self.inner.stats.hits.fetch_add(1, Ordering::Relaxed);
                match &entry.state {
                    EntryState::Ready(value) => {
                        trace!("cache hit for {key:?}");
                        return Ok(PinnedValue {
                            cache: Some(Arc::clone(&self.inner)),
                            id: entry.id,
                            value: Arc::clone(value),
                            key,
                        });
                    }
                    EntryState::Creating(creation) => (entry.id, creation.clone()),
                }
            } else {
                let id = state.next_id;
                state.next_id += 1;
                self.inner.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!("creating cache value for {key:?}");
                let creation = self.start_creation(key.clone());
                state.entries.insert(
                    key.clone(),
                    CacheValue {
                        id,
                        pins: 1,
                        version: 0,
                        state: EntryState::Creating(creation.clone()),
                    },
                );
                (id, creation)
            }
        };

        let pending = PendingPin {
            cache: Arc::clone(&self.inner),
            key: Some(key.clone()),
            id,
        };
        match creation.await {
            Ok(value) => {
                let mut state = self.inner.state();
                if let Some(entry) = state.entries.get_mut(&key).filter(|entry| entry.id == id) {
                    if let EntryState::Creating(_) = entry.state {
                        entry.state = EntryState::Ready(Arc::clone(&value));
                    }
                }
                drop(state);
                Ok(pending.into_pin(value))
            }
            Err(err) => {
                {
                    let mut state = self.inner.state();
                    let failed = state
                        .entries
                        .get(&key)
                        .is_some_and(|entry| entry.id == id && matches!(entry.state, EntryState::Creating(_)));
                    if failed {
                        state.entries.remove(&key);
                    }
                }
                drop(pending);
                Err(err)
            }
        }
    }

    fn start_creation(&self, key: K) -> Creation<V> {
        let future = (self.inner.factory)(key);
        let weak = Arc::downgrade(&self.inner);
        async move {
            let result = future.await;
            if let Some(inner) = weak.upgrade() {
                let counter = match result {
                    Ok(_) => &inner.stats.creations,
                    Err(_) => &inner.stats.failures,
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
            result.map(Arc::new).map_err(CacheError::Creation)
        }
        .boxed()
        .shared()
    }

    /// Pop the oldest expiry token and tear its entry down if the token is
    /// still current. Returns whether an entry was torn down.
    pub fn try_expire_token(&self) -> bool {
        let expired = {
            let mut state = self.inner.state();
            match state.stash.pop_oldest() {
                Some(token) => state.expire(&token),
                None => return false,
            }
        };
        match expired {
            Some(value) => {
                self.inner.stats.expirations.fetch_add(1, Ordering::Relaxed);
                drop(value);
                true
            }
            None => false,
        }
    }

    /// Expire every queued token; returns how many entries were torn down.
    pub fn expire_all(&self) -> usize {
        let expired: Vec<Arc<V>> = {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            let tokens: Vec<_> = state.stash.drain().collect();
            tokens.iter().filter_map(|token| state.expire(token)).collect()
        };
        self.inner
            .stats
            .expirations
            .fetch_add(expired.len() as u64, Ordering::Relaxed);
        expired.len()
    }

    /// Stop handing out pins, wait for in-flight creations, then tear down
    /// every entry. Fails without tearing anything down if any value is
    /// still pinned; the cache stays completed and completion may be
    /// retried once the pins are released.
    pub async fn complete(&self) -> Result<(), CacheCompletionError<K>> {
        let pending: Vec<Creation<V>> = {
            let mut state = self.inner.state();
            state.completed = true;
            state
                .entries
                .values()
                .filter_map(|entry| match &entry.state {
                    EntryState::Creating(creation) => Some(creation.clone()),
                    EntryState::Ready(_) => None,
                })
                .collect()
        };
        if !pending.is_empty() {
            debug!("cache completion waiting for {} creation(s)", pending.len());
            futures::future::join_all(pending).await;
        }

        let torn_down: Vec<CacheValue<V>> = {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            let pinned = state.pinned_keys();
            if !pinned.is_empty() {
                warn!("cache completion blocked by {} pinned key(s)", pinned.len());
                return Err(CacheCompletionError { keys: pinned });
            }
            state.stash.drain().for_each(drop);
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        self.inner
            .stats
            .expirations
            .fetch_add(torn_down.len() as u64, Ordering::Relaxed);
        info!("cache completed, tore down {} entries", torn_down.len());
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.inner.state().completed
    }

    /// Number of live entries (pinned, stashed or being created).
    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.state().entries.contains_key(key)
    }

    /// Current pin count of `key`, or `None` if it has no entry.
    pub fn pin_count(&self, key: &K) -> Option<usize> {
        self.inner.state().entries.get(key).map(|entry| entry.pins)
    }

    /// Number of queued expiry tokens, current or stale.
    pub fn stash_len(&self) -> usize {
        self.inner.state().stash.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    pub(crate) fn count_bypass(&self) {
        self.inner.stats.bypasses.fetch_add(1, Ordering::Relaxed);
    }
}
