//! Bounded pools of reusable resources.
//!
//! A [`Pool`] holds values that are currently *available*. Taking removes a
//! value, giving puts it back after running the reset hook. Waiting takers
//! are parked on a semaphore whose permit count always equals the number of
//! available values.
//!
//! Lifecycle of a value:
//!
//! ```text
//! give ──reset──▶ available ──take──▶ loaned ──give──▶ ...
//!                     │                  │
//!                   close             give after close
//!                     ▼                  ▼
//!                  release            release
//! ```

use std::borrow::{Borrow, BorrowMut};
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use tokio::sync::{watch, Semaphore};

use crate::error::{ConfigError, PoolError};

/// Pool sizing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of available values. `None` means unbounded.
    pub capacity: Option<usize>,
}

impl PoolConfig {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }

    pub fn unbounded() -> Self {
        Self { capacity: None }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.capacity {
            Some(0) => Err(ConfigError::new("pool capacity", "must be at least 1")),
            Some(n) if n > Semaphore::MAX_PERMITS => Err(ConfigError::new(
                "pool capacity",
                format!("must not exceed {}", Semaphore::MAX_PERMITS),
            )),
            _ => Ok(()),
        }
    }
}

type ResetHook<T> = Box<dyn Fn(&mut T) + Send + Sync>;
type ReleaseHook<T> = Box<dyn Fn(T) + Send + Sync>;

/// Optional per-value hooks run by a [`Pool`].
pub struct PoolHooks<T> {
    reset: Option<ResetHook<T>>,
    release: Option<ReleaseHook<T>>,
}

impl<T> PoolHooks<T> {
    pub fn new() -> Self {
        Self {
            reset: None,
            release: None,
        }
    }

    /// Run on every value given back, before it becomes available.
    pub fn reset(mut self, reset: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.reset = Some(Box::new(reset));
        self
    }

    /// Run exactly once per value when the pool is closed or dropped.
    pub fn release(mut self, release: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }
}

impl<T> Default for PoolHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct PoolInner<T> {
    items: Mutex<VecDeque<T>>,
    available: Semaphore,
    capacity: Option<usize>,
    closed: AtomicBool,
    hooks: PoolHooks<T>,
    outstanding: Option<watch::Sender<usize>>,
}

impl<T> PoolInner<T> {
    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, value: T) {
        match &self.hooks.release {
            Some(release) => release(value),
            None => drop(value),
        }
    }

    fn loan_started(&self) {
        if let Some(outstanding) = &self.outstanding {
            outstanding.send_modify(|n| *n += 1);
        }
    }

    fn loan_ended(&self) {
        if let Some(outstanding) = &self.outstanding {
            outstanding.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    /// Pops the value backing an already consumed permit. `None` when a
    /// concurrent `close` drained the queue after the permit was issued.
    fn pop_permitted(&self) -> Option<T> {
        let value = self.items().pop_front()?;
        self.loan_started();
        Some(value)
    }
}

impl<T> Drop for PoolInner<T> {
    fn drop(&mut self) {
        let items = std::mem::take(self.items.get_mut().unwrap_or_else(PoisonError::into_inner));
        for value in items {
            self.release(value);
        }
    }
}

/// A thread-safe pool of reusable values. Clones share the same pool.
///
/// # Example
/// ```
/// use chunk_cache::{Pool, PoolConfig, PoolHooks};
///
/// let pool = Pool::filled(PoolConfig::bounded(2), PoolHooks::new().reset(|v: &mut Vec<u8>| v.clear()), Vec::new);
/// let mut buffer = pool.try_take().unwrap();
/// buffer.push(1);
/// pool.give(buffer);
/// assert_eq!(pool.available_count(), 2);
/// assert!(pool.try_take().unwrap().is_empty());
/// ```
pub struct Pool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("available", &self.available_count())
            .field("capacity", &self.inner.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> Pool<T> {
    /// An empty pool without hooks.
    ///
    /// # Panics
    /// Panics if `config` is invalid.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_hooks(config, PoolHooks::new())
    }

    /// # Panics
    /// Panics if `config` is invalid.
    pub fn with_hooks(config: PoolConfig, hooks: PoolHooks<T>) -> Self {
        Self::build(config, hooks, false)
    }

    /// A bounded pool pre-populated to capacity with `factory()` values.
    ///
    /// # Panics
    /// Panics if the config is invalid or unbounded.
    pub fn filled(config: PoolConfig, hooks: PoolHooks<T>, mut factory: impl FnMut() -> T) -> Self {
        let Some(capacity) = config.capacity else {
            panic!("only bounded pools can be pre-filled");
        };
        let pool = Self::with_hooks(config, hooks);
        pool.prefill(capacity, &mut factory);
        pool
    }

    fn prefill(&self, count: usize, factory: &mut dyn FnMut() -> T) {
        self.inner.items().extend((0..count).map(|_| factory()));
        self.inner.available.add_permits(count);
    }

    fn build(config: PoolConfig, hooks: PoolHooks<T>, tracking: bool) -> Self {
        if let Err(err) = config.validate() {
            panic!("{err}");
        }
        Self {
            inner: Arc::new(PoolInner {
                items: Mutex::new(VecDeque::new()),
                available: Semaphore::new(0),
                capacity: config.capacity,
                closed: AtomicBool::new(false),
                hooks,
                outstanding: tracking.then(|| watch::channel(0).0),
            }),
        }
    }

    /// Number of values ready to be taken. Never exceeds the capacity.
    pub fn available_count(&self) -> usize {
        self.inner.items().len()
    }

    /// Capacity, or `None` when unbounded.
    pub fn bounded_capacity(&self) -> Option<usize> {
        self.inner.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Return a value, resetting it first. After `close` the value is
    /// released instead.
    ///
    /// # Panics
    /// Panics if an open pool is already at capacity.
    pub fn give(&self, value: T) {
        if let Err(value) = self.try_give(value) {
            if self.is_closed() {
                self.inner.loan_ended();
                self.inner.release(value);
            } else {
                panic!(
                    "pool given a value beyond its capacity of {}",
                    self.inner.capacity.unwrap_or(usize::MAX)
                );
            }
        }
    }

    /// Return a value unless the pool is full or closed, in which case the
    /// value is handed back untouched.
    pub fn try_give(&self, mut value: T) -> Result<(), T> {
        if self.is_closed() || self.is_full() {
            return Err(value);
        }
        if let Some(reset) = &self.inner.hooks.reset {
            reset(&mut value);
        }
        {
            let mut items = self.inner.items();
            let full = self.inner.capacity.is_some_and(|cap| items.len() >= cap);
            if self.is_closed() || full {
                return Err(value);
            }
            items.push_back(value);
        }
        self.inner.available.add_permits(1);
        self.inner.loan_ended();
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.inner
            .capacity
            .is_some_and(|cap| self.available_count() >= cap)
    }

    /// Take a value if one is available right now.
    pub fn try_take(&self) -> Option<T> {
        let permit = self.inner.available.try_acquire().ok()?;
        permit.forget();
        self.inner.pop_permitted()
    }

    /// Take a value, suspending until one is given back.
    pub async fn take_async(&self) -> Result<T, PoolError> {
        let permit = self
            .inner
            .available
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;
        permit.forget();
        self.inner.pop_permitted().ok_or(PoolError::Closed)
    }

    /// Take a value, blocking the current thread until one is given back.
    ///
    /// Must not be called from inside an async task.
    pub fn take(&self) -> Result<T, PoolError> {
        futures::executor::block_on(self.take_async())
    }

    /// Like [`try_take`](Self::try_take), returning a loan that gives the
    /// value back on drop.
    pub fn try_take_loan(&self) -> Option<Pooled<T>> {
        self.try_take().map(|value| Pooled::new(self.clone(), value))
    }

    pub async fn take_loan_async(&self) -> Result<Pooled<T>, PoolError> {
        let value = self.take_async().await?;
        Ok(Pooled::new(self.clone(), value))
    }

    pub fn take_loan(&self) -> Result<Pooled<T>, PoolError> {
        let value = self.take()?;
        Ok(Pooled::new(self.clone(), value))
    }

    /// Close the pool: waiting takers fail with [`PoolError::Closed`],
    /// available values are released, and values given back later are
    /// released on arrival. Idempotent.
    pub fn close(&self) {
        let drained = {
            let mut items = self.inner.items();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.inner.available.close();
            std::mem::take(&mut *items)
        };
        debug!("closing pool, releasing {} available value(s)", drained.len());
        for value in drained {
            self.inner.release(value);
        }
    }
}

/// A pool that also counts outstanding values and publishes every change of
/// that count, so callers can wait for in-flight loans to drain.
pub struct TrackingPool<T> {
    pool: Pool<T>,
}

impl<T> Clone for TrackingPool<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<T> TrackingPool<T> {
    pub fn new(config: PoolConfig, hooks: PoolHooks<T>) -> Self {
        Self {
            pool: Pool::build(config, hooks, true),
        }
    }

    /// A tracking pool pre-populated to capacity.
    pub fn filled(config: PoolConfig, hooks: PoolHooks<T>, mut factory: impl FnMut() -> T) -> Self {
        let Some(capacity) = config.capacity else {
            panic!("only bounded pools can be pre-filled");
        };
        let tracking = Self::new(config, hooks);
        tracking.pool.prefill(capacity, &mut factory);
        tracking
    }

    pub fn pool(&self) -> &Pool<T> {
        &self.pool
    }

    /// Values taken and not yet given back.
    pub fn outstanding(&self) -> usize {
        self.sender().map_or(0, |tx| *tx.borrow())
    }

    /// Receiver of the outstanding count, updated on every take and give.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        match self.sender() {
            Some(tx) => tx.subscribe(),
            None => unreachable!("tracking pool without a tracker"),
        }
    }

    /// Resolves once every taken value has been given back.
    pub async fn wait_until_drained(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as the pool, which `self` keeps alive.
        let _ = rx.wait_for(|n| *n == 0).await;
        trace!("tracking pool drained");
    }

    fn sender(&self) -> Option<&watch::Sender<usize>> {
        self.pool.inner.outstanding.as_ref()
    }
}

impl<T> Deref for TrackingPool<T> {
    type Target = Pool<T>;

    fn deref(&self) -> &Pool<T> {
        &self.pool
    }
}

/// A value on loan from a [`Pool`]; gives it back when dropped.
pub struct Pooled<T> {
    value: Option<T>,
    pool: Pool<T>,
}

impl<T> Pooled<T> {
    fn new(pool: Pool<T>, value: T) -> Self {
        Self {
            value: Some(value),
            pool,
        }
    }

    /// Keep the value instead of returning it.
    pub fn into_inner(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("pooled value taken twice"),
        }
    }

    pub fn pool(&self) -> &Pool<T> {
        &self.pool
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("pooled value used after release"),
        }
    }
}

impl<T> Borrow<T> for Pooled<T> {
    fn borrow(&self) -> &T {
        self
    }
}

impl<T> BorrowMut<T> for Pooled<T> {
    fn borrow_mut(&mut self) -> &mut T {
        self
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.give(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn counting_release(counter: &Arc<AtomicUsize>) -> PoolHooks<u32> {
        let counter = Arc::clone(counter);
        PoolHooks::new().release(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn config_rejects_zero_capacity() {
        assert!(PoolConfig::bounded(0).validate().is_err());
        assert!(PoolConfig::bounded(1).validate().is_ok());
        assert!(PoolConfig::unbounded().validate().is_ok());
    }

    #[test]
    fn try_take_on_empty_pool_returns_none() {
        let pool: Pool<u32> = Pool::new(PoolConfig::bounded(2));
        assert_eq!(pool.try_take(), None);
        pool.give(5);
        assert_eq!(pool.try_take(), Some(5));
        assert_eq!(pool.try_take(), None);
    }

    #[test]
    fn reset_runs_on_give() {
        let pool = Pool::with_hooks(PoolConfig::bounded(1), PoolHooks::new().reset(|v: &mut u32| *v = 0));
        pool.give(9);
        assert_eq!(pool.try_take(), Some(0));
    }

    #[test]
    fn available_count_never_exceeds_capacity() {
        let pool = Pool::filled(PoolConfig::bounded(3), PoolHooks::new(), || 1u32);
        assert_eq!(pool.available_count(), 3);
        assert_eq!(pool.try_give(4), Err(4));
        assert_eq!(pool.available_count(), 3);
    }

    #[test]
    #[should_panic(expected = "beyond its capacity")]
    fn give_to_full_pool_panics() {
        let pool = Pool::filled(PoolConfig::bounded(1), PoolHooks::new(), || 1u32);
        pool.give(2);
    }

    #[test]
    fn release_runs_once_per_value_across_close_and_late_give() {
        init_logging();
        let released = Arc::new(AtomicUsize::new(0));
        let pool = Pool::filled(PoolConfig::bounded(3), counting_release(&released), || 7u32);
        let loaned = pool.try_take().unwrap();

        pool.close();
        assert_eq!(released.load(Ordering::SeqCst), 2);
        pool.close();
        assert_eq!(released.load(Ordering::SeqCst), 2);

        pool.give(loaned);
        assert_eq!(released.load(Ordering::SeqCst), 3);
        drop(pool);
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn drop_releases_available_values() {
        let released = Arc::new(AtomicUsize::new(0));
        let pool = Pool::filled(PoolConfig::bounded(4), counting_release(&released), || 0u32);
        let clone = pool.clone();
        drop(pool);
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(clone);
        assert_eq!(released.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn loan_returns_value_on_drop() {
        let pool = Pool::filled(PoolConfig::bounded(1), PoolHooks::new(), || vec![1u8]);
        {
            let mut loan = pool.try_take_loan().unwrap();
            loan.push(2);
            assert_eq!(pool.available_count(), 0);
        }
        assert_eq!(pool.try_take(), Some(vec![1, 2]));
    }

    #[test]
    fn into_inner_keeps_the_value() {
        let pool = Pool::filled(PoolConfig::bounded(1), PoolHooks::new(), || 3u32);
        let value = pool.try_take_loan().unwrap().into_inner();
        assert_eq!(value, 3);
        assert_eq!(pool.available_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn take_async_waits_for_give() {
        let pool: Pool<u32> = Pool::new(PoolConfig::bounded(1));
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.take_async().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        pool.give(11);
        assert_eq!(waiter.await.unwrap(), Ok(11));
    }

    #[tokio::test]
    async fn close_wakes_waiting_takers() {
        init_logging();
        let pool: Pool<u32> = Pool::new(PoolConfig::bounded(1));
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.take_async().await })
        };
        tokio::task::yield_now().await;
        pool.close();
        assert_eq!(waiter.await.unwrap(), Err(PoolError::Closed));
    }

    #[test]
    fn takes_racing_close_never_panic_or_leak() {
        init_logging();
        for _ in 0..500 {
            let released = Arc::new(AtomicUsize::new(0));
            let pool = Pool::filled(PoolConfig::bounded(4), counting_release(&released), || 1u32);
            let workers: Vec<_> = (0..4)
                .map(|_| {
                    let pool = pool.clone();
                    std::thread::spawn(move || {
                        for _ in 0..20 {
                            if let Some(value) = pool.try_take() {
                                pool.give(value);
                            }
                        }
                    })
                })
                .collect();
            pool.close();
            for worker in workers {
                worker.join().unwrap();
            }
            assert_eq!(pool.try_take(), None);
            assert_eq!(released.load(Ordering::SeqCst), 4);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn async_takes_racing_close_fail_cleanly() {
        for _ in 0..200 {
            let released = Arc::new(AtomicUsize::new(0));
            let pool = Pool::filled(PoolConfig::bounded(2), counting_release(&released), || 1u32);
            let takers: Vec<_> = (0..4)
                .map(|_| {
                    let pool = pool.clone();
                    tokio::spawn(async move {
                        for _ in 0..10 {
                            match pool.take_async().await {
                                Ok(value) => pool.give(value),
                                Err(err) => return Err(err),
                            }
                        }
                        Ok(())
                    })
                })
                .collect();
            pool.close();
            for taker in takers {
                let result = taker.await.unwrap();
                assert!(matches!(result, Ok(()) | Err(PoolError::Closed)));
            }
            assert_eq!(released.load(Ordering::SeqCst), 2);
        }
    }

    #[test]
    fn blocking_take_is_woken_by_another_thread() {
        let pool: Pool<u32> = Pool::new(PoolConfig::unbounded());
        let giver = {
            let pool = pool.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                pool.give(8);
            })
        };
        assert_eq!(pool.take(), Ok(8));
        giver.join().unwrap();
    }

    #[tokio::test]
    async fn tracking_pool_drains_after_loans_return() {
        let tracking = TrackingPool::filled(PoolConfig::bounded(2), PoolHooks::new(), || 0u32);
        let a = tracking.take_loan_async().await.unwrap();
        let b = tracking.try_take().unwrap();
        assert_eq!(tracking.outstanding(), 2);

        let mut events = tracking.subscribe();
        drop(a);
        events.changed().await.unwrap();
        assert_eq!(*events.borrow_and_update(), 1);

        let drained = {
            let tracking = tracking.clone();
            tokio::spawn(async move { tracking.wait_until_drained().await })
        };
        tracking.give(b);
        drained.await.unwrap();
        assert_eq!(tracking.outstanding(), 0);
    }
}
