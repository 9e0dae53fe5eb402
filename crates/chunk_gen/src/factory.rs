//! Chunk factories, composed by decoration.
//!
//! - [`PoolingChunkFactory`]: borrows pooled resources and populates them;
//!   dropping the chunk returns the resources
//! - [`ExteriorChunkFactory`]: shares one constant chunk for every key
//!   outside the stage
//! - [`CachedChunkFactory`]: pins chunks through a [`BoundedChunkCache`]

use std::fmt;
use std::sync::Arc;

use chunk_cache::{
    AsyncCache, BoundedChunkCache, CacheError, CacheKey, PinnedValue, Pool, Pooled, SharedError,
    StashCapacity,
};
use futures::future::{BoxFuture, FutureExt};
use log::trace;

use crate::bounds::StageBounds;
use crate::chunk::Chunk;
use crate::error::GenerationError;
use crate::key::{ChunkKey, ChunkOverheadKey};
use crate::populator::AsyncChunkPopulator;

/// Creates chunks synchronously.
pub trait ChunkFactory<K, C>: Send + Sync {
    fn create_chunk(&self, key: K) -> Result<C, GenerationError>;
}

impl<K, C, F> ChunkFactory<K, C> for F
where
    F: Fn(K) -> Result<C, GenerationError> + Send + Sync,
{
    fn create_chunk(&self, key: K) -> Result<C, GenerationError> {
        self(key)
    }
}

/// Creates chunks, possibly waiting on pools, stores or caches.
pub trait AsyncChunkFactory<K, C>: Send + Sync {
    fn create_chunk(&self, key: K) -> BoxFuture<'_, Result<C, GenerationError>>;
}

impl<K, C, F: AsyncChunkFactory<K, C> + ?Sized> AsyncChunkFactory<K, C> for Arc<F> {
    fn create_chunk(&self, key: K) -> BoxFuture<'_, Result<C, GenerationError>> {
        (**self).create_chunk(key)
    }
}

/// Adapts an async closure into an [`AsyncChunkFactory`].
pub struct FnChunkFactory<F>(pub F);

impl<F> fmt::Debug for FnChunkFactory<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnChunkFactory")
    }
}

impl<K, C, F, Fut> AsyncChunkFactory<K, C> for FnChunkFactory<F>
where
    F: Fn(K) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<C, GenerationError>> + Send + 'static,
{
    fn create_chunk(&self, key: K) -> BoxFuture<'_, Result<C, GenerationError>> {
        (self.0)(key).boxed()
    }
}

/// Borrows resources from a pool and fills them with a populator.
pub struct PoolingChunkFactory<R, P> {
    pool: Pool<R>,
    populator: P,
}

impl<R, P> fmt::Debug for PoolingChunkFactory<R, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolingChunkFactory")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl<R, P> PoolingChunkFactory<R, P> {
    pub fn new(pool: Pool<R>, populator: P) -> Self {
        Self { pool, populator }
    }

    pub fn pool(&self) -> &Pool<R> {
        &self.pool
    }
}

impl<K, R, P> AsyncChunkFactory<K, Chunk<K, Pooled<R>>> for PoolingChunkFactory<R, P>
where
    K: Copy + Send + 'static,
    R: Send + 'static,
    P: AsyncChunkPopulator<Chunk<K, Pooled<R>>>,
{
    fn create_chunk(&self, key: K) -> BoxFuture<'_, Result<Chunk<K, Pooled<R>>, GenerationError>> {
        async move {
            let resources = self.pool.take_loan_async().await?;
            let mut chunk = Chunk::new(key, resources);
            // On failure the loan drops with the chunk and returns to the pool.
            self.populator.populate(&mut chunk).await?;
            Ok(chunk)
        }
        .boxed()
    }
}

/// Keys a stage can tell apart as inside or outside its bounds.
pub trait StageKey: Copy + Send + Sync + 'static {
    fn is_inside(&self, bounds: &StageBounds) -> bool;
}

impl StageKey for ChunkKey {
    fn is_inside(&self, bounds: &StageBounds) -> bool {
        bounds.contains(*self)
    }
}

impl StageKey for ChunkOverheadKey {
    fn is_inside(&self, bounds: &StageBounds) -> bool {
        bounds.contains_overhead(*self)
    }
}

/// Serves keys inside the stage from `inner` and every other key from one
/// shared exterior chunk, so out-of-bounds keys allocate nothing.
pub struct ExteriorChunkFactory<F, C> {
    inner: F,
    bounds: StageBounds,
    exterior: Arc<C>,
}

impl<F, C> fmt::Debug for ExteriorChunkFactory<F, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExteriorChunkFactory")
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

impl<F, C> ExteriorChunkFactory<F, C> {
    pub fn new(inner: F, bounds: StageBounds, exterior: Arc<C>) -> Self {
        Self {
            inner,
            bounds,
            exterior,
        }
    }

    pub fn exterior(&self) -> &Arc<C> {
        &self.exterior
    }
}

impl<K, C, F> AsyncChunkFactory<K, Arc<C>> for ExteriorChunkFactory<F, C>
where
    K: StageKey + fmt::Debug,
    C: Send + Sync,
    F: AsyncChunkFactory<K, C>,
{
    fn create_chunk(&self, key: K) -> BoxFuture<'_, Result<Arc<C>, GenerationError>> {
        if key.is_inside(&self.bounds) {
            self.inner.create_chunk(key).map(|chunk| chunk.map(Arc::new)).boxed()
        } else {
            trace!("serving exterior chunk for {key:?}");
            futures::future::ready(Ok(Arc::clone(&self.exterior))).boxed()
        }
    }
}

impl<K, C, F> ChunkFactory<K, Arc<C>> for ExteriorChunkFactory<F, C>
where
    K: StageKey,
    C: Send + Sync,
    F: ChunkFactory<K, C>,
{
    fn create_chunk(&self, key: K) -> Result<Arc<C>, GenerationError> {
        if key.is_inside(&self.bounds) {
            self.inner.create_chunk(key).map(Arc::new)
        } else {
            Ok(Arc::clone(&self.exterior))
        }
    }
}

/// Pins chunks through a cache so each key is created at most once while
/// in use, and released lazily through the cache's expiry stash.
pub struct CachedChunkFactory<K: CacheKey, C: Send + Sync + 'static> {
    cache: BoundedChunkCache<K, C>,
}

impl<K: CacheKey, C: Send + Sync + 'static> Clone for CachedChunkFactory<K, C> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<K: CacheKey, C: Send + Sync + 'static> fmt::Debug for CachedChunkFactory<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedChunkFactory")
            .field("cache", &self.cache)
            .finish()
    }
}

impl<K: CacheKey + StageKey, C: Send + Sync + 'static> CachedChunkFactory<K, C> {
    /// Cache chunks from `factory` for keys inside `bounds`; keys outside get
    /// uncached chunks from `exterior`.
    pub fn new<F>(
        stash_capacity: StashCapacity,
        bounds: StageBounds,
        factory: Arc<F>,
        exterior: impl Fn(&K) -> C + Send + Sync + 'static,
    ) -> Self
    where
        F: AsyncChunkFactory<K, C> + 'static,
    {
        let cache = AsyncCache::new(stash_capacity, move |key: K| {
            let factory = Arc::clone(&factory);
            async move {
                factory
                    .create_chunk(key)
                    .await
                    .map_err(|err| Arc::new(err) as SharedError)
            }
        });
        let cache = BoundedChunkCache::new(cache, move |key: &K| key.is_inside(&bounds), exterior);
        Self { cache }
    }

    pub fn cache(&self) -> &BoundedChunkCache<K, C> {
        &self.cache
    }
}

impl<K: CacheKey + StageKey, C: Send + Sync + 'static> AsyncChunkFactory<K, PinnedValue<K, C>>
    for CachedChunkFactory<K, C>
{
    fn create_chunk(&self, key: K) -> BoxFuture<'_, Result<PinnedValue<K, C>, GenerationError>> {
        async move { self.cache.get_pin(key).await.map_err(unwrap_creation_error) }.boxed()
    }
}

/// Recover the factory's own error from a failed cache creation.
fn unwrap_creation_error(err: CacheError) -> GenerationError {
    match &err {
        CacheError::Creation(source) => match source.downcast_ref::<GenerationError>() {
            Some(inner) => inner.clone(),
            None => GenerationError::Cache(err),
        },
        CacheError::Completed => GenerationError::Cache(err),
    }
}
