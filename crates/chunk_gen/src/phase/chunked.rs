//! A phase that creates and processes every chunk of a key collection.

use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};

use super::{forward_generation_phase, PhaseConfig, PhaseContext, PhaseCore, PhaseIdentity, StageIdentity};
use crate::error::GenerationError;
use crate::factory::AsyncChunkFactory;
use crate::keys::KeyCollection;

/// Work done on each chunk of a phase.
pub trait ChunkProcessor<C>: Send + Sync {
    fn process_chunk<'a>(&'a self, chunk: &'a C) -> BoxFuture<'a, Result<(), GenerationError>>;

    /// Runs once after every chunk has been processed, unless the phase was
    /// canceled or failed.
    fn on_completed(&self) -> BoxFuture<'_, Result<(), GenerationError>> {
        future::ready(Ok(())).boxed()
    }
}

impl<C, P: ChunkProcessor<C> + ?Sized> ChunkProcessor<C> for Arc<P> {
    fn process_chunk<'a>(&'a self, chunk: &'a C) -> BoxFuture<'a, Result<(), GenerationError>> {
        (**self).process_chunk(chunk)
    }

    fn on_completed(&self) -> BoxFuture<'_, Result<(), GenerationError>> {
        (**self).on_completed()
    }
}

/// Processor that does nothing; creating the chunk is the work.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProcessor;

impl<C: Sync> ChunkProcessor<C> for NoopProcessor {
    fn process_chunk<'a>(&'a self, _chunk: &'a C) -> BoxFuture<'a, Result<(), GenerationError>> {
        future::ready(Ok(())).boxed()
    }
}

/// Creates each chunk through a factory, hands it to a processor and drops
/// it, with at most `max_degree_of_parallelism` chunks in flight.
pub struct ChunkedPhase {
    core: PhaseCore,
}

impl fmt::Debug for ChunkedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChunkedPhase").field(&self.core).finish()
    }
}

forward_generation_phase!(ChunkedPhase, core);

impl ChunkedPhase {
    /// Start the phase on the tokio runtime.
    pub fn spawn<K, C, F, P>(
        stage: StageIdentity,
        phase: PhaseIdentity,
        keys: Arc<dyn KeyCollection<K>>,
        factory: Arc<F>,
        processor: Arc<P>,
        config: PhaseConfig,
    ) -> Self
    where
        K: Send + 'static,
        C: Send + Sync + 'static,
        F: AsyncChunkFactory<K, C> + 'static,
        P: ChunkProcessor<C> + 'static,
    {
        let total = keys.count();
        let core = PhaseCore::spawn(stage, phase, total, move |ctx| async move {
            process_keys(&ctx, keys.as_ref(), factory.as_ref(), processor.as_ref(), config).await?;
            processor.on_completed().await
        });
        Self { core }
    }

    pub fn stats(&self) -> super::PhaseStats {
        self.core.stats()
    }
}

/// Run `factory` then `processor` over every key, advancing progress per
/// chunk, until the keys run out or the phase stops.
async fn process_keys<K, C, F, P>(
    ctx: &PhaseContext,
    keys: &dyn KeyCollection<K>,
    factory: &F,
    processor: &P,
    config: PhaseConfig,
) -> Result<(), GenerationError>
where
    F: AsyncChunkFactory<K, C> + ?Sized,
    P: ChunkProcessor<C> + ?Sized,
{
    let work = stream::iter(keys.keys())
        .take_while(|_| future::ready(!ctx.should_stop()))
        .map(Ok::<K, GenerationError>)
        .try_for_each_concurrent(config.concurrency_limit(), |key| async move {
            let chunk = factory.create_chunk(key).await?;
            processor.process_chunk(&chunk).await?;
            ctx.advance(1);
            Ok(())
        });

    tokio::select! {
        result = work => result?,
        () = ctx.cancellation().cancelled() => return Err(GenerationError::Canceled),
    }
    ctx.check_cancelled()
}
