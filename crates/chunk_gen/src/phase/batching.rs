//! A chunked phase that persists every chunk to a store in batches.

use std::fmt;
use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;
use tokio::sync::mpsc;

use super::{
    forward_generation_phase, ChunkProcessor, PhaseConfig, PhaseContext, PhaseCore, PhaseIdentity,
    PhaseStats, StageIdentity,
};
use crate::error::{ConfigError, GenerationError};
use crate::factory::AsyncChunkFactory;
use crate::keys::KeyCollection;
use crate::persist::{ChunkPersister, ChunkStore};

/// Settings of a [`ChunkedBatchingPhase`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchingConfig {
    pub phase: PhaseConfig,
    /// Chunks per store write. Also the number of persisted chunks that may
    /// wait for the writer, so at most twice this many persisted chunks are
    /// held in memory.
    pub max_buffered_chunks: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            phase: PhaseConfig::default(),
            max_buffered_chunks: 64,
        }
    }
}

impl BatchingConfig {
    pub fn with_max_buffered_chunks(max_buffered_chunks: usize) -> Self {
        Self {
            max_buffered_chunks,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.phase.validate()?;
        if self.max_buffered_chunks == 0 {
            return Err(ConfigError::new("max_buffered_chunks", "must be positive"));
        }
        Ok(())
    }
}

/// Creates and processes chunks like [`ChunkedPhase`](super::ChunkedPhase),
/// then persists each one and writes them to a store in batches of
/// `max_buffered_chunks`.
///
/// Progress counts chunks written to the store. Canceling drops buffered
/// chunks that were not written yet.
pub struct ChunkedBatchingPhase {
    core: PhaseCore,
}

impl fmt::Debug for ChunkedBatchingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChunkedBatchingPhase").field(&self.core).finish()
    }
}

forward_generation_phase!(ChunkedBatchingPhase, core);

impl ChunkedBatchingPhase {
    /// Start the phase on the tokio runtime.
    ///
    /// # Panics
    /// Panics if `config.max_buffered_chunks` is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<K, C, Pr, F, P, Pe, S>(
        stage: StageIdentity,
        phase: PhaseIdentity,
        keys: Arc<dyn KeyCollection<K>>,
        factory: Arc<F>,
        processor: Arc<P>,
        persister: Arc<Pe>,
        store: Arc<S>,
        config: BatchingConfig,
    ) -> Self
    where
        K: Send + 'static,
        C: Send + Sync + 'static,
        Pr: Send + 'static,
        F: AsyncChunkFactory<K, C> + 'static,
        P: ChunkProcessor<C> + 'static,
        Pe: ChunkPersister<C, Pr> + 'static,
        S: ChunkStore<K, Pr> + 'static,
    {
        assert!(config.max_buffered_chunks > 0, "max buffered chunks must be positive");
        let total = keys.count();
        let core = PhaseCore::spawn(stage, phase, total, move |ctx| async move {
            let pipeline = Pipeline {
                ctx: &ctx,
                factory: factory.as_ref(),
                processor: processor.as_ref(),
                persister: persister.as_ref(),
                store: store.as_ref(),
                config,
            };
            pipeline.run::<K, C, Pr>(keys.as_ref()).await?;
            processor.on_completed().await
        });
        Self { core }
    }

    pub fn stats(&self) -> PhaseStats {
        self.core.stats()
    }
}

struct Pipeline<'a, F: ?Sized, P: ?Sized, Pe: ?Sized, S: ?Sized> {
    ctx: &'a PhaseContext,
    factory: &'a F,
    processor: &'a P,
    persister: &'a Pe,
    store: &'a S,
    config: BatchingConfig,
}

impl<F: ?Sized, P: ?Sized, Pe: ?Sized, S: ?Sized> Pipeline<'_, F, P, Pe, S> {
    async fn run<K, C, Pr>(&self, keys: &dyn KeyCollection<K>) -> Result<(), GenerationError>
    where
        F: AsyncChunkFactory<K, C>,
        P: ChunkProcessor<C>,
        Pe: ChunkPersister<C, Pr>,
        S: ChunkStore<K, Pr>,
    {
        let (sender, receiver) = mpsc::channel(self.config.max_buffered_chunks);
        let work = future::try_join(
            self.produce::<K, C, Pr>(keys, sender),
            self.flush_batches::<K, Pr>(receiver),
        );

        tokio::select! {
            result = work => { result?; }
            () = self.ctx.cancellation().cancelled() => return Err(GenerationError::Canceled),
        }
        self.ctx.check_cancelled()
    }

    /// Create, process and persist every key, handing the results to the
    /// writer. Closes the channel when done.
    async fn produce<K, C, Pr>(
        &self,
        keys: &dyn KeyCollection<K>,
        sender: mpsc::Sender<Pr>,
    ) -> Result<(), GenerationError>
    where
        F: AsyncChunkFactory<K, C>,
        P: ChunkProcessor<C>,
        Pe: ChunkPersister<C, Pr>,
    {
        let sender = &sender;
        stream::iter(keys.keys())
            .take_while(|_| future::ready(!self.ctx.should_stop()))
            .map(Ok::<K, GenerationError>)
            .try_for_each_concurrent(self.config.phase.concurrency_limit(), |key| async move {
                let chunk = self.factory.create_chunk(key).await?;
                self.processor.process_chunk(&chunk).await?;
                let persisted = self.persister.to_persistable(&chunk)?;
                // Release the chunk's resources before waiting on the writer.
                drop(chunk);
                sender
                    .send(persisted)
                    .await
                    .map_err(|_| GenerationError::Canceled)
            })
            .await
    }

    /// Write persisted chunks in batches of `max_buffered_chunks`; the last
    /// batch may be smaller.
    async fn flush_batches<K, Pr>(&self, mut receiver: mpsc::Receiver<Pr>) -> Result<(), GenerationError>
    where
        S: ChunkStore<K, Pr>,
    {
        let max = self.config.max_buffered_chunks;
        let mut batch = Vec::with_capacity(max);
        while let Some(persisted) = receiver.recv().await {
            batch.push(persisted);
            if batch.len() >= max {
                self.flush::<K, Pr>(&mut batch).await?;
            }
        }
        if !batch.is_empty() {
            self.flush::<K, Pr>(&mut batch).await?;
        }
        Ok(())
    }

    async fn flush<K, Pr>(&self, batch: &mut Vec<Pr>) -> Result<(), GenerationError>
    where
        S: ChunkStore<K, Pr>,
    {
        let chunks = batch.len();
        let pending = std::mem::replace(batch, Vec::with_capacity(self.config.max_buffered_chunks));
        self.store
            .add_or_update_all(pending, self.ctx.cancellation())
            .await?;
        self.ctx.tracker().record_flush(chunks);
        let progress = self.ctx.advance(chunks as u64);
        debug!("flushed batch of {chunks} chunks ({progress})");
        Ok(())
    }
}
