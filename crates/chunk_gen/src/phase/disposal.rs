use std::fmt;

use chunk_cache::Pool;
use futures::future::FutureExt;
use futures::stream::BoxStream;
use log::debug;

use super::{
    join_error, CancellationToken, GenerationPhase, PhaseCompletion, PhaseIdentity, Progress,
    StageIdentity,
};
use crate::error::GenerationError;

/// Releases a resource once the wrapped phase is done.
///
/// The release runs exactly once after the inner completion resolves,
/// whether the phase completed, was canceled or failed, and before this
/// wrapper's own completion resolves.
pub struct GenerationPhaseDisposalWrapper<P> {
    inner: P,
    completion: PhaseCompletion,
}

impl<P: fmt::Debug> fmt::Debug for GenerationPhaseDisposalWrapper<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GenerationPhaseDisposalWrapper")
            .field(&self.inner)
            .finish()
    }
}

/// Runs its release on drop so the release also happens if the waiting task
/// is torn down with the runtime.
struct ReleaseGuard(Option<Box<dyn FnOnce() + Send>>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(release) = self.0.take() {
            release();
        }
    }
}

impl<P: GenerationPhase> GenerationPhaseDisposalWrapper<P> {
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn new(inner: P, release: impl FnOnce() + Send + 'static) -> Self {
        let inner_completion = inner.completion();
        let guard = ReleaseGuard(Some(Box::new(release)));
        let (stage, phase) = (inner.stage_identity().clone(), inner.phase_identity().clone());
        let waiter = tokio::spawn(async move {
            let result = inner_completion.await;
            drop(guard);
            debug!("released resources of phase {phase} of stage {stage}");
            result
        });
        let completion = async move { waiter.await.unwrap_or_else(|err| Err(join_error(err))) }
            .boxed()
            .shared();
        Self { inner, completion }
    }

    /// Close `pool` once the phase is done.
    pub fn closing_pool<T: Send + 'static>(inner: P, pool: Pool<T>) -> Self {
        Self::new(inner, move || pool.close())
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: GenerationPhase> GenerationPhase for GenerationPhaseDisposalWrapper<P> {
    fn stage_identity(&self) -> &StageIdentity {
        self.inner.stage_identity()
    }

    fn phase_identity(&self) -> &PhaseIdentity {
        self.inner.phase_identity()
    }

    fn progress_total_count(&self) -> u64 {
        self.inner.progress_total_count()
    }

    fn progress(&self) -> BoxStream<'static, Result<Progress, GenerationError>> {
        self.inner.progress()
    }

    fn current_progress(&self) -> Progress {
        self.inner.current_progress()
    }

    fn cancellation(&self) -> &CancellationToken {
        self.inner.cancellation()
    }

    fn completion(&self) -> PhaseCompletion {
        self.completion.clone()
    }

    fn cancel(&self) {
        self.inner.cancel()
    }

    fn complete(&self) {
        self.inner.complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::{PhaseCore, PhaseOutcome};
    use chunk_cache::{PoolConfig, PoolHooks};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn core(result: Result<(), GenerationError>) -> PhaseCore {
        PhaseCore::spawn(
            StageIdentity::new("overworld"),
            PhaseIdentity::new("populate"),
            1,
            move |_| async move { result },
        )
    }

    fn counting(count: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn releases_once_after_success() {
        let released = Arc::new(AtomicUsize::new(0));
        let wrapped = GenerationPhaseDisposalWrapper::new(core(Ok(())), counting(&released));
        assert!(matches!(wrapped.completion().await, Ok(PhaseOutcome::Completed)));
        assert!(matches!(wrapped.completion().await, Ok(PhaseOutcome::Completed)));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn releases_after_failure() {
        let released = Arc::new(AtomicUsize::new(0));
        let wrapped = GenerationPhaseDisposalWrapper::new(
            core(Err(GenerationError::message("boom"))),
            counting(&released),
        );
        assert!(wrapped.completion().await.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn closes_pool_after_cancel() {
        let pool = Pool::filled(PoolConfig::bounded(2), PoolHooks::new(), || 0u8);
        let inner = PhaseCore::spawn(
            StageIdentity::new("overworld"),
            PhaseIdentity::new("populate"),
            1,
            |ctx| async move {
                ctx.stopped().await;
                Ok(())
            },
        );
        let wrapped = GenerationPhaseDisposalWrapper::closing_pool(inner, pool.clone());
        assert!(!pool.is_closed());
        wrapped.cancel();
        assert!(matches!(wrapped.completion().await, Ok(PhaseOutcome::Canceled)));
        assert!(pool.is_closed());
    }
}
