//! Generation phases: cancelable background jobs over a stage's chunk keys.
//!
//! A phase starts running as soon as it is built (on the ambient tokio
//! runtime) and reports through three channels:
//!
//! - [`GenerationPhase::progress`]: a stream of `(processed, total)` counts
//! - [`GenerationPhase::completion`]: a shared future resolving to
//!   [`PhaseOutcome::Completed`], [`PhaseOutcome::Canceled`] or an error
//! - [`GenerationPhase::cancellation`]: the token in-flight work observes
//!
//! Phases are composed by decoration: [`ExceptionFilteredPhase`] attributes
//! errors to the stage and phase, [`GenerationPhaseDisposalWrapper`] releases
//! resources once the phase is done.

mod batching;
mod cancel;
mod chunked;
mod contour;
mod disposal;
mod filter;
mod progress;
mod sky_island_stats;

use std::fmt;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::BoxStream;
use log::{debug, info, warn};
use tokio::task::JoinError;

use crate::error::{ConfigError, GenerationError};

pub use batching::{BatchingConfig, ChunkedBatchingPhase};
pub use cancel::CancellationToken;
pub use chunked::{ChunkProcessor, ChunkedPhase, NoopProcessor};
pub use contour::{ContourProcessor, MeshSink};
pub use disposal::GenerationPhaseDisposalWrapper;
pub use filter::ExceptionFilteredPhase;
pub use progress::{PhaseStats, Progress, ProgressTracker};
pub use sky_island_stats::{SkyIslandStatKeys, SkyIslandStatsProcessor};

macro_rules! identity {
    ($(#[$meta:meta])* $name:ident, $what:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Arc<str>);

        impl $name {
            /// # Panics
            /// Panics if `name` is empty.
            pub fn new(name: impl Into<String>) -> Self {
                let name = name.into();
                assert!(!name.is_empty(), concat!($what, " identity must not be empty"));
                Self(name.into())
            }

            pub fn name(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:?})", stringify!($name), &*self.0)
            }
        }
    };
}

/// Implements [`GenerationPhase`] for a type by forwarding to one of its
/// fields.
macro_rules! forward_generation_phase {
    ($ty:ty, $field:ident) => {
        impl $crate::phase::GenerationPhase for $ty {
            fn stage_identity(&self) -> &$crate::phase::StageIdentity {
                $crate::phase::GenerationPhase::stage_identity(&self.$field)
            }

            fn phase_identity(&self) -> &$crate::phase::PhaseIdentity {
                $crate::phase::GenerationPhase::phase_identity(&self.$field)
            }

            fn progress_total_count(&self) -> u64 {
                $crate::phase::GenerationPhase::progress_total_count(&self.$field)
            }

            fn progress(
                &self,
            ) -> ::futures::stream::BoxStream<
                'static,
                Result<$crate::phase::Progress, $crate::error::GenerationError>,
            > {
                $crate::phase::GenerationPhase::progress(&self.$field)
            }

            fn current_progress(&self) -> $crate::phase::Progress {
                $crate::phase::GenerationPhase::current_progress(&self.$field)
            }

            fn cancellation(&self) -> &$crate::phase::CancellationToken {
                $crate::phase::GenerationPhase::cancellation(&self.$field)
            }

            fn completion(&self) -> $crate::phase::PhaseCompletion {
                $crate::phase::GenerationPhase::completion(&self.$field)
            }

            fn cancel(&self) {
                $crate::phase::GenerationPhase::cancel(&self.$field)
            }

            fn complete(&self) {
                $crate::phase::GenerationPhase::complete(&self.$field)
            }
        }
    };
}
pub(crate) use forward_generation_phase;

identity!(
    /// Name of the stage a phase belongs to.
    StageIdentity,
    "stage"
);

identity!(
    /// Name of a phase within its stage.
    PhaseIdentity,
    "phase"
);

/// How a phase ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// Every key was processed, or the phase was asked to stop early.
    Completed,
    /// The phase was canceled; some keys may not have been processed.
    Canceled,
}

/// Shared completion future of a phase.
pub type PhaseCompletion = Shared<BoxFuture<'static, Result<PhaseOutcome, GenerationError>>>;

/// Parallelism settings of a phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseConfig {
    /// Chunks processed at once. `None` means no cap beyond what pools and
    /// caches impose.
    pub max_degree_of_parallelism: Option<NonZeroUsize>,
}

impl PhaseConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// # Panics
    /// Panics if `max` is zero.
    pub fn with_max_degree_of_parallelism(max: usize) -> Self {
        let max = NonZeroUsize::new(max).expect("max degree of parallelism must be positive");
        Self {
            max_degree_of_parallelism: Some(max),
        }
    }

    /// Limit in the form `for_each_concurrent` takes.
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.max_degree_of_parallelism.map(NonZeroUsize::get)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// A running generation phase.
pub trait GenerationPhase: Send + Sync {
    fn stage_identity(&self) -> &StageIdentity;

    fn phase_identity(&self) -> &PhaseIdentity;

    /// Number of chunks the phase will process, known up front.
    fn progress_total_count(&self) -> u64;

    /// Stream of progress counts, ending when the phase ends.
    fn progress(&self) -> BoxStream<'static, Result<Progress, GenerationError>>;

    /// Latest progress count.
    fn current_progress(&self) -> Progress;

    /// Token that in-flight work of this phase observes.
    fn cancellation(&self) -> &CancellationToken;

    fn completion(&self) -> PhaseCompletion;

    /// Request cancellation. Completion then resolves to
    /// [`PhaseOutcome::Canceled`], unless the phase had already finished.
    fn cancel(&self);

    /// Stop early without canceling. Completion resolves to
    /// [`PhaseOutcome::Completed`] once in-flight work drains.
    fn complete(&self);
}

impl<P: GenerationPhase + ?Sized> GenerationPhase for Box<P> {
    fn stage_identity(&self) -> &StageIdentity {
        (**self).stage_identity()
    }

    fn phase_identity(&self) -> &PhaseIdentity {
        (**self).phase_identity()
    }

    fn progress_total_count(&self) -> u64 {
        (**self).progress_total_count()
    }

    fn progress(&self) -> BoxStream<'static, Result<Progress, GenerationError>> {
        (**self).progress()
    }

    fn current_progress(&self) -> Progress {
        (**self).current_progress()
    }

    fn cancellation(&self) -> &CancellationToken {
        (**self).cancellation()
    }

    fn completion(&self) -> PhaseCompletion {
        (**self).completion()
    }

    fn cancel(&self) {
        (**self).cancel()
    }

    fn complete(&self) {
        (**self).complete()
    }
}

/// What a phase body sees while it runs.
#[derive(Clone, Debug)]
pub struct PhaseContext {
    tracker: ProgressTracker,
    cancel: CancellationToken,
    stop: CancellationToken,
}

impl PhaseContext {
    pub fn advance(&self, count: u64) -> Progress {
        self.tracker.advance(count)
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the phase should stop taking new keys (canceled or
    /// completed early).
    pub fn should_stop(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Resolves once the phase should stop taking new keys.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }

    /// `Err(Canceled)` once the phase is canceled.
    pub fn check_cancelled(&self) -> Result<(), GenerationError> {
        self.cancel.check(|| GenerationError::Canceled)
    }
}

/// State and lifecycle shared by every concrete phase.
pub struct PhaseCore {
    stage: StageIdentity,
    phase: PhaseIdentity,
    total: u64,
    tracker: ProgressTracker,
    cancel: CancellationToken,
    stop: CancellationToken,
    completion: PhaseCompletion,
}

impl fmt::Debug for PhaseCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhaseCore")
            .field("stage", &self.stage)
            .field("phase", &self.phase)
            .field("progress", &self.tracker.progress())
            .finish_non_exhaustive()
    }
}

impl PhaseCore {
    /// Start `body` on the tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn spawn<F, Fut>(stage: StageIdentity, phase: PhaseIdentity, total: u64, body: F) -> Self
    where
        F: FnOnce(PhaseContext) -> Fut,
        Fut: Future<Output = Result<(), GenerationError>> + Send + 'static,
    {
        let tracker = ProgressTracker::new(total);
        let cancel = CancellationToken::new();
        let stop = CancellationToken::new();
        let context = PhaseContext {
            tracker: tracker.clone(),
            cancel: cancel.clone(),
            stop: stop.clone(),
        };

        info!("starting phase {phase} of stage {stage} over {total} chunks");
        let work = tokio::spawn({
            let body = body(context);
            let cancel = cancel.clone();
            async move {
                let result = body.await;
                // Only a cancel that arrived before the body returned counts.
                (result, cancel.is_cancelled())
            }
        });
        let supervisor = tokio::spawn({
            let (stage, phase) = (stage.clone(), phase.clone());
            let tracker = tracker.clone();
            async move {
                let (result, canceled) = match work.await {
                    Ok(finished) => finished,
                    Err(err) => (Err(join_error(err)), false),
                };
                let outcome = match result {
                    Err(GenerationError::Canceled) => Ok(PhaseOutcome::Canceled),
                    _ if canceled => Ok(PhaseOutcome::Canceled),
                    Ok(()) => Ok(PhaseOutcome::Completed),
                    Err(err) => Err(err),
                };
                let stats = tracker.stats();
                match &outcome {
                    Ok(PhaseOutcome::Completed) => {
                        tracker.finish();
                        info!(
                            "phase {phase} of stage {stage} completed: {} chunks, {} batches in {:?}",
                            stats.processed, stats.batches_flushed, stats.elapsed
                        );
                    }
                    Ok(PhaseOutcome::Canceled) => {
                        tracker.finish();
                        info!(
                            "phase {phase} of stage {stage} canceled after {} chunks",
                            stats.processed
                        );
                    }
                    Err(err) => {
                        tracker.fault(err.clone());
                        warn!("phase {phase} of stage {stage} failed: {err}");
                    }
                }
                outcome
            }
        });
        let completion = async move { supervisor.await.unwrap_or_else(|err| Err(join_error(err))) }
            .boxed()
            .shared();

        Self {
            stage,
            phase,
            total,
            tracker,
            cancel,
            stop,
            completion,
        }
    }

    pub fn stats(&self) -> PhaseStats {
        self.tracker.stats()
    }
}

impl GenerationPhase for PhaseCore {
    fn stage_identity(&self) -> &StageIdentity {
        &self.stage
    }

    fn phase_identity(&self) -> &PhaseIdentity {
        &self.phase
    }

    fn progress_total_count(&self) -> u64 {
        self.total
    }

    fn progress(&self) -> BoxStream<'static, Result<Progress, GenerationError>> {
        self.tracker.stream()
    }

    fn current_progress(&self) -> Progress {
        self.tracker.progress()
    }

    fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    fn completion(&self) -> PhaseCompletion {
        self.completion.clone()
    }

    fn cancel(&self) {
        debug!("canceling phase {} of stage {}", self.phase, self.stage);
        self.cancel.cancel();
        self.stop.cancel();
    }

    fn complete(&self) {
        debug!("stopping phase {} of stage {} early", self.phase, self.stage);
        self.stop.cancel();
    }
}

pub(crate) fn join_error(err: JoinError) -> GenerationError {
    if err.is_panic() {
        let panic = err.into_panic();
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        GenerationError::Panicked(message)
    } else {
        GenerationError::Canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn ids() -> (StageIdentity, PhaseIdentity) {
        (StageIdentity::new("overworld"), PhaseIdentity::new("test"))
    }

    #[test]
    #[should_panic(expected = "phase identity must not be empty")]
    fn empty_phase_identity_panics() {
        PhaseIdentity::new("");
    }

    #[test]
    fn identities_display_their_name() {
        let (stage, phase) = ids();
        assert_eq!(stage.to_string(), "overworld");
        assert_eq!(format!("{phase:?}"), "PhaseIdentity(\"test\")");
    }

    #[tokio::test]
    async fn body_result_becomes_completion() {
        let (stage, phase) = ids();
        let core = PhaseCore::spawn(stage, phase, 2, |ctx| async move {
            ctx.advance(2);
            Ok(())
        });
        assert!(matches!(core.completion().await, Ok(PhaseOutcome::Completed)));
        assert_eq!(core.current_progress(), Progress { processed: 2, total: 2 });
        let seen: Vec<_> = core.progress().try_collect().await.unwrap();
        assert_eq!(seen, vec![Progress { processed: 2, total: 2 }]);
    }

    #[tokio::test]
    async fn cancel_resolves_to_canceled() {
        let (stage, phase) = ids();
        let core = PhaseCore::spawn(stage, phase, 1, |ctx| async move {
            ctx.cancellation().cancelled().await;
            Err(GenerationError::Canceled)
        });
        core.cancel();
        assert!(matches!(core.completion().await, Ok(PhaseOutcome::Canceled)));
        assert!(core.cancellation().is_cancelled());
    }

    /// Resolves `done` once the body that owns it has returned.
    struct SignalOnDrop(Option<tokio::sync::oneshot::Sender<()>>);

    impl Drop for SignalOnDrop {
        fn drop(&mut self) {
            if let Some(done) = self.0.take() {
                let _ = done.send(());
            }
        }
    }

    #[tokio::test]
    async fn cancel_after_the_body_failed_keeps_the_fault() {
        let (stage, phase) = ids();
        let (done, finished) = tokio::sync::oneshot::channel();
        let core = PhaseCore::spawn(stage, phase, 1, move |_| async move {
            let _signal = SignalOnDrop(Some(done));
            Err(GenerationError::message("store rejected the batch"))
        });
        finished.await.unwrap();
        core.cancel();
        let completion = core.completion().await;
        assert!(matches!(completion, Err(GenerationError::Processing(_))), "{completion:?}");
    }

    #[tokio::test]
    async fn cancel_after_the_body_finished_keeps_completion() {
        let (stage, phase) = ids();
        let (done, finished) = tokio::sync::oneshot::channel();
        let core = PhaseCore::spawn(stage, phase, 1, move |ctx| async move {
            let _signal = SignalOnDrop(Some(done));
            ctx.advance(1);
            Ok(())
        });
        finished.await.unwrap();
        core.cancel();
        assert!(matches!(core.completion().await, Ok(PhaseOutcome::Completed)));
    }

    #[tokio::test]
    async fn complete_stops_without_canceling() {
        let (stage, phase) = ids();
        let core = PhaseCore::spawn(stage, phase, 1, |ctx| async move {
            ctx.stopped().await;
            Ok(())
        });
        core.complete();
        assert!(matches!(core.completion().await, Ok(PhaseOutcome::Completed)));
        assert!(!core.cancellation().is_cancelled());
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let (stage, phase) = ids();
        async fn explode() -> Result<(), GenerationError> {
            panic!("voxel overflow")
        }
        let core = PhaseCore::spawn(stage, phase, 1, |_| explode());
        match core.completion().await {
            Err(GenerationError::Panicked(message)) => assert_eq!(message, "voxel overflow"),
            other => panic!("unexpected completion {other:?}"),
        }
    }
}
