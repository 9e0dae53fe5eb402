use std::fmt;

use futures::future::FutureExt;
use futures::stream::{BoxStream, StreamExt};

use super::{
    CancellationToken, GenerationPhase, PhaseCompletion, PhaseIdentity, Progress, StageIdentity,
};
use crate::error::{GenerationError, StageGenerationError};

/// Attributes every error of the wrapped phase to its stage and phase.
///
/// Errors from both the completion and the progress stream come out as
/// [`GenerationError::Stage`]. Errors that are already attributed, for
/// example from a nested filtered phase, pass through unchanged.
pub struct ExceptionFilteredPhase<P> {
    inner: P,
    completion: PhaseCompletion,
}

impl<P: fmt::Debug> fmt::Debug for ExceptionFilteredPhase<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExceptionFilteredPhase").field(&self.inner).finish()
    }
}

impl<P: GenerationPhase> ExceptionFilteredPhase<P> {
    pub fn new(inner: P) -> Self {
        let attribute = attributor(&inner);
        let completion = inner
            .completion()
            .map(move |result| result.map_err(attribute))
            .boxed()
            .shared();
        Self { inner, completion }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

fn attributor<P: GenerationPhase>(
    phase: &P,
) -> impl Fn(GenerationError) -> GenerationError + Send + Sync + 'static {
    let stage = phase.stage_identity().clone();
    let phase = phase.phase_identity().clone();
    move |err| GenerationError::Stage(StageGenerationError::wrap(&stage, &phase, err))
}

impl<P: GenerationPhase> GenerationPhase for ExceptionFilteredPhase<P> {
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
        let attribute = attributor(&self.inner);
        self.inner
            .progress()
            .map(move |item| item.map_err(&attribute))
            .boxed()
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
    use futures::TryStreamExt;
    use std::error::Error as _;

    fn failing(phase: &str) -> PhaseCore {
        PhaseCore::spawn(StageIdentity::new("overworld"), PhaseIdentity::new(phase), 3, |ctx| async move {
            ctx.advance(1);
            Err(GenerationError::message("divide by zero"))
        })
    }

    #[tokio::test]
    async fn completion_error_is_attributed() {
        let filtered = ExceptionFilteredPhase::new(failing("contour"));
        let err = filtered.completion().await.unwrap_err();
        let GenerationError::Stage(stage_err) = &err else {
            panic!("expected a stage error, got {err:?}");
        };
        assert_eq!(stage_err.phase, PhaseIdentity::new("contour"));
        assert_eq!(err.to_string(), "Exception generating contour");
        assert_eq!(
            stage_err.source().unwrap().to_string(),
            "chunk processing failed: divide by zero"
        );
    }

    #[tokio::test]
    async fn progress_error_is_attributed() {
        let filtered = ExceptionFilteredPhase::new(failing("populate"));
        let _ = filtered.completion().await;
        let err = filtered.progress().try_collect::<Vec<_>>().await.unwrap_err();
        assert!(matches!(err, GenerationError::Stage(ref e) if e.phase.name() == "populate"));
    }

    #[tokio::test]
    async fn nested_filters_do_not_rewrap() {
        let filtered = ExceptionFilteredPhase::new(ExceptionFilteredPhase::new(failing("inner")));
        let GenerationError::Stage(err) = filtered.completion().await.unwrap_err() else {
            panic!("expected a stage error");
        };
        assert!(matches!(*err.source, GenerationError::Processing(_)));
    }

    #[tokio::test]
    async fn success_and_cancel_pass_through() {
        let ok = ExceptionFilteredPhase::new(PhaseCore::spawn(
            StageIdentity::new("overworld"),
            PhaseIdentity::new("noop"),
            0,
            |_| async { Ok(()) },
        ));
        assert!(matches!(ok.completion().await, Ok(PhaseOutcome::Completed)));

        let canceled = ExceptionFilteredPhase::new(PhaseCore::spawn(
            StageIdentity::new("overworld"),
            PhaseIdentity::new("slow"),
            1,
            |ctx| async move {
                ctx.stopped().await;
                Err(GenerationError::Canceled)
            },
        ));
        canceled.cancel();
        assert!(matches!(canceled.completion().await, Ok(PhaseOutcome::Canceled)));
    }
}
