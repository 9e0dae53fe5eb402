//! Phase progress reporting.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use crate::error::GenerationError;

/// Chunks processed so far out of the phase's total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
}

impl Progress {
    /// Completed fraction in `[0, 1]`; an empty phase counts as done.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.processed, self.total)
    }
}

#[derive(Clone, Debug)]
enum Status {
    Running,
    Finished,
    Faulted(GenerationError),
}

#[derive(Clone, Debug)]
struct Snapshot {
    progress: Progress,
    status: Status,
}

/// Timing and throughput of one phase run.
#[derive(Clone, Debug, Default)]
pub struct PhaseStats {
    /// Chunks processed.
    pub processed: u64,
    /// Batches written to a store.
    pub batches_flushed: u64,
    /// Chunks written to a store.
    pub chunks_flushed: u64,
    /// Wall time from start to finish.
    pub elapsed: Duration,
}

impl PhaseStats {
    /// Chunks per second, zero before any time has passed.
    pub fn chunks_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Publishes a phase's progress. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProgressTracker {
    sender: Arc<watch::Sender<Snapshot>>,
    started: Instant,
    batches_flushed: Arc<AtomicU64>,
    chunks_flushed: Arc<AtomicU64>,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        let (sender, _) = watch::channel(Snapshot {
            progress: Progress { processed: 0, total },
            status: Status::Running,
        });
        Self {
            sender: Arc::new(sender),
            started: Instant::now(),
            batches_flushed: Arc::new(AtomicU64::new(0)),
            chunks_flushed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn progress(&self) -> Progress {
        self.sender.borrow().progress
    }

    /// Count `count` more processed chunks. Ignored once finished.
    pub fn advance(&self, count: u64) -> Progress {
        let mut current = Progress::default();
        self.sender.send_if_modified(|snapshot| {
            if matches!(snapshot.status, Status::Running) {
                snapshot.progress.processed += count;
            }
            current = snapshot.progress;
            count > 0
        });
        current
    }

    /// Record one batch of `chunks` written to a store.
    pub fn record_flush(&self, chunks: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.chunks_flushed.fetch_add(chunks as u64, Ordering::Relaxed);
    }

    /// End the stream normally.
    pub fn finish(&self) {
        self.set_terminal(Status::Finished);
    }

    /// End the stream with `err`.
    pub fn fault(&self, err: GenerationError) {
        self.set_terminal(Status::Faulted(err));
    }

    fn set_terminal(&self, status: Status) {
        self.sender.send_if_modified(|snapshot| {
            if matches!(snapshot.status, Status::Running) {
                snapshot.status = status;
                true
            } else {
                false
            }
        });
    }

    pub fn stats(&self) -> PhaseStats {
        PhaseStats {
            processed: self.progress().processed,
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            chunks_flushed: self.chunks_flushed.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }

    /// Stream of progress updates.
    ///
    /// Updates that arrive faster than the consumer reads are coalesced into
    /// the latest value; counts never decrease. The stream ends after the
    /// phase finishes, or yields the phase's error last if it faulted.
    pub fn stream(&self) -> BoxStream<'static, Result<Progress, GenerationError>> {
        let state = StreamState {
            receiver: self.sender.subscribe(),
            last: None,
            done: false,
        };
        stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            loop {
                let snapshot = state.receiver.borrow_and_update().clone();
                let finished = match snapshot.status {
                    Status::Faulted(err) => {
                        state.done = true;
                        return Some((Err(err), state));
                    }
                    Status::Finished => true,
                    Status::Running => false,
                };
                if state.last != Some(snapshot.progress) {
                    state.last = Some(snapshot.progress);
                    state.done = finished;
                    return Some((Ok(snapshot.progress), state));
                }
                if finished || state.receiver.changed().await.is_err() {
                    return None;
                }
            }
        })
        .boxed()
    }
}

struct StreamState {
    receiver: watch::Receiver<Snapshot>,
    last: Option<Progress>,
    done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn stream_ends_after_finish() {
        let tracker = ProgressTracker::new(3);
        let stream = tracker.stream();
        tracker.advance(1);
        tracker.advance(2);
        tracker.finish();
        let seen: Vec<Progress> = stream.try_collect().await.unwrap();
        assert_eq!(seen.last(), Some(&Progress { processed: 3, total: 3 }));
        assert!(seen.windows(2).all(|w| w[0].processed < w[1].processed));
    }

    #[tokio::test]
    async fn fault_is_reported_last() {
        let tracker = ProgressTracker::new(10);
        tracker.advance(4);
        tracker.fault(GenerationError::message("disk full"));
        let items: Vec<_> = tracker.stream().collect().await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert_eq!(tracker.progress(), Progress { processed: 4, total: 10 });
    }

    #[test]
    fn advance_is_ignored_after_finish() {
        let tracker = ProgressTracker::new(2);
        tracker.advance(1);
        tracker.finish();
        tracker.fault(GenerationError::Canceled);
        assert_eq!(tracker.advance(1).processed, 1);
    }

    #[test]
    fn stats_count_flushes() {
        let tracker = ProgressTracker::new(4);
        tracker.advance(4);
        tracker.record_flush(3);
        tracker.record_flush(1);
        let stats = tracker.stats();
        assert_eq!(stats.processed, 4);
        assert_eq!(stats.batches_flushed, 2);
        assert_eq!(stats.chunks_flushed, 4);
    }

    #[test]
    fn fraction_of_empty_phase_is_one() {
        assert_eq!(Progress { processed: 0, total: 0 }.fraction(), 1.0);
        assert_eq!(Progress { processed: 1, total: 4 }.fraction(), 0.25);
    }
}
