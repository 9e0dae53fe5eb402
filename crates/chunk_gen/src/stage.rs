//! A stage keeps one live chunk per active key.
//!
//! Activity transitions come in as `(key, is_active)` pairs; the stage turns
//! them into [`StageEvent`]s on an unbounded channel. When the activity
//! stream ends, or the stage is dropped, every chunk still active is
//! deactivated in key order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use log::{debug, trace, warn};
use tokio::sync::mpsc;

use crate::error::GenerationError;
use crate::factory::ChunkFactory;

/// What a stage reports to its subscriber.
#[derive(Debug)]
pub enum StageEvent<K, C> {
    Activated { key: K, chunk: Arc<C> },
    Deactivated { key: K, chunk: Arc<C> },
    /// The factory failed for an activated key; the key stays inactive.
    Faulted { key: K, error: GenerationError },
}

impl<K: Copy, C> StageEvent<K, C> {
    pub fn key(&self) -> K {
        match self {
            Self::Activated { key, .. } | Self::Deactivated { key, .. } | Self::Faulted { key, .. } => {
                *key
            }
        }
    }
}

pub struct Stage<K, C> {
    factory: Arc<dyn ChunkFactory<K, C>>,
    active: BTreeMap<K, Arc<C>>,
    events: mpsc::UnboundedSender<StageEvent<K, C>>,
}

impl<K: fmt::Debug, C> fmt::Debug for Stage<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<K: Ord + Copy + fmt::Debug, C> Stage<K, C> {
    /// Create a stage and the receiving end of its events.
    pub fn new(
        factory: Arc<dyn ChunkFactory<K, C>>,
    ) -> (Self, mpsc::UnboundedReceiver<StageEvent<K, C>>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let stage = Self {
            factory,
            active: BTreeMap::new(),
            events,
        };
        (stage, receiver)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, key: &K) -> bool {
        self.active.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&Arc<C>> {
        self.active.get(key)
    }

    /// Apply one activity transition. Repeated transitions to the state a key
    /// is already in are ignored.
    pub fn handle_activity(&mut self, key: K, is_active: bool) {
        if is_active {
            if self.active.contains_key(&key) {
                trace!("ignoring duplicate activation of {key:?}");
                return;
            }
            match self.factory.create_chunk(key) {
                Ok(chunk) => {
                    let chunk = Arc::new(chunk);
                    self.active.insert(key, Arc::clone(&chunk));
                    self.emit(StageEvent::Activated { key, chunk });
                }
                Err(error) => {
                    warn!("failed to create chunk {key:?}: {error}");
                    self.emit(StageEvent::Faulted { key, error });
                }
            }
        } else if let Some(chunk) = self.active.remove(&key) {
            self.emit(StageEvent::Deactivated { key, chunk });
        }
    }

    /// Consume an activity stream, then tear the stage down.
    pub async fn run(mut self, activity: impl Stream<Item = (K, bool)>) {
        futures::pin_mut!(activity);
        while let Some((key, is_active)) = activity.next().await {
            self.handle_activity(key, is_active);
        }
        self.complete();
    }

    /// Deactivate every active chunk and close the event channel.
    pub fn complete(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.active.is_empty() {
            return;
        }
        debug!("tearing down stage with {} active chunks", self.active.len());
        for (key, chunk) in std::mem::take(&mut self.active) {
            self.emit(StageEvent::Deactivated { key, chunk });
        }
    }

    fn emit(&self, event: StageEvent<K, C>) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }
}

impl<K, C> Drop for Stage<K, C> {
    fn drop(&mut self) {
        for (key, chunk) in std::mem::take(&mut self.active) {
            let _ = self.events.send(StageEvent::Deactivated { key, chunk });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ChunkKey;

    fn factory() -> Arc<dyn ChunkFactory<ChunkKey, i32>> {
        Arc::new(|key: ChunkKey| {
            if key.x() < 0 {
                Err(GenerationError::message("negative"))
            } else {
                Ok(key.x())
            }
        })
    }

    fn drain<K, C>(receiver: &mut mpsc::UnboundedReceiver<StageEvent<K, C>>) -> Vec<StageEvent<K, C>> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn activation_and_deactivation_emit_events() {
        let (mut stage, mut events) = Stage::new(factory());
        stage.handle_activity(ChunkKey::new(1, 0, 0), true);
        stage.handle_activity(ChunkKey::new(1, 0, 0), true);
        stage.handle_activity(ChunkKey::new(2, 0, 0), false);
        assert_eq!(stage.active_len(), 1);
        assert_eq!(**stage.get(&ChunkKey::new(1, 0, 0)).unwrap(), 1);

        stage.handle_activity(ChunkKey::new(1, 0, 0), false);
        let seen = drain(&mut events);
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], StageEvent::Activated { chunk: ref c, .. } if **c == 1));
        assert!(matches!(seen[1], StageEvent::Deactivated { .. }));
        assert!(!stage.is_active(&ChunkKey::new(1, 0, 0)));
    }

    #[test]
    fn factory_failure_is_reported_and_key_stays_inactive() {
        let (mut stage, mut events) = Stage::new(factory());
        stage.handle_activity(ChunkKey::new(-1, 0, 0), true);
        assert!(!stage.is_active(&ChunkKey::new(-1, 0, 0)));
        let seen = drain(&mut events);
        assert!(matches!(seen.as_slice(), [StageEvent::Faulted { .. }]));
    }

    #[tokio::test]
    async fn stream_end_replays_deactivation_for_active_chunks() {
        let (stage, mut events) = Stage::new(factory());
        let activity = futures::stream::iter(vec![
            (ChunkKey::new(3, 0, 0), true),
            (ChunkKey::new(1, 0, 0), true),
            (ChunkKey::new(2, 0, 0), true),
            (ChunkKey::new(1, 0, 0), false),
        ]);
        stage.run(activity).await;

        let mut deactivated = Vec::new();
        while let Some(event) = events.recv().await {
            if let StageEvent::Deactivated { key, .. } = event {
                deactivated.push(key.x());
            }
        }
        assert_eq!(deactivated, vec![1, 2, 3]);
    }

    #[test]
    fn dropping_the_stage_deactivates_everything() {
        let (mut stage, mut events) = Stage::new(factory());
        stage.handle_activity(ChunkKey::new(4, 0, 0), true);
        drop(stage);
        let seen = drain(&mut events);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].key(), ChunkKey::new(4, 0, 0));
        assert!(matches!(seen[1], StageEvent::Deactivated { .. }));
    }
}
