//! A cloneable, awaitable cancellation flag.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Signals cancellation to every clone. Once cancelled it stays cancelled.
#[derive(Clone)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_if_modified(|cancelled| !std::mem::replace(cancelled, true));
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }

    /// Fail with `err` if cancelled.
    pub fn check<E>(&self, err: impl FnOnce() -> E) -> Result<(), E> {
        if self.is_cancelled() {
            Err(err())
        } else {
            Ok(())
        }
    }
}
