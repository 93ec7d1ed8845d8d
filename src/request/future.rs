//! Single-resolution response handle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// Why a wait ended without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out")]
    TimedOut,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Resolved(T),
    Cancelled,
}

/// A value that is set at most once and can be awaited by any number of tasks.
///
/// The first call to [`resolve`](Self::resolve) or [`cancel`](Self::cancel)
/// wins, later calls are no-ops. Either one wakes every waiter.
#[derive(Debug)]
pub struct ResponseFuture<T> {
    slot: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Clone for ResponseFuture<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Clone> Default for ResponseFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ResponseFuture<T> {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(Slot::Pending);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Set the value. Returns `false` if already resolved or cancelled.
    pub fn resolve(&self, value: T) -> bool {
        self.slot.send_if_modified(move |slot| {
            if matches!(slot, Slot::Pending) {
                *slot = Slot::Resolved(value);
                true
            } else {
                false
            }
        })
    }

    /// Mark cancelled. Returns `false` if already resolved or cancelled.
    pub fn cancel(&self) -> bool {
        self.slot.send_if_modified(|slot| {
            if matches!(slot, Slot::Pending) {
                *slot = Slot::Cancelled;
                true
            } else {
                false
            }
        })
    }

    /// Whether a value or a cancellation has been recorded.
    pub fn is_done(&self) -> bool {
        !matches!(*self.slot.borrow(), Slot::Pending)
    }

    /// Wait until resolved or cancelled.
    pub async fn wait(&self) -> Result<T, WaitError> {
        let mut rx = self.slot.subscribe();
        loop {
            let outcome = match &*rx.borrow_and_update() {
                Slot::Pending => None,
                Slot::Resolved(value) => Some(Ok(value.clone())),
                Slot::Cancelled => Some(Err(WaitError::Cancelled)),
            };
            if let Some(outcome) = outcome {
                return outcome;
            }
            // The sender lives in `self`, so this only fails if it was dropped elsewhere.
            if rx.changed().await.is_err() {
                return Err(WaitError::Cancelled);
            }
        }
    }

    /// Wait at most `timeout`.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<T, WaitError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(WaitError::TimedOut),
        }
    }
}
