//! Registry of outstanding requests.

use std::time::Duration;

use dashmap::DashMap;
use spacelink_proto::Iq;
use tracing::{debug, trace};

use super::{CorrelationIds, ResponseFuture, WaitError};

/// Outstanding requests keyed by correlation id.
///
/// An entry is removed exactly once: by [`dispatch`](Self::dispatch) when the
/// reply arrives, by [`wait`](Self::wait) on timeout, or by
/// [`cancel`](Self::cancel). Replies without an entry are dropped.
pub struct PendingRequests {
    entries: DashMap<String, ResponseFuture<Iq>>,
    ids: CorrelationIds,
    timeout: Duration,
}

impl PendingRequests {
    /// Default bound for a request round-trip.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

    pub fn new(ids: CorrelationIds, timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ids,
            timeout,
        }
    }

    /// Default wait bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocate an id and register a future for it.
    ///
    /// Must happen before the request is sent.
    pub fn register(&self) -> (String, ResponseFuture<Iq>) {
        let id = self.ids.next();
        let future = ResponseFuture::new();
        self.entries.insert(id.clone(), future.clone());
        (id, future)
    }

    /// Route a reply to its waiter. Returns `false` if nothing was waiting.
    pub fn dispatch(&self, reply: &Iq) -> bool {
        if !reply.is_reply() {
            return false;
        }
        match self.entries.remove(&reply.id) {
            Some((_, future)) => {
                trace!(id = %reply.id, "reply matched");
                future.resolve(reply.clone())
            }
            None => {
                debug!(id = %reply.id, "dropping unmatched reply");
                false
            }
        }
    }

    /// Wait for the reply to `id`, at most `timeout`.
    ///
    /// On timeout the entry is removed, so a late reply is dropped.
    pub async fn wait(
        &self,
        id: &str,
        future: &ResponseFuture<Iq>,
        timeout: Duration,
    ) -> Result<Iq, WaitError> {
        let outcome = future.wait_timeout(timeout).await;
        if outcome.is_err() {
            // May already be gone if a reply raced the timeout.
            self.entries.remove(id);
        }
        outcome
    }

    /// Forget a request and wake its waiters without a value.
    pub fn cancel(&self, id: &str) -> bool {
        match self.entries.remove(id) {
            Some((_, future)) => future.cancel(),
            None => false,
        }
    }

    /// Cancel every outstanding request.
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter(|id| self.cancel(id)).count()
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
