//! Session state observers.

use async_trait::async_trait;

use super::SessionEvent;

/// Notified of every session state change, in registration order.
///
/// Each notification is awaited before the next observer runs. Observers
/// may issue requests through the session but must not call
/// [`connect`](super::Session::connect) or
/// [`disconnect`](super::Session::disconnect): transitions are serialized
/// and that would wait on itself.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn on_state_changed(&self, event: &SessionEvent);
}
