//! Transport layer.
//!
//! The engines treat the transport as an address-addressed, filtered,
//! asynchronous message bus: send stanzas, register listeners for inbound
//! stanzas, and observe link events. Reconnection with backoff is the
//! transport's business; the session only observes it.

mod listener;
pub mod memory;
mod stream;
pub mod tcp;
mod tls;

use std::sync::Arc;

use async_trait::async_trait;
use spacelink_proto::{ProtocolError, Stanza};
use thiserror::Error;
use tokio::sync::broadcast;

pub use listener::ListenerSet;
pub use memory::{MemoryServer, MemoryTransport};
pub use tcp::{ReconnectPolicy, TcpSettings, TcpTransport};

/// Handle for a registered listener.
pub type ListenerId = u64;

/// Handle for a registered interceptor.
pub type InterceptorId = u64;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls error: {0}")]
    Tls(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("not connected")]
    NotConnected,
    #[error("connection refused: {0}")]
    Refused(String),
}

/// Lower-layer link signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Closed on request.
    Closed,
    /// Closed by a failure.
    ClosedOnError(String),
    /// A reconnect attempt is scheduled.
    ReconnectingIn(u64),
    /// A reconnect attempt failed.
    ReconnectFailed(String),
    /// The link is back up. The session has to authenticate again.
    ReconnectSucceeded,
    /// Reconnection gave up after this many attempts. The link stays down
    /// until an explicit connect.
    ReconnectAbandoned(u32),
}

/// Shape of an inbound stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StanzaShape {
    /// Iq result or error.
    Reply,
    /// Iq get or set.
    Request,
    /// Pubsub notification.
    Event,
}

impl StanzaShape {
    pub fn of(stanza: &Stanza) -> Self {
        match stanza {
            Stanza::Iq(iq) if iq.is_reply() => Self::Reply,
            Stanza::Iq(_) => Self::Request,
            Stanza::Event(_) => Self::Event,
        }
    }
}

/// Selects which inbound stanzas a listener receives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StanzaFilter {
    /// Only stanzas from this bare address.
    pub from: Option<String>,
    /// Only stanzas of this shape.
    pub shape: Option<StanzaShape>,
}

impl StanzaFilter {
    /// Every inbound stanza.
    pub fn all() -> Self {
        Self::default()
    }

    /// Every iq reply.
    pub fn replies() -> Self {
        Self {
            from: None,
            shape: Some(StanzaShape::Reply),
        }
    }

    /// Pubsub notifications from `address`.
    pub fn events_from(address: impl Into<String>) -> Self {
        Self {
            from: Some(address.into()),
            shape: Some(StanzaShape::Event),
        }
    }

    pub fn matches(&self, stanza: &Stanza) -> bool {
        if let Some(shape) = self.shape
            && StanzaShape::of(stanza) != shape
        {
            return false;
        }
        match &self.from {
            Some(from) => stanza
                .from()
                .is_some_and(|actual| spacelink_proto::jid::same_entity(actual, from)),
            None => true,
        }
    }
}

/// Receives inbound stanzas.
///
/// Called on the transport's delivery task; implementations must not block.
pub trait StanzaListener: Send + Sync {
    fn on_stanza(&self, stanza: &Stanza);
}

/// Sees, and may modify, every outbound stanza before it is sent.
pub trait StanzaInterceptor: Send + Sync {
    fn intercept(&self, stanza: &mut Stanza);
}

/// A connection to a server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link. A no-op if already connected.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the link. A no-op if not connected.
    async fn disconnect(&self);

    /// Queue a stanza for sending. Interceptors run first.
    async fn send(&self, stanza: Stanza) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    fn add_listener(&self, filter: StanzaFilter, listener: Arc<dyn StanzaListener>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;

    fn add_interceptor(&self, interceptor: Arc<dyn StanzaInterceptor>) -> InterceptorId;

    fn remove_interceptor(&self, id: InterceptorId) -> bool;

    /// Subscribe to link events.
    fn link_events(&self) -> broadcast::Receiver<LinkEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacelink_proto::stanza::{Iq, Payload, PubSubEvent};

    fn event_from(from: &str) -> Stanza {
        Stanza::Event(PubSubEvent {
            from: from.to_string(),
            node: "n".to_string(),
            items: Vec::new(),
        })
    }

    #[test]
    fn filter_by_shape_and_origin() {
        let filter = StanzaFilter::events_from("pubsub.example.org");
        assert!(filter.matches(&event_from("pubsub.example.org")));
        assert!(!filter.matches(&event_from("other.example.org")));

        let mut reply = Iq::get("1", "x", Payload::Empty).result(Payload::Empty);
        reply.from = Some("pubsub.example.org".into());
        assert!(!filter.matches(&Stanza::Iq(reply.clone())));
        assert!(StanzaFilter::replies().matches(&Stanza::Iq(reply)));
    }

    #[test]
    fn request_shape() {
        let stanza = Stanza::Iq(Iq::set("1", "x", Payload::Empty));
        assert_eq!(StanzaShape::of(&stanza), StanzaShape::Request);
        assert!(StanzaFilter::all().matches(&stanza));
    }
}
