//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns a client-side transport and the
//! [`MemoryServer`] end that receives whatever the client sends and injects
//! inbound stanzas and link events. Used to embed a client next to an
//! in-process server, and as the transport of the test suite.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use spacelink_proto::Stanza;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::debug;

use super::{
    InterceptorId, LinkEvent, ListenerId, ListenerSet, StanzaFilter, StanzaInterceptor,
    StanzaListener, Transport, TransportError,
};

struct Shared {
    listeners: ListenerSet,
    events: broadcast::Sender<LinkEvent>,
    connected: AtomicBool,
    accepting: AtomicBool,
    to_server: mpsc::UnboundedSender<Stanza>,
}

impl Shared {
    fn emit(&self, event: LinkEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

/// Client side of an in-process link.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Server side of an in-process link.
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Shared>,
    inbox: Arc<Mutex<mpsc::UnboundedReceiver<Stanza>>>,
}

impl MemoryTransport {
    /// Create a connected pair of ends. The link starts closed.
    pub fn pair() -> (MemoryTransport, MemoryServer) {
        let (to_server, inbox) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            listeners: ListenerSet::new(),
            events,
            connected: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            to_server,
        });
        (
            MemoryTransport {
                shared: shared.clone(),
            },
            MemoryServer {
                shared,
                inbox: Arc::new(Mutex::new(inbox)),
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(TransportError::Refused("server not accepting".into()));
        }
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            self.shared.emit(LinkEvent::Closed);
        }
    }

    async fn send(&self, mut stanza: Stanza) -> Result<(), TransportError> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.shared.listeners.intercept(&mut stanza);
        self.shared
            .to_server
            .send(stanza)
            .map_err(|_| TransportError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn add_listener(&self, filter: StanzaFilter, listener: Arc<dyn StanzaListener>) -> ListenerId {
        self.shared.listeners.add_listener(filter, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove_listener(id)
    }

    fn add_interceptor(&self, interceptor: Arc<dyn StanzaInterceptor>) -> InterceptorId {
        self.shared.listeners.add_interceptor(interceptor)
    }

    fn remove_interceptor(&self, id: InterceptorId) -> bool {
        self.shared.listeners.remove_interceptor(id)
    }

    fn link_events(&self) -> broadcast::Receiver<LinkEvent> {
        self.shared.events.subscribe()
    }
}

impl MemoryServer {
    /// Next stanza sent by the client.
    pub async fn recv(&self) -> Option<Stanza> {
        self.inbox.lock().await.recv().await
    }

    /// Deliver a stanza to the client's listeners. Dropped while the link is down.
    pub fn deliver(&self, stanza: impl Into<Stanza>) -> bool {
        if !self.shared.connected.load(Ordering::SeqCst) {
            debug!("link down, dropping inbound stanza");
            return false;
        }
        self.shared.listeners.dispatch(&stanza.into());
        true
    }

    /// Whether the client currently holds the link open.
    pub fn is_client_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Refuse (or accept again) connection attempts.
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Break the link as a network failure would.
    pub fn drop_link(&self, reason: &str) {
        if self.shared.connected.swap(false, Ordering::SeqCst) {
            self.shared.emit(LinkEvent::ClosedOnError(reason.to_string()));
        }
    }

    /// Bring the link back as a successful automatic reconnect would.
    pub fn restore_link(&self) {
        if !self.shared.connected.swap(true, Ordering::SeqCst) {
            self.shared.emit(LinkEvent::ReconnectSucceeded);
        }
    }

    /// Emit an arbitrary link event.
    pub fn emit(&self, event: LinkEvent) {
        self.shared.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacelink_proto::stanza::{Iq, Payload};

    struct Count(std::sync::atomic::AtomicUsize);

    impl StanzaListener for Count {
        fn on_stanza(&self, _stanza: &Stanza) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let (client, server) = MemoryTransport::pair();
        let stanza = Stanza::Iq(Iq::get("1", "x", Payload::Empty));
        assert!(matches!(
            client.send(stanza.clone()).await,
            Err(TransportError::NotConnected)
        ));

        client.connect().await.unwrap();
        client.send(stanza.clone()).await.unwrap();
        assert_eq!(server.recv().await, Some(stanza));
    }

    #[tokio::test]
    async fn link_events_and_delivery() {
        let (client, server) = MemoryTransport::pair();
        let mut events = client.link_events();
        let count = Arc::new(Count(Default::default()));
        client.add_listener(StanzaFilter::all(), count.clone());

        client.connect().await.unwrap();
        assert!(server.deliver(Iq::get("1", "x", Payload::Empty)));

        server.drop_link("reset");
        assert!(!server.deliver(Iq::get("2", "x", Payload::Empty)));
        assert_eq!(
            events.recv().await.unwrap(),
            LinkEvent::ClosedOnError("reset".into())
        );

        server.restore_link();
        assert_eq!(events.recv().await.unwrap(), LinkEvent::ReconnectSucceeded);
        assert_eq!(count.0.load(Ordering::SeqCst), 1);

        client.disconnect().await;
        assert_eq!(events.recv().await.unwrap(), LinkEvent::Closed);
    }

    #[tokio::test]
    async fn refused_connect() {
        let (client, server) = MemoryTransport::pair();
        server.set_accepting(false);
        assert!(matches!(
            client.connect().await,
            Err(TransportError::Refused(_))
        ));
        assert!(!client.is_connected());
    }
}
