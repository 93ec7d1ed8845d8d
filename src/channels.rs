//! Per-address pubsub channel registry.
//!
//! One registration per pubsub service address: a listener forwarding that
//! service's notifications into the delivery sink, plus a handle for issuing
//! pubsub requests to it. Each listener is stamped with the generation it
//! was installed under; [`ChannelRegistry::rebind`] bumps the generation
//! before swapping listeners, so the consumer can drop deliveries from a
//! replaced listener with [`ChannelRegistry::is_current`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::RwLock;
use spacelink_proto::{IqKind, Payload, PubSubEvent, PubSubItem, Stanza};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{ClientError, ClientResult};
use crate::net::{ListenerId, StanzaFilter, StanzaListener};
use crate::session::Session;

/// A notification tagged with the generation of the listener that saw it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub generation: u64,
    pub event: PubSubEvent,
}

struct EventForwarder {
    generation: u64,
    sink: mpsc::UnboundedSender<Delivery>,
}

impl StanzaListener for EventForwarder {
    fn on_stanza(&self, stanza: &Stanza) {
        if let Stanza::Event(event) = stanza {
            trace!(node = %event.node, items = event.items.len(), "forwarding notification");
            // Receiver gone means the engine is shutting down.
            let _ = self.sink.send(Delivery {
                generation: self.generation,
                event: event.clone(),
            });
        }
    }
}

/// Requests against one pubsub service.
#[derive(Debug, Clone)]
pub struct PubSubHandle {
    address: String,
    session: Session,
}

impl PubSubHandle {
    pub fn address(&self) -> &str {
        &self.address
    }

    fn subscriber(&self) -> String {
        self.session
            .bound_address()
            .unwrap_or_else(|| self.session.current_user())
    }

    pub async fn subscribe(&self, node: &str) -> ClientResult<()> {
        let payload = Payload::Subscribe {
            node: node.to_string(),
            address: self.subscriber(),
        };
        self.call(payload).await.map(|_| ())
    }

    pub async fn unsubscribe(&self, node: &str) -> ClientResult<()> {
        let payload = Payload::Unsubscribe {
            node: node.to_string(),
            address: self.subscriber(),
        };
        self.call(payload).await.map(|_| ())
    }

    /// Publish an item and return the id the service acknowledged.
    pub async fn publish(&self, node: &str, item: PubSubItem) -> ClientResult<String> {
        let fallback = item.id.clone();
        let reply = self
            .session
            .request(
                IqKind::Set,
                &self.address,
                Payload::Publish {
                    node: node.to_string(),
                    item,
                },
            )
            .await?;
        match reply.into_result() {
            Ok(Payload::Published { item_id, .. }) => Ok(item_id),
            Ok(_) => fallback.ok_or_else(|| ClientError::Rejected("publish not acknowledged".into())),
            Err(err) => Err(ClientError::Rejected(err.to_string())),
        }
    }

    /// Fetch items by id. An empty id list fetches everything the node retains.
    pub async fn fetch(&self, node: &str, item_ids: &[String]) -> ClientResult<Vec<PubSubItem>> {
        let payload = Payload::Items {
            node: node.to_string(),
            item_ids: item_ids.to_vec(),
        };
        match self.call(payload).await? {
            Payload::ItemsResult { items, .. } => Ok(items),
            _ => Ok(Vec::new()),
        }
    }

    async fn call(&self, payload: Payload) -> ClientResult<Payload> {
        let kind = match payload {
            Payload::Items { .. } => IqKind::Get,
            _ => IqKind::Set,
        };
        let reply = self.session.request(kind, &self.address, payload).await?;
        reply
            .into_result()
            .map_err(|err| ClientError::from_stanza_error(&err))
    }
}

struct Registration {
    listener: ListenerId,
    handle: PubSubHandle,
}

/// Listeners and handles keyed by pubsub service address.
pub struct ChannelRegistry {
    session: RwLock<Session>,
    registrations: DashMap<String, Registration>,
    generation: AtomicU64,
    sink: mpsc::UnboundedSender<Delivery>,
}

impl ChannelRegistry {
    pub fn new(session: Session, sink: mpsc::UnboundedSender<Delivery>) -> Self {
        Self {
            session: RwLock::new(session),
            registrations: DashMap::new(),
            generation: AtomicU64::new(0),
            sink,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether a delivery stamped with `generation` is still valid.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation()
    }

    fn install(&self, session: &Session, address: &str, generation: u64) -> ListenerId {
        session.transport().add_listener(
            StanzaFilter::events_from(address),
            Arc::new(EventForwarder {
                generation,
                sink: self.sink.clone(),
            }),
        )
    }

    /// Get or create the registration for `address`.
    pub fn ensure(&self, address: &str) -> PubSubHandle {
        let key = address.to_ascii_lowercase();
        if let Some(existing) = self.registrations.get(&key) {
            return existing.handle.clone();
        }
        let session = self.session.read().clone();
        let entry = self.registrations.entry(key).or_insert_with(|| {
            debug!(address = %address, "registering pubsub channel");
            let listener = self.install(&session, address, self.generation());
            Registration {
                listener,
                handle: PubSubHandle {
                    address: address.to_string(),
                    session: session.clone(),
                },
            }
        });
        entry.handle.clone()
    }

    pub fn handle(&self, address: &str) -> Option<PubSubHandle> {
        self.registrations
            .get(&address.to_ascii_lowercase())
            .map(|r| r.handle.clone())
    }

    /// Handle for one-off requests to `address`.
    ///
    /// Reuses the registration if there is one; otherwise nothing is
    /// registered and no listener is installed.
    pub fn requester(&self, address: &str) -> PubSubHandle {
        self.handle(address).unwrap_or_else(|| PubSubHandle {
            address: address.to_string(),
            session: self.session.read().clone(),
        })
    }

    /// Drop the registration for `address`. Returns `false` if there was none.
    pub fn release(&self, address: &str) -> bool {
        match self.registrations.remove(&address.to_ascii_lowercase()) {
            Some((_, registration)) => {
                debug!(address = %address, "releasing pubsub channel");
                self.session
                    .read()
                    .transport()
                    .remove_listener(registration.listener);
                true
            }
            None => false,
        }
    }

    /// Reinstall every registration against `session`.
    ///
    /// The generation is bumped first; anything the old listeners forwarded
    /// is stale from then on.
    pub fn rebind(&self, session: &Session) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = std::mem::replace(&mut *self.session.write(), session.clone());
        let old_transport = previous.transport();
        for mut registration in self.registrations.iter_mut() {
            old_transport.remove_listener(registration.listener);
            let address = registration.handle.address.clone();
            registration.listener = self.install(session, &address, generation);
            registration.handle.session = session.clone();
        }
        debug!(
            generation,
            channels = self.registrations.len(),
            "pubsub channels rebound"
        );
    }

    pub fn addresses(&self) -> Vec<String> {
        self.registrations
            .iter()
            .map(|r| r.handle.address.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        let transport = self.session.read().transport();
        for registration in self.registrations.iter() {
            transport.remove_listener(registration.listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{MemoryTransport, Transport};
    use crate::session::SessionSettings;

    fn event(from: &str, node: &str) -> PubSubEvent {
        PubSubEvent {
            from: from.to_string(),
            node: node.to_string(),
            items: Vec::new(),
        }
    }

    #[tokio::test]
    async fn ensure_is_idempotent_and_forwards() {
        let (transport, server) = MemoryTransport::pair();
        let session = Session::new(
            SessionSettings::new("example.org", "alice", "pw"),
            Arc::new(transport.clone()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = ChannelRegistry::new(session, tx);

        registry.ensure("pubsub.example.org");
        registry.ensure("PubSub.example.org");
        assert_eq!(registry.len(), 1);

        transport.connect().await.unwrap();
        server.deliver(event("pubsub.example.org", "spaces#1"));
        server.deliver(event("other.example.org", "spaces#2"));

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.event.node, "spaces#1");
        assert!(registry.is_current(delivery.generation));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rebind_invalidates_old_deliveries() {
        let (transport, server) = MemoryTransport::pair();
        let session = Session::new(
            SessionSettings::new("example.org", "alice", "pw"),
            Arc::new(transport.clone()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = ChannelRegistry::new(session.clone(), tx);
        registry.ensure("pubsub.example.org");

        transport.connect().await.unwrap();
        server.deliver(event("pubsub.example.org", "before"));
        registry.rebind(&session);
        server.deliver(event("pubsub.example.org", "after"));

        let stale = rx.recv().await.unwrap();
        assert_eq!(stale.event.node, "before");
        assert!(!registry.is_current(stale.generation));

        let fresh = rx.recv().await.unwrap();
        assert_eq!(fresh.event.node, "after");
        assert!(registry.is_current(fresh.generation));
        assert!(rx.try_recv().is_err(), "old listener must be gone");
    }

    #[tokio::test]
    async fn rebind_moves_listeners_to_another_session() {
        let (first, first_server) = MemoryTransport::pair();
        let (second, second_server) = MemoryTransport::pair();
        let settings = SessionSettings::new("example.org", "alice", "pw");
        let old_session = Session::new(settings.clone(), Arc::new(first.clone()));
        let new_session = Session::new(settings, Arc::new(second.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = ChannelRegistry::new(old_session, tx);
        registry.ensure("pubsub.example.org");

        registry.rebind(&new_session);
        assert_eq!(registry.addresses(), vec!["pubsub.example.org".to_string()]);

        first.connect().await.unwrap();
        second.connect().await.unwrap();
        first_server.deliver(event("pubsub.example.org", "old"));
        assert!(rx.try_recv().is_err(), "old transport must not forward");

        second_server.deliver(event("pubsub.example.org", "new"));
        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.event.node, "new");
        assert!(registry.is_current(delivery.generation));

        let handle = registry.handle("pubsub.example.org").unwrap();
        assert!(Arc::ptr_eq(&handle.session.transport(), &new_session.transport()));
    }

    #[tokio::test]
    async fn requester_registers_nothing() {
        let (transport, server) = MemoryTransport::pair();
        let session = Session::new(
            SessionSettings::new("example.org", "alice", "pw"),
            Arc::new(transport.clone()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = ChannelRegistry::new(session, tx);

        let handle = registry.requester("pubsub.example.org");
        assert_eq!(handle.address(), "pubsub.example.org");
        assert!(registry.is_empty());

        transport.connect().await.unwrap();
        server.deliver(event("pubsub.example.org", "n"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn release_stops_forwarding() {
        let (transport, server) = MemoryTransport::pair();
        let session = Session::new(
            SessionSettings::new("example.org", "alice", "pw"),
            Arc::new(transport.clone()),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registry = ChannelRegistry::new(session, tx);
        registry.ensure("pubsub.example.org");
        assert!(registry.release("pubsub.example.org"));
        assert!(!registry.release("pubsub.example.org"));

        transport.connect().await.unwrap();
        server.deliver(event("pubsub.example.org", "n"));
        assert!(rx.try_recv().is_err());
    }
}
