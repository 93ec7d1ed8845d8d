//! Listener and interceptor bookkeeping shared by the transports.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use spacelink_proto::Stanza;

use super::{InterceptorId, ListenerId, StanzaFilter, StanzaInterceptor, StanzaListener};

type ListenerEntry = (ListenerId, StanzaFilter, Arc<dyn StanzaListener>);

/// Registered listeners and interceptors of one transport.
#[derive(Default)]
pub struct ListenerSet {
    next_id: AtomicU64,
    listeners: RwLock<Vec<ListenerEntry>>,
    interceptors: RwLock<Vec<(InterceptorId, Arc<dyn StanzaInterceptor>)>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, filter: StanzaFilter, listener: Arc<dyn StanzaListener>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, filter, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    pub fn add_interceptor(&self, interceptor: Arc<dyn StanzaInterceptor>) -> InterceptorId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.interceptors.write().push((id, interceptor));
        id
    }

    pub fn remove_interceptor(&self, id: InterceptorId) -> bool {
        let mut interceptors = self.interceptors.write();
        let before = interceptors.len();
        interceptors.retain(|(iid, _)| *iid != id);
        interceptors.len() != before
    }

    /// Deliver an inbound stanza to every matching listener, in registration order.
    ///
    /// Listeners are called outside the lock so they may (un)register listeners.
    pub fn dispatch(&self, stanza: &Stanza) -> usize {
        let matching: Vec<Arc<dyn StanzaListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, filter, _)| filter.matches(stanza))
            .map(|(_, _, listener)| listener.clone())
            .collect();
        for listener in &matching {
            listener.on_stanza(stanza);
        }
        matching.len()
    }

    /// Run every interceptor over an outbound stanza.
    pub fn intercept(&self, stanza: &mut Stanza) {
        let interceptors: Vec<Arc<dyn StanzaInterceptor>> = self
            .interceptors
            .read()
            .iter()
            .map(|(_, i)| i.clone())
            .collect();
        for interceptor in interceptors {
            interceptor.intercept(stanza);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}
