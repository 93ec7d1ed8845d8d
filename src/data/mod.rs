//! Dual-mode data exchange.
//!
//! [`DataExchangeEngine`] publishes data objects to the pubsub channels of
//! the spaces it handles, or queues them locally while the effective mode is
//! offline and replays the queue once it is online again. Inbound
//! notifications are fetched when they arrive without payload, deduplicated
//! against the item cache and handed to [`DataObserver`]s.

mod query;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use spacelink_proto::{
    DataObject, DataObjectBuilder, DataObjectFilter, Persistence, PubSubEvent, PubSubItem, Space,
    jid,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, trace, warn};

use crate::channels::{ChannelRegistry, Delivery};
use crate::error::{ClientError, ClientResult};
use crate::mode::{Mode, ModeTracker};
use crate::observer::{ObserverId, ObserverSet};
use crate::request::{ResponseFuture, WaitError};
use crate::session::{Session, SessionEvent, SessionObserver, SessionState};
use crate::spaces::SpaceMembershipEngine;
use crate::store::{CachedItem, LocalStore, QueuedOutbound};
use crate::telemetry::spans;

/// Receives data objects delivered on handled spaces.
///
/// Called on the delivery task; implementations must not block.
pub trait DataObserver: Send + Sync {
    fn on_item(&self, object: &DataObject, space_id: &str);
}

/// Result of [`DataExchangeEngine::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Published; the service acknowledged `item_id`.
    Acknowledged { item_id: String },
    /// Offline; stored in the outbound queue under `local_id`.
    Queued { local_id: String },
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub sent: usize,
    pub failed: usize,
    /// Entries not attempted because the pass stopped early.
    pub remaining: usize,
}

/// A space whose channel this engine listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledSpace {
    pub space_id: String,
    pub node: String,
    /// Address of the pubsub service owning the node.
    pub service: String,
    pub persistence: Persistence,
    pub subscribed: bool,
}

impl HandledSpace {
    fn from_space(space: &Space) -> ClientResult<Self> {
        let (Some(node), Some(service)) = (space.pubsub_node(), space.pubsub_domain()) else {
            return Err(ClientError::UnknownEntity(format!(
                "space {} has no pubsub channel",
                space.id
            )));
        };
        Ok(Self {
            space_id: space.id.clone(),
            node: node.to_string(),
            service: service.to_string(),
            persistence: space.persistence,
            subscribed: false,
        })
    }
}

struct EngineInner {
    session: RwLock<Session>,
    spaces: Arc<SpaceMembershipEngine>,
    store: Arc<dyn LocalStore>,
    mode: Arc<ModeTracker>,
    channels: ChannelRegistry,
    handled: DashMap<String, HandledSpace>,
    /// Set when the session leaves online; the next online transition
    /// rebinds channels and subscribes everything again.
    needs_resubscribe: AtomicBool,
    observers: ObserverSet<dyn DataObserver>,
    filter: RwLock<Option<Arc<dyn DataObjectFilter>>>,
    pending_fetches: DashSet<String>,
    echo_waiters: DashMap<String, ResponseFuture<DataObject>>,
    replay_lock: tokio::sync::Mutex<()>,
}

/// Removes an echo waiter on every exit path.
struct EchoGuard<'a> {
    waiters: &'a DashMap<String, ResponseFuture<DataObject>>,
    item_id: String,
}

impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        self.waiters.remove(&self.item_id);
    }
}

/// Reacts to session state changes.
struct SessionWatch(Weak<EngineInner>);

#[async_trait]
impl SessionObserver for SessionWatch {
    async fn on_state_changed(&self, event: &SessionEvent) {
        let Some(inner) = self.0.upgrade() else { return };
        if event.current == SessionState::Online {
            if inner.mode.requested() == Mode::Online {
                inner.go_online().await;
            }
        } else if event.previous == SessionState::Online {
            debug!(state = %event.current, "left online, full resubscribe pending");
            inner.needs_resubscribe.store(true, Ordering::SeqCst);
            for mut space in inner.handled.iter_mut() {
                space.subscribed = false;
            }
        }
    }
}

/// Publish/subscribe engine with an offline queue.
pub struct DataExchangeEngine {
    inner: Arc<EngineInner>,
    delivery: JoinHandle<()>,
    session_watch: Mutex<ObserverId>,
}

impl DataExchangeEngine {
    /// Create the engine and start its delivery task. Needs a tokio runtime.
    pub fn new(
        session: Session,
        spaces: Arc<SpaceMembershipEngine>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        let inner = Arc::new(EngineInner {
            channels: ChannelRegistry::new(session.clone(), tx),
            mode: spaces.mode(),
            session: RwLock::new(session.clone()),
            spaces,
            store,
            handled: DashMap::new(),
            needs_resubscribe: AtomicBool::new(false),
            observers: ObserverSet::new(),
            filter: RwLock::new(None),
            pending_fetches: DashSet::new(),
            echo_waiters: DashMap::new(),
            replay_lock: tokio::sync::Mutex::new(()),
        });

        let weak = Arc::downgrade(&inner);
        let delivery = tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                if !inner.channels.is_current(delivery.generation) {
                    debug!(node = %delivery.event.node, "dropping delivery from replaced channel");
                    continue;
                }
                inner.on_incoming(delivery.event).await;
            }
        });

        let session_watch = session.add_observer(Arc::new(SessionWatch(Arc::downgrade(&inner))));
        Self {
            inner,
            delivery,
            session_watch: Mutex::new(session_watch),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn DataObserver>) -> ObserverId {
        self.inner.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Set or clear the validity filter applied before observers are notified.
    pub fn set_filter(&self, filter: Option<Arc<dyn DataObjectFilter>>) {
        *self.inner.filter.write() = filter;
    }

    pub fn requested_mode(&self) -> Mode {
        self.inner.mode.requested()
    }

    pub fn effective_mode(&self) -> Mode {
        self.inner.mode.effective()
    }

    /// Change the requested mode.
    ///
    /// If this makes the effective mode online, pending subscriptions are
    /// made and the outbound queue is replayed before returning.
    pub async fn set_mode(&self, mode: Mode) {
        let before = self.inner.mode.effective();
        self.inner.mode.request(mode);
        let after = self.inner.mode.effective();
        info!(requested = ?mode, effective = ?after, "mode changed");
        if before == Mode::Offline && after == Mode::Online {
            self.inner.go_online().await;
        }
    }

    pub fn handled_spaces(&self) -> Vec<HandledSpace> {
        let mut spaces: Vec<HandledSpace> =
            self.inner.handled.iter().map(|e| e.value().clone()).collect();
        spaces.sort_by(|a, b| a.space_id.cmp(&b.space_id));
        spaces
    }

    /// Pubsub services this engine currently listens to.
    pub fn channel_addresses(&self) -> Vec<String> {
        self.inner.channels.addresses()
    }

    pub fn is_handled(&self, space_id: &str) -> bool {
        self.inner.handled.contains_key(space_id)
    }

    /// Start handling a space. Subscribes right away when online.
    ///
    /// A no-op for a space that is already handled.
    pub async fn register_space(&self, space_id: &str) -> ClientResult<()> {
        if self.inner.handled.contains_key(space_id) {
            trace!(space_id = %space_id, "space already handled");
            return Ok(());
        }
        let space = self
            .inner
            .spaces
            .get(space_id)
            .await?
            .ok_or_else(|| ClientError::UnknownSpace(space_id.to_string()))?;
        let entry = HandledSpace::from_space(&space)?;
        let (node, service) = (entry.node.clone(), entry.service.clone());

        // A concurrent register may have won.
        match self.inner.handled.entry(space_id.to_string()) {
            Entry::Occupied(_) => {
                trace!(space_id = %space_id, "space registered concurrently");
                return Ok(());
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
        let handle = self.inner.channels.ensure(&service);

        if self.inner.mode.is_online() {
            if let Err(e) = handle.subscribe(&node).await {
                warn!(space_id = %space_id, error = %e, "subscribe failed");
                self.inner
                    .handled
                    .remove_if(space_id, |_, handled| !handled.subscribed);
                self.inner.release_if_unused(&service);
                return Err(e);
            }
            if let Some(mut handled) = self.inner.handled.get_mut(space_id) {
                handled.subscribed = true;
            }
        }
        info!(space_id = %space_id, node = %node, "space registered");
        Ok(())
    }

    /// Stop handling a space and purge its cached items.
    ///
    /// A no-op for a space that is not handled. Unsubscribe failures are
    /// logged.
    pub async fn unregister_space(&self, space_id: &str) -> ClientResult<()> {
        let Some((_, entry)) = self.inner.handled.remove(space_id) else {
            trace!(space_id = %space_id, "space not handled");
            return Ok(());
        };
        match self.inner.store.delete_items_by_node(&entry.node).await {
            Ok(purged) => debug!(space_id = %space_id, purged, "cached items purged"),
            Err(e) => warn!(space_id = %space_id, error = %e, "failed to purge cached items"),
        }
        if self.inner.mode.is_online()
            && entry.subscribed
            && let Some(handle) = self.inner.channels.handle(&entry.service)
            && let Err(e) = handle.unsubscribe(&entry.node).await
        {
            warn!(space_id = %space_id, error = %e, code = e.error_code(), "unsubscribe failed");
        }
        self.inner.release_if_unused(&entry.service);
        info!(space_id = %space_id, "space unregistered");
        Ok(())
    }

    /// Publish `object` to a handled space, or queue it while offline.
    ///
    /// Objects without `id` or `timestamp` get them stamped.
    pub async fn publish(&self, space_id: &str, object: DataObject) -> ClientResult<PublishOutcome> {
        let object = DataObjectBuilder::from_object(object).stamp().build();
        if !self.inner.mode.is_online() {
            let local_id = uuid::Uuid::new_v4().to_string();
            let entry = QueuedOutbound {
                local_id: local_id.clone(),
                space_id: space_id.to_string(),
                user: self.inner.session().current_user(),
                payload: object,
                queued_at: Utc::now(),
            };
            self.inner.store.enqueue(&entry).await?;
            debug!(space_id = %space_id, local_id = %local_id, "offline, publish queued");
            return Ok(PublishOutcome::Queued { local_id });
        }
        let item_id = self.inner.publish_online(space_id, object).await?;
        Ok(PublishOutcome::Acknowledged { item_id })
    }

    /// Publish and wait for the service to send the item back.
    ///
    /// Returns the copy as delivered, with whatever the service filled in.
    pub async fn publish_and_await_echo(
        &self,
        space_id: &str,
        object: DataObject,
    ) -> ClientResult<DataObject> {
        if !self.inner.mode.is_online() {
            return Err(ClientError::RequiresOnline);
        }
        let service = self
            .inner
            .handled
            .get(space_id)
            .map(|h| h.service.clone())
            .ok_or_else(|| ClientError::UnknownSpace(space_id.to_string()))?;
        let object = DataObjectBuilder::from_object(object).stamp().build();
        let item_id = uuid::Uuid::new_v4().to_string();

        let echo = ResponseFuture::new();
        self.inner
            .echo_waiters
            .insert(item_id.clone(), echo.clone());
        let _guard = EchoGuard {
            waiters: &self.inner.echo_waiters,
            item_id: item_id.clone(),
        };

        self.inner
            .publish_item(space_id, item_id.clone(), object)
            .await?;
        let timeout = self.inner.session().settings().request_timeout;
        match echo.wait_timeout(timeout).await {
            Ok(copy) => Ok(copy),
            Err(WaitError::TimedOut) => Err(ClientError::RequestTimedOut {
                id: item_id,
                to: service,
                timeout_ms: timeout.as_millis() as u64,
            }),
            Err(WaitError::Cancelled) => Err(ClientError::Connection("echo wait cancelled".into())),
        }
    }

    /// Replay the outbound queue of the current user.
    ///
    /// Entries go out one at a time in the order they were queued and are
    /// removed only once acknowledged. A rejected entry stays queued and the
    /// pass continues; a timeout or lost link stops the pass, leaving that
    /// entry and all later ones queued in order.
    pub async fn replay_queue(&self) -> ClientResult<ReplayReport> {
        self.inner.replay_queue().await
    }

    /// Cached objects of a handled space, in arrival order.
    pub async fn retrieve_cached(
        &self,
        space_id: &str,
        filter: Option<&dyn DataObjectFilter>,
    ) -> ClientResult<Vec<DataObject>> {
        let node = match self.inner.handled.get(space_id) {
            Some(handled) => handled.node.clone(),
            None => self
                .inner
                .spaces
                .get(space_id)
                .await?
                .and_then(|s| s.pubsub_node().map(str::to_string))
                .ok_or_else(|| ClientError::UnknownSpace(space_id.to_string()))?,
        };
        Ok(self
            .inner
            .store
            .items_by_node(&node)
            .await?
            .into_iter()
            .map(|item| item.payload)
            .filter(|object| filter.is_none_or(|f| f.accepts(object)))
            .collect())
    }

    /// Number of queued publishes for the current user.
    pub async fn queued_count(&self) -> ClientResult<usize> {
        let user = self.inner.session().current_user();
        Ok(self.inner.store.queued_for(&user).await?.len())
    }

    /// Drop every queued publish of the current user without sending it.
    pub async fn discard_queue(&self) -> ClientResult<u64> {
        let user = self.inner.session().current_user();
        let discarded = self.inner.store.clear_queue(&user).await?;
        info!(user = %user, discarded, "outbound queue discarded");
        Ok(discarded)
    }

    /// Whether an item with this id is in the cache.
    pub async fn is_cached(&self, item_id: &str) -> ClientResult<bool> {
        Ok(self.inner.store.contains_item(item_id).await?)
    }

    /// Purge the item cache. Handled spaces stay registered.
    pub async fn clear_cache(&self) -> ClientResult<u64> {
        let purged = self.inner.store.delete_all_items().await?;
        info!(purged, "item cache cleared");
        Ok(purged)
    }

    /// Move the engine to another session.
    ///
    /// Listeners leave the old session's transport, handled spaces are kept
    /// and subscribed again through the new session once it is online. The
    /// old session is left as it is.
    pub async fn change_session(&self, session: Session) {
        {
            let mut watch = self.session_watch.lock();
            let previous = self.inner.session.read().clone();
            previous.remove_observer(*watch);
            *watch = session.add_observer(Arc::new(SessionWatch(Arc::downgrade(&self.inner))));
        }
        *self.inner.session.write() = session.clone();
        self.inner.spaces.change_session(session.clone());
        self.inner.channels.rebind(&session);
        for mut space in self.inner.handled.iter_mut() {
            space.subscribed = false;
        }
        self.inner.needs_resubscribe.store(true, Ordering::SeqCst);
        info!(user = %session.current_user(), state = %session.state(), "session changed");
        if self.inner.mode.is_online() {
            self.inner.go_online().await;
        }
    }
}

impl Drop for DataExchangeEngine {
    fn drop(&mut self) {
        self.delivery.abort();
        self.inner
            .session()
            .remove_observer(*self.session_watch.get_mut());
    }
}

impl EngineInner {
    fn session(&self) -> Session {
        self.session.read().clone()
    }

    fn release_if_unused(&self, service: &str) {
        let in_use = self
            .handled
            .iter()
            .any(|h| jid::same_entity(&h.service, service));
        if !in_use {
            self.channels.release(service);
        }
    }

    async fn publish_online(&self, space_id: &str, object: DataObject) -> ClientResult<String> {
        let item_id = uuid::Uuid::new_v4().to_string();
        self.publish_item(space_id, item_id, object).await
    }

    async fn publish_item(
        &self,
        space_id: &str,
        item_id: String,
        object: DataObject,
    ) -> ClientResult<String> {
        let (node, service) = self
            .handled
            .get(space_id)
            .map(|h| (h.node.clone(), h.service.clone()))
            .ok_or_else(|| ClientError::UnknownSpace(space_id.to_string()))?;
        let handle = self.channels.ensure(&service);
        let acknowledged = handle
            .publish(
                &node,
                PubSubItem {
                    id: Some(item_id),
                    payload: Some(object),
                },
            )
            .await?;
        debug!(space_id = %space_id, item_id = %acknowledged, "published");
        Ok(acknowledged)
    }

    /// Subscribe what is pending and replay the queue.
    async fn go_online(&self) {
        if self.needs_resubscribe.swap(false, Ordering::SeqCst) {
            self.channels.rebind(&self.session());
            self.refresh_handled().await;
        }
        self.subscribe_pending().await;
        match self.replay_queue().await {
            Ok(report) if report == ReplayReport::default() => {}
            Ok(report) => info!(
                sent = report.sent,
                failed = report.failed,
                remaining = report.remaining,
                "outbound queue replayed"
            ),
            Err(e) => warn!(error = %e, code = e.error_code(), "queue replay failed"),
        }
    }

    /// Reload channel metadata of every handled space.
    async fn refresh_handled(&self) {
        let ids: Vec<String> = self.handled.iter().map(|e| e.key().clone()).collect();
        for space_id in ids {
            let space = match self.spaces.get(&space_id).await {
                Ok(Some(space)) => space,
                Ok(None) => {
                    warn!(space_id = %space_id, "handled space no longer available");
                    continue;
                }
                Err(e) => {
                    warn!(space_id = %space_id, error = %e, "failed to refresh space");
                    continue;
                }
            };
            let Ok(fresh) = HandledSpace::from_space(&space) else {
                warn!(space_id = %space_id, "refreshed space lost its pubsub channel");
                continue;
            };
            let previous = self.handled.insert(space_id.clone(), fresh.clone());
            if let Some(previous) = previous
                && !jid::same_entity(&previous.service, &fresh.service)
            {
                self.release_if_unused(&previous.service);
            }
            self.channels.ensure(&fresh.service);
        }
    }

    async fn subscribe_pending(&self) {
        let pending: Vec<HandledSpace> = self
            .handled
            .iter()
            .filter(|h| !h.subscribed)
            .map(|h| h.value().clone())
            .collect();
        for space in pending {
            let handle = self.channels.ensure(&space.service);
            match handle.subscribe(&space.node).await {
                Ok(()) => {
                    if let Some(mut handled) = self.handled.get_mut(&space.space_id) {
                        handled.subscribed = true;
                    }
                    debug!(space_id = %space.space_id, "subscribed");
                }
                Err(e) => {
                    warn!(space_id = %space.space_id, error = %e, code = e.error_code(), "subscribe failed")
                }
            }
        }
    }

    async fn replay_queue(&self) -> ClientResult<ReplayReport> {
        let _guard = self.replay_lock.lock().await;
        if !self.mode.is_online() {
            return Err(ClientError::RequiresOnline);
        }
        let user = self.session().current_user();
        let span = spans::replay(&user);
        async {
            let entries = self.store.queued_for(&user).await?;
            let mut report = ReplayReport::default();
            let total = entries.len();
            for (index, entry) in entries.into_iter().enumerate() {
                if !self.mode.is_online() {
                    info!("went offline during replay");
                    report.remaining = total - index;
                    break;
                }
                match self.publish_online(&entry.space_id, entry.payload).await {
                    Ok(item_id) => {
                        report.sent += 1;
                        trace!(local_id = %entry.local_id, item_id = %item_id, "replayed");
                        if let Err(e) = self.store.dequeue(&entry.local_id).await {
                            warn!(local_id = %entry.local_id, error = %e, "failed to dequeue replayed entry");
                        }
                    }
                    Err(e) if stops_replay(&e) => {
                        warn!(local_id = %entry.local_id, error = %e, "replay stopped");
                        report.failed += 1;
                        report.remaining = total - index - 1;
                        break;
                    }
                    Err(e) => {
                        warn!(local_id = %entry.local_id, space_id = %entry.space_id, error = %e, code = e.error_code(), "replay of entry failed");
                        report.failed += 1;
                    }
                }
            }
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Entry point for notifications on registered channels.
    async fn on_incoming(&self, event: PubSubEvent) {
        let Some((space_id, service)) = self
            .handled
            .iter()
            .find(|h| h.node == event.node && jid::same_entity(&h.service, &event.from))
            .map(|h| (h.space_id.clone(), h.service.clone()))
        else {
            trace!(node = %event.node, from = %event.from, "notification for unhandled node");
            return;
        };

        for item in event.items {
            let Some(item_id) = item.id else {
                debug!(node = %event.node, "dropping item without id");
                continue;
            };
            let span = spans::delivery(&event.node, &item_id);
            async {
                let payload = match item.payload {
                    Some(payload) => Some(payload),
                    None => {
                        if self.is_cached(&item_id).await {
                            trace!("announced item already cached");
                            None
                        } else {
                            self.fetch_missing(&service, &event.node, &item_id).await
                        }
                    }
                };
                if let Some(payload) = payload {
                    self.ingest(&space_id, &event.node, &item_id, payload).await;
                }
            }
            .instrument(span)
            .await;
        }
    }

    async fn is_cached(&self, item_id: &str) -> bool {
        match self.store.contains_item(item_id).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "cache lookup failed");
                false
            }
        }
    }

    /// Fetch the payload of an item announced without one.
    async fn fetch_missing(&self, service: &str, node: &str, item_id: &str) -> Option<DataObject> {
        if !self.pending_fetches.insert(item_id.to_string()) {
            debug!("fetch already pending");
            return None;
        }
        let handle = self.channels.ensure(service);
        let outcome = handle.fetch(node, &[item_id.to_string()]).await;
        self.pending_fetches.remove(item_id);
        match outcome {
            Ok(items) => {
                let payload = items
                    .into_iter()
                    .find(|i| i.id.as_deref() == Some(item_id))
                    .and_then(|i| i.payload);
                if payload.is_none() {
                    debug!("fetched item carried no payload");
                }
                payload
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "fetch by id failed");
                None
            }
        }
    }

    async fn ingest(&self, space_id: &str, node: &str, item_id: &str, payload: DataObject) {
        let cached = CachedItem::new(item_id, node, payload.clone());
        match self.store.insert_item(&cached).await {
            Ok(true) => {}
            Ok(false) => {
                trace!("duplicate delivery");
                return;
            }
            Err(e) => warn!(error = %e, "cache write failed"),
        }

        if let Some(waiter) = self.echo_waiters.get(item_id) {
            waiter.resolve(payload.clone());
        }

        let filter = self.filter.read().clone();
        if let Some(filter) = filter
            && !filter.accepts(&payload)
        {
            debug!("item rejected by filter");
            return;
        }
        for observer in self.observers.snapshot() {
            observer.on_item(&payload, space_id);
        }
    }
}

/// Failures after which the rest of a replay pass cannot succeed either.
fn stops_replay(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::RequestTimedOut { .. }
            | ClientError::Transport(_)
            | ClientError::Connection(_)
            | ClientError::RequiresOnline
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacelink_proto::SpaceChannel;
    use std::collections::{BTreeMap, BTreeSet};

    #[test]
    fn link_failures_stop_replay() {
        assert!(stops_replay(&ClientError::RequestTimedOut {
            id: "1".into(),
            to: "pubsub".into(),
            timeout_ms: 10
        }));
        assert!(!stops_replay(&ClientError::Rejected("no".into())));
        assert!(!stops_replay(&ClientError::UnknownSpace("x".into())));
    }

    #[test]
    fn handled_space_needs_pubsub_channel() {
        let mut space = Space {
            id: "s1".into(),
            name: "s1".into(),
            domain: "spaces.example.org".into(),
            space_type: spacelink_proto::SpaceType::Private,
            channels: Vec::new(),
            members: BTreeMap::new(),
            persistence: Persistence::Off,
            data_models: BTreeSet::new(),
        };
        assert!(matches!(
            HandledSpace::from_space(&space),
            Err(ClientError::UnknownEntity(_))
        ));
        space
            .channels
            .push(SpaceChannel::pubsub("spaces#s1", "pubsub.example.org"));
        let handled = HandledSpace::from_space(&space).unwrap();
        assert_eq!(handled.node, "spaces#s1");
        assert_eq!(handled.service, "pubsub.example.org");
        assert!(!handled.subscribed);
    }
}
