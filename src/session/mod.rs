//! Client session: connection lifecycle, authentication and discovery.
//!
//! A [`Session`] owns the transport and the registry of outstanding
//! requests. It moves through [`SessionState`]s in response to its own
//! operations and to link events reported by the transport, and notifies
//! [`SessionObserver`]s of every change, one after another.

mod discovery;
mod observer;
mod state;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use spacelink_proto::jid;
use spacelink_proto::stanza::ErrorCondition;
use spacelink_proto::{Iq, IqKind, Payload, Stanza};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};
use zeroize::Zeroizing;

pub use discovery::{NetworkInfo, PERSISTENCE_SERVICE_NAME, SPACES_SERVICE_NAME};
pub use observer::SessionObserver;
pub use state::{SessionEvent, SessionState, link_event_applies, state_for_link_event};

use crate::error::{ClientError, ClientResult};
use crate::net::{
    InterceptorId, LinkEvent, ListenerId, StanzaFilter, StanzaInterceptor, StanzaListener,
    Transport,
};
use crate::observer::{ObserverId, ObserverSet};
use crate::request::{CorrelationIds, PendingRequests, WaitError};
use crate::telemetry::spans;

/// Account and timing parameters of a session.
#[derive(Clone)]
pub struct SessionSettings {
    pub domain: String,
    pub username: String,
    pub password: Zeroizing<String>,
    pub resource: String,
    /// Register the account during connect if it does not exist.
    pub create_account: bool,
    pub request_timeout: Duration,
    /// Upper bound for service discovery after login.
    pub discovery_timeout: Duration,
}

impl SessionSettings {
    pub fn new(
        domain: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            username: username.into(),
            password: Zeroizing::new(password.into()),
            resource: "spacelink".to_string(),
            create_account: false,
            request_timeout: PendingRequests::DEFAULT_TIMEOUT,
            discovery_timeout: Duration::from_secs(2),
        }
    }

    /// Bare address of the account.
    pub fn user(&self) -> String {
        jid::join(&self.username, &self.domain)
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("resource", &self.resource)
            .field("create_account", &self.create_account)
            .field("request_timeout", &self.request_timeout)
            .field("discovery_timeout", &self.discovery_timeout)
            .finish()
    }
}

/// Routes inbound replies to their waiters.
struct ReplyDispatcher(Arc<PendingRequests>);

impl StanzaListener for ReplyDispatcher {
    fn on_stanza(&self, stanza: &Stanza) {
        if let Some(iq) = stanza.as_iq() {
            self.0.dispatch(iq);
        }
    }
}

/// Stamps the bound address on outbound requests that carry none.
struct SenderStamp(Arc<RwLock<Option<String>>>);

impl StanzaInterceptor for SenderStamp {
    fn intercept(&self, stanza: &mut Stanza) {
        if let Stanza::Iq(iq) = stanza
            && iq.from.is_none()
        {
            iq.from = self.0.read().clone();
        }
    }
}

struct SessionInner {
    settings: SessionSettings,
    transport: Arc<dyn Transport>,
    state: RwLock<SessionState>,
    /// Serializes state changes together with their notification.
    transitions: tokio::sync::Mutex<()>,
    observers: ObserverSet<dyn SessionObserver>,
    pending: Arc<PendingRequests>,
    network: RwLock<NetworkInfo>,
    bound: Arc<RwLock<Option<String>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    reply_listener: ListenerId,
    stamp: InterceptorId,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        self.transport.remove_listener(self.reply_listener);
        self.transport.remove_interceptor(self.stamp);
        self.pending.cancel_all();
    }
}

/// Handle to a client session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(settings: SessionSettings, transport: Arc<dyn Transport>) -> Self {
        let pending = Arc::new(PendingRequests::new(
            CorrelationIds::random(),
            settings.request_timeout,
        ));
        let bound = Arc::new(RwLock::new(None));
        let reply_listener = transport.add_listener(
            StanzaFilter::replies(),
            Arc::new(ReplyDispatcher(pending.clone())),
        );
        let stamp = transport.add_interceptor(Arc::new(SenderStamp(bound.clone())));
        Self {
            inner: Arc::new(SessionInner {
                settings,
                transport,
                state: RwLock::new(SessionState::Offline),
                transitions: tokio::sync::Mutex::new(()),
                observers: ObserverSet::new(),
                pending,
                network: RwLock::new(NetworkInfo::default()),
                bound,
                pump: Mutex::new(None),
                reply_listener,
                stamp,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.inner.settings
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }

    /// Services found by the last discovery.
    pub fn network_info(&self) -> NetworkInfo {
        self.inner.network.read().clone()
    }

    /// Bare address of the account.
    pub fn current_user(&self) -> String {
        self.inner.settings.user()
    }

    /// Full address bound at login.
    pub fn bound_address(&self) -> Option<String> {
        self.inner.bound.read().clone()
    }

    /// Number of requests waiting for a reply.
    pub fn outstanding_requests(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn add_observer(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        self.inner.observers.add(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Connect, optionally register, log in and discover services.
    ///
    /// Legal from `Offline` and `Error`; anything else fails with
    /// [`ClientError::AlreadyConnected`]. On failure the session ends in
    /// `Error`. Account creation failures keep their own error; link and
    /// login failures are [`ClientError::Connection`].
    pub async fn connect(&self) -> ClientResult<()> {
        let span = spans::connect(&self.inner.settings.username, &self.inner.settings.domain);
        self.connect_inner().instrument(span).await
    }

    async fn connect_inner(&self) -> ClientResult<()> {
        if let Err(current) = self
            .transition_if(SessionState::can_connect, SessionState::Pending)
            .await
        {
            debug!(state = %current, "connect refused");
            return Err(ClientError::AlreadyConnected);
        }
        self.ensure_pump();

        if let Err(e) = self.inner.transport.connect().await {
            warn!(error = %e, "transport connect failed");
            self.set_state(SessionState::Error).await;
            return Err(ClientError::Connection(e.to_string()));
        }

        if self.inner.settings.create_account {
            match self.register_account().await {
                Ok(()) => info!(user = %self.current_user(), "account created"),
                Err(ClientError::AccountExists(_)) => debug!("account already exists"),
                Err(e) => return Err(self.fail_connect(e).await),
            }
        }

        if let Err(e) = self.login().await {
            return Err(self.fail_connect(e).await);
        }

        self.discover().await;
        self.set_state(SessionState::Online).await;
        info!(address = ?self.bound_address(), "session online");
        Ok(())
    }

    async fn fail_connect(&self, err: ClientError) -> ClientError {
        warn!(error = %err, code = err.error_code(), "connect failed");
        self.inner.transport.disconnect().await;
        self.inner.pending.cancel_all();
        self.set_state(SessionState::Error).await;
        match err {
            ClientError::Connection(_)
            | ClientError::UnsupportedByServer(_)
            | ClientError::InvalidRequest(_)
            | ClientError::AccountExists(_) => err,
            other => ClientError::Connection(other.to_string()),
        }
    }

    /// Close the link. A no-op when already offline.
    ///
    /// Outstanding requests are cancelled.
    pub async fn disconnect(&self) {
        if self.state() == SessionState::Offline {
            return;
        }
        self.set_state(SessionState::Pending).await;
        self.inner.transport.disconnect().await;
        let cancelled = self.inner.pending.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "cancelled outstanding requests");
        }
        *self.inner.bound.write() = None;
        self.set_state(SessionState::Offline).await;
        info!("session offline");
    }

    /// Register the configured account.
    ///
    /// Opens the link if needed and closes it again if it was opened here.
    pub async fn create_account(&self) -> ClientResult<()> {
        let opened = !self.inner.transport.is_connected();
        if opened {
            self.inner
                .transport
                .connect()
                .await
                .map_err(|e| ClientError::Connection(e.to_string()))?;
        }
        let outcome = self.register_account().await;
        if opened && self.state() == SessionState::Offline {
            self.inner.transport.disconnect().await;
        }
        outcome
    }

    async fn register_account(&self) -> ClientResult<()> {
        let domain = self.inner.settings.domain.clone();
        let reply = self
            .request(IqKind::Get, &domain, Payload::RegistrationQuery)
            .await?;
        match reply.into_result() {
            Ok(Payload::RegistrationInfo { supported: true }) => {}
            Ok(_) => {
                return Err(ClientError::UnsupportedByServer(
                    "in-band registration".into(),
                ));
            }
            Err(err) => return Err(ClientError::UnsupportedByServer(err.to_string())),
        }

        let reply = self
            .request(
                IqKind::Set,
                &domain,
                Payload::Register {
                    username: self.inner.settings.username.clone(),
                    password: self.inner.settings.password.to_string(),
                },
            )
            .await?;
        match reply.into_result() {
            Ok(_) => Ok(()),
            Err(err) => Err(match err.condition {
                ErrorCondition::Conflict => ClientError::AccountExists(self.current_user()),
                ErrorCondition::NotAcceptable | ErrorCondition::BadRequest => {
                    ClientError::InvalidRequest(err.to_string())
                }
                _ => ClientError::from_stanza_error(&err),
            }),
        }
    }

    async fn login(&self) -> ClientResult<()> {
        let settings = &self.inner.settings;
        let reply = self
            .request(
                IqKind::Set,
                &settings.domain,
                Payload::Login {
                    username: settings.username.clone(),
                    password: settings.password.to_string(),
                    resource: settings.resource.clone(),
                },
            )
            .await?;
        match reply.into_result() {
            Ok(Payload::LoginResult { address }) => {
                debug!(address = %address, "logged in");
                *self.inner.bound.write() = Some(address);
                Ok(())
            }
            Ok(other) => Err(ClientError::Connection(format!(
                "unexpected login reply: {:?}",
                other
            ))),
            Err(err) => Err(ClientError::Connection(err.to_string())),
        }
    }

    /// Discover services, bounded by the discovery timeout.
    ///
    /// Failure or timeout is logged and leaves whatever was found so far.
    async fn discover(&self) {
        *self.inner.network.write() = NetworkInfo::default();
        let budget = self.inner.settings.discovery_timeout;
        match tokio::time::timeout(budget, self.discover_services()).await {
            Ok(Ok(())) => {
                let info = self.network_info();
                info!(
                    spaces = ?info.spaces_service,
                    version = ?info.spaces_version,
                    persistence = ?info.persistence_service,
                    "service discovery finished"
                );
            }
            Ok(Err(e)) => warn!(error = %e, code = e.error_code(), "service discovery failed"),
            Err(_) => warn!(budget_ms = budget.as_millis() as u64, "service discovery timed out"),
        }
    }

    async fn discover_services(&self) -> ClientResult<()> {
        let domain = self.inner.settings.domain.clone();
        let reply = self
            .request(IqKind::Get, &domain, Payload::DiscoItems { node: None })
            .await?;
        let items = match reply.into_result() {
            Ok(Payload::DiscoItemsResult { items }) => items,
            Ok(_) => Vec::new(),
            Err(err) => return Err(ClientError::from_stanza_error(&err)),
        };
        for item in &items {
            if let Some(name) = &item.name {
                self.inner.network.write().record(name, &item.address);
            }
        }

        let spaces = self.inner.network.read().spaces_service.clone();
        if let Some(spaces) = spaces {
            let reply = self
                .request(IqKind::Get, &spaces, Payload::SpacesVersion)
                .await?;
            match reply.into_result() {
                Ok(Payload::SpacesVersionResult { version }) => {
                    self.inner.network.write().spaces_version = Some(version);
                }
                Ok(_) => debug!("spaces service sent no version"),
                Err(err) => debug!(error = %err, "spaces version query failed"),
            }
        }
        Ok(())
    }

    /// Send a request and wait for its reply with the default timeout.
    pub async fn request(&self, kind: IqKind, to: &str, payload: Payload) -> ClientResult<Iq> {
        self.request_with_timeout(kind, to, payload, self.inner.pending.timeout())
            .await
    }

    /// Send a request and wait at most `timeout` for its reply.
    ///
    /// The pending entry is registered before the send. A reply arriving
    /// after the timeout is dropped.
    pub async fn request_with_timeout(
        &self,
        kind: IqKind,
        to: &str,
        payload: Payload,
        timeout: Duration,
    ) -> ClientResult<Iq> {
        let pending = &self.inner.pending;
        let (id, future) = pending.register();
        let span = spans::request(&id, to, kind.as_str());
        async {
            let iq = Iq {
                id: id.clone(),
                kind,
                from: None,
                to: Some(to.to_string()),
                payload,
            };
            if let Err(e) = self.inner.transport.send(Stanza::Iq(iq)).await {
                pending.cancel(&id);
                return Err(ClientError::Transport(e));
            }
            match pending.wait(&id, &future, timeout).await {
                Ok(reply) => Ok(reply),
                Err(WaitError::TimedOut) => {
                    debug!(timeout_ms = timeout.as_millis() as u64, "request timed out");
                    Err(ClientError::RequestTimedOut {
                        id: id.clone(),
                        to: to.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
                Err(WaitError::Cancelled) => {
                    Err(ClientError::Connection("request cancelled".into()))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn set_state(&self, next: SessionState) {
        let _ = self.transition_if(|_| true, next).await;
    }

    /// Move to `next` if `allowed` accepts the current state, then notify
    /// observers. Same-state transitions are silent.
    async fn transition_if(
        &self,
        allowed: impl Fn(SessionState) -> bool,
        next: SessionState,
    ) -> Result<(), SessionState> {
        let _guard = self.inner.transitions.lock().await;
        let previous = {
            let mut state = self.inner.state.write();
            let previous = *state;
            if !allowed(previous) {
                return Err(previous);
            }
            *state = next;
            previous
        };
        if previous == next {
            return Ok(());
        }
        debug!(from = %previous, to = %next, "session state changed");
        let event = SessionEvent {
            previous,
            current: next,
        };
        for observer in self.inner.observers.snapshot() {
            observer.on_state_changed(&event).await;
        }
        Ok(())
    }

    /// Spawn the task that turns link events into state changes.
    fn ensure_pump(&self) {
        let mut pump = self.inner.pump.lock();
        if pump.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let mut events = self.inner.transport.link_events();
        let weak = Arc::downgrade(&self.inner);
        *pump = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else { break };
                        Session { inner }.on_link_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "link events lagged");
                        let Some(inner) = weak.upgrade() else { break };
                        Session { inner }.resync_with_link().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Bring the state back in line with the link after missed events.
    async fn resync_with_link(&self) {
        let connected = self.inner.transport.is_connected();
        match (self.state(), connected) {
            (SessionState::Online, false) => {
                self.on_link_event(LinkEvent::ClosedOnError("link events missed".into()))
                    .await
            }
            (SessionState::Error, true) => self.on_link_event(LinkEvent::ReconnectSucceeded).await,
            (state, connected) => debug!(state = %state, connected, "state matches link"),
        }
    }

    async fn on_link_event(&self, event: LinkEvent) {
        let current = self.state();
        if !link_event_applies(current, &event) {
            debug!(?event, state = %current, "ignoring link event");
            return;
        }
        match event {
            LinkEvent::ReconnectSucceeded => {
                info!("link restored, logging in again");
                self.set_state(SessionState::Pending).await;
                match self.login().await {
                    Ok(()) => {
                        if self.network_info() == NetworkInfo::default() {
                            self.discover().await;
                        }
                        self.set_state(SessionState::Online).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "login after reconnect failed");
                        self.set_state(SessionState::Error).await;
                    }
                }
            }
            other => {
                if let LinkEvent::ClosedOnError(reason) = &other {
                    warn!(reason = %reason, "link lost");
                    self.inner.pending.cancel_all();
                }
                self.set_state(state_for_link_event(&other)).await;
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.current_user())
            .field("state", &self.state())
            .finish()
    }
}
