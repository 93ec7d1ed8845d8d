//! TCP transport with optional TLS and automatic reconnection.
//!
//! One supervisor task per connection owns the read half and, when the link
//! drops unexpectedly, runs the reconnect loop. A writer task per link drains
//! the outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use spacelink_proto::{Stanza, StanzaCodec};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::stream::ClientStream;
use super::tls::upgrade_to_tls;
use super::{
    InterceptorId, LinkEvent, ListenerId, ListenerSet, StanzaFilter, StanzaInterceptor,
    StanzaListener, Transport, TransportError,
};

type Link = Framed<ClientStream, StanzaCodec>;

/// Outbound queue depth per link.
const OUTBOUND_CAPACITY: usize = 256;

/// Automatic reconnection after an unexpected link loss.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `attempt` (0-based), doubling up to `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct TcpSettings {
    pub host: String,
    pub port: u16,
    pub secure: bool,
    pub accept_self_signed: bool,
    pub max_frame: usize,
    pub reconnect: ReconnectPolicy,
}

struct Shared {
    settings: TcpSettings,
    listeners: ListenerSet,
    events: broadcast::Sender<LinkEvent>,
    outbound: Mutex<Option<mpsc::Sender<Stanza>>>,
    connected: AtomicBool,
    shutdown: Mutex<Option<CancellationToken>>,
}

/// A transport speaking line-delimited JSON stanzas over TCP.
#[derive(Clone)]
pub struct TcpTransport {
    shared: Arc<Shared>,
}

impl TcpTransport {
    pub fn new(settings: TcpSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                settings,
                listeners: ListenerSet::new(),
                events,
                outbound: Mutex::new(None),
                connected: AtomicBool::new(false),
                shutdown: Mutex::new(None),
            }),
        }
    }
}

impl Shared {
    fn emit(&self, event: LinkEvent) {
        let _ = self.events.send(event);
    }

    async fn open(&self) -> Result<Link, TransportError> {
        let settings = &self.settings;
        info!(host = %settings.host, port = settings.port, tls = settings.secure, "Connecting to server");
        let tcp = TcpStream::connect((settings.host.as_str(), settings.port)).await?;
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let stream = if settings.secure {
            let tls = upgrade_to_tls(tcp, &settings.host, settings.accept_self_signed).await?;
            ClientStream::Tls(Box::new(tls))
        } else {
            ClientStream::Plain(tcp)
        };
        Ok(Framed::new(stream, StanzaCodec::with_max_len(settings.max_frame)))
    }

    /// Make `link` the active link and spawn its writer. Returns the read half.
    fn install(&self, link: Link) -> SplitStream<Link> {
        let (sink, stream) = link.split();
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        tokio::spawn(write_loop(sink, rx));
        *self.outbound.lock() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        stream
    }

    fn uninstall(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // Dropping the sender ends the writer task.
        self.outbound.lock().take();
    }

    /// Read until the link ends. `None` means it was closed on request.
    async fn read_loop(
        &self,
        mut stream: SplitStream<Link>,
        shutdown: &CancellationToken,
    ) -> Option<String> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                frame = stream.next() => match frame {
                    Some(Ok(stanza)) => {
                        self.listeners.dispatch(&stanza);
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Inbound stream failed");
                        return Some(e.to_string());
                    }
                    None => return Some("connection closed by server".to_string()),
                }
            }
        }
    }

    /// Try to get a new link, emitting reconnect events. `None` if given up or shut down.
    async fn reconnect(&self, shutdown: &CancellationToken) -> Option<SplitStream<Link>> {
        let policy = &self.settings.reconnect;
        for attempt in 0..policy.max_attempts {
            let delay = policy.delay_for(attempt);
            self.emit(LinkEvent::ReconnectingIn(delay.as_secs()));
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            match self.open().await {
                Ok(link) => {
                    if shutdown.is_cancelled() {
                        return None;
                    }
                    let stream = self.install(link);
                    info!(attempt = attempt + 1, "Reconnected");
                    self.emit(LinkEvent::ReconnectSucceeded);
                    return Some(stream);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Reconnect attempt failed");
                    self.emit(LinkEvent::ReconnectFailed(e.to_string()));
                }
            }
        }
        warn!(attempts = policy.max_attempts, "Giving up on reconnection");
        self.emit(LinkEvent::ReconnectAbandoned(policy.max_attempts));
        None
    }
}

async fn write_loop(mut sink: SplitSink<Link, Stanza>, mut rx: mpsc::Receiver<Stanza>) {
    while let Some(stanza) = rx.recv().await {
        if let Err(e) = sink.send(stanza).await {
            warn!(error = %e, "Outbound stream failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn supervise(shared: Arc<Shared>, first: SplitStream<Link>, shutdown: CancellationToken) {
    let mut stream = Some(first);
    while let Some(current) = stream.take() {
        let failure = shared.read_loop(current, &shutdown).await;
        shared.uninstall();
        let Some(reason) = failure else {
            shared.emit(LinkEvent::Closed);
            return;
        };
        shared.emit(LinkEvent::ClosedOnError(reason));
        if shared.settings.reconnect.enabled {
            stream = shared.reconnect(&shutdown).await;
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }
        let link = self.shared.open().await?;
        let token = CancellationToken::new();
        if let Some(previous) = self.shared.shutdown.lock().replace(token.clone()) {
            // Stop a supervisor still trying to reconnect.
            previous.cancel();
        }
        let stream = self.shared.install(link);
        tokio::spawn(supervise(self.shared.clone(), stream, token));
        Ok(())
    }

    async fn disconnect(&self) {
        let token = self.shared.shutdown.lock().take();
        if let Some(token) = token {
            token.cancel();
        }
        self.shared.uninstall();
    }

    async fn send(&self, mut stanza: Stanza) -> Result<(), TransportError> {
        self.shared.listeners.intercept(&mut stanza);
        let tx = self.shared.outbound.lock().clone();
        match tx {
            Some(tx) => tx
                .send(stanza)
                .await
                .map_err(|_| TransportError::NotConnected),
            None => Err(TransportError::NotConnected),
        }
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
