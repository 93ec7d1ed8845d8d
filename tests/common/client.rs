//! Test client assembly and observers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use spacelink::Client;
use spacelink::data::DataObserver;
use spacelink::net::MemoryTransport;
use spacelink::proto::{DataObject, DataObjectBuilder};
use spacelink::session::{SessionEvent, SessionObserver, SessionSettings, SessionState};
use spacelink::store::{LocalStore, MemoryStore};

use super::server::{DOMAIN, TestServer};

pub const ALICE: &str = "alice";
pub const PASSWORD: &str = "secret";

/// Settings with short timeouts so failure paths finish quickly.
pub fn settings(username: &str, password: &str) -> SessionSettings {
    let mut settings = SessionSettings::new(DOMAIN, username, password);
    settings.request_timeout = Duration::from_millis(300);
    settings.discovery_timeout = Duration::from_millis(500);
    settings
}

/// A client wired to a [`TestServer`] with a memory store.
pub struct TestClient {
    pub client: Client,
    pub store: Arc<MemoryStore>,
    pub items: Arc<ItemRecorder>,
    pub states: Arc<StateRecorder>,
}

impl TestClient {
    pub fn new(transport: MemoryTransport, settings: SessionSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let client = Client::new(
            settings,
            Arc::new(transport),
            store.clone() as Arc<dyn LocalStore>,
        );
        let items = Arc::new(ItemRecorder::default());
        client.data.add_observer(items.clone());
        let states = Arc::new(StateRecorder::default());
        client.session.add_observer(states.clone());
        Self {
            client,
            store,
            items,
            states,
        }
    }
}

/// Server with an `alice` account and a client for it, not yet connected.
pub fn setup() -> (TestServer, TestClient) {
    let (server, transport) = TestServer::spawn();
    server.add_account(ALICE, PASSWORD);
    let client = TestClient::new(transport, settings(ALICE, PASSWORD));
    (server, client)
}

/// Same as [`setup`], connected.
pub async fn connected() -> (TestServer, TestClient) {
    let (server, client) = setup();
    client.client.connect().await.expect("connect");
    (server, client)
}

/// Bare address of a test account.
pub fn address(username: &str) -> String {
    format!("{}@{}", username, DOMAIN)
}

/// A stamped data object with a fixed id.
pub fn object(id: &str) -> DataObject {
    DataObjectBuilder::new("mood", "mirror:application:moodmap:mood")
        .attribute("id", id)
        .attribute("modelVersion", "1.0")
        .content(format!("<mood>{}</mood>", id))
        .stamp()
        .build()
}

/// Records delivered objects in order.
#[derive(Default)]
pub struct ItemRecorder {
    seen: Mutex<Vec<(String, DataObject)>>,
}

impl ItemRecorder {
    pub fn ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter_map(|(_, o)| o.id().map(str::to_string))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn spaces(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(s, _)| s.clone()).collect()
    }
}

impl DataObserver for ItemRecorder {
    fn on_item(&self, object: &DataObject, space_id: &str) {
        self.seen
            .lock()
            .push((space_id.to_string(), object.clone()));
    }
}

/// Records session transitions in order.
#[derive(Default)]
pub struct StateRecorder {
    seen: Mutex<Vec<SessionEvent>>,
}

impl StateRecorder {
    pub fn states(&self) -> Vec<SessionState> {
        self.seen.lock().iter().map(|e| e.current).collect()
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}

#[async_trait]
impl SessionObserver for StateRecorder {
    async fn on_state_changed(&self, event: &SessionEvent) {
        self.seen.lock().push(*event);
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
