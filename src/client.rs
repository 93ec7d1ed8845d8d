//! Wiring of session, engines and store.

use std::sync::Arc;

use crate::config::Config;
use crate::data::DataExchangeEngine;
use crate::error::ClientResult;
use crate::net::{TcpTransport, Transport};
use crate::session::{Session, SessionSettings};
use crate::spaces::SpaceMembershipEngine;
use crate::store::{LocalStore, SqliteStore};

/// A session with both engines attached to one store.
pub struct Client {
    pub session: Session,
    pub spaces: Arc<SpaceMembershipEngine>,
    pub data: DataExchangeEngine,
}

impl Client {
    /// Assemble a client. Needs a tokio runtime.
    pub fn new(
        settings: SessionSettings,
        transport: Arc<dyn Transport>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let session = Session::new(settings, transport);
        let spaces = Arc::new(SpaceMembershipEngine::new(session.clone(), store.clone()));
        let data = DataExchangeEngine::new(session.clone(), spaces.clone(), store);
        Self {
            session,
            spaces,
            data,
        }
    }

    /// Build a client over TCP with the SQLite store named in `config`.
    pub async fn from_config(config: &Config) -> ClientResult<Self> {
        let store = SqliteStore::open(&config.store.path).await?;
        let transport = TcpTransport::new(config.tcp_settings());
        Ok(Self::new(
            config.session_settings(),
            Arc::new(transport),
            Arc::new(store),
        ))
    }

    pub async fn connect(&self) -> ClientResult<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await
    }

    /// Move both engines to `session` and return the previous one, left as
    /// it was.
    pub async fn change_session(&mut self, session: Session) -> Session {
        self.data.change_session(session.clone()).await;
        std::mem::replace(&mut self.session, session)
    }
}
