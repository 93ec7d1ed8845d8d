//! Space lifecycle and membership.
//!
//! Writes go to the spaces service and need the effective mode to be
//! online. Reads go to the service when online and refresh the local
//! snapshot; offline they are answered from the snapshot of the current
//! user.

use std::collections::BTreeMap;
use std::sync::Arc;

use spacelink_proto::stanza::ErrorCondition;
use spacelink_proto::{
    DataModel, IqKind, Payload, Space, SpaceChannel, SpaceConfiguration, SpaceType,
};
use parking_lot::RwLock;
use tracing::{Instrument, debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::mode::ModeTracker;
use crate::session::Session;
use crate::store::LocalStore;
use crate::telemetry::spans;

/// Creates, configures, deletes and lists spaces.
pub struct SpaceMembershipEngine {
    session: RwLock<Session>,
    store: Arc<dyn LocalStore>,
    mode: Arc<ModeTracker>,
}

impl SpaceMembershipEngine {
    pub fn new(session: Session, store: Arc<dyn LocalStore>) -> Self {
        Self {
            mode: Arc::new(ModeTracker::new(session.clone())),
            session: RwLock::new(session),
            store,
        }
    }

    fn session(&self) -> Session {
        self.session.read().clone()
    }

    /// Use another session for every later call, and let the shared mode
    /// tracker follow it.
    pub fn change_session(&self, session: Session) {
        self.mode.set_session(session.clone());
        *self.session.write() = session;
    }

    /// Mode tracker shared with the data exchange engine.
    pub fn mode(&self) -> Arc<ModeTracker> {
        self.mode.clone()
    }

    fn user(&self) -> String {
        self.session().current_user()
    }

    fn require_online(&self) -> ClientResult<()> {
        if self.mode.is_online() {
            Ok(())
        } else {
            Err(ClientError::RequiresOnline)
        }
    }

    fn spaces_service(&self) -> ClientResult<String> {
        self.session()
            .network_info()
            .spaces_service
            .ok_or_else(|| ClientError::UnsupportedByServer("spaces service".into()))
    }

    async fn call(&self, kind: IqKind, payload: Payload) -> ClientResult<Payload> {
        let service = self.spaces_service()?;
        let reply = self.session().request(kind, &service, payload).await?;
        reply
            .into_result()
            .map_err(|err| ClientError::from_stanza_error(&err))
    }

    /// Keep the snapshot only while the current user is a member.
    async fn remember(&self, space: &Space) -> ClientResult<()> {
        let user = self.user();
        if space.is_member(&user) {
            self.store.save_space(&user, space).await?;
        } else {
            self.store.delete_space(&user, &space.id).await?;
        }
        Ok(())
    }

    /// Create a space. Cached if the current user is a member.
    pub async fn create(&self, config: SpaceConfiguration) -> ClientResult<Space> {
        self.require_online()?;
        config.validate()?;
        self.create_with(Some(config))
            .instrument(spans::space_op("create", None))
            .await
    }

    /// Create the private space of the current user.
    pub async fn create_default_private_space(&self) -> ClientResult<Space> {
        self.require_online()?;
        self.create_with(None)
            .instrument(spans::space_op("create_private", None))
            .await
    }

    async fn create_with(&self, config: Option<SpaceConfiguration>) -> ClientResult<Space> {
        let space_id = match self
            .call(
                IqKind::Set,
                Payload::SpaceCreate {
                    configuration: config,
                },
            )
            .await?
        {
            Payload::SpaceCreated { space_id } => space_id,
            other => {
                return Err(ClientError::Rejected(format!(
                    "unexpected create reply: {:?}",
                    other
                )));
            }
        };
        let space = self
            .fetch(&space_id)
            .await?
            .ok_or_else(|| ClientError::UnknownEntity(space_id.clone()))?;
        self.remember(&space).await?;
        info!(space_id = %space.id, space_type = %space.space_type, "space created");
        Ok(space)
    }

    /// Last known state of a space: the snapshot, or the service if there is
    /// none and we are online.
    async fn snapshot(&self, space_id: &str) -> ClientResult<Space> {
        if let Some(space) = self.store.space(&self.user(), space_id).await? {
            return Ok(space);
        }
        if self.mode.is_online()
            && let Some(space) = self.fetch(space_id).await?
        {
            return Ok(space);
        }
        Err(ClientError::UnknownSpace(space_id.to_string()))
    }

    async fn require_moderator(&self, space_id: &str) -> ClientResult<Space> {
        let space = self.snapshot(space_id).await?;
        let user = self.user();
        if !space.is_moderator(&user) {
            return Err(ClientError::NotAuthorized(format!(
                "{} is not a moderator of {}",
                user, space_id
            )));
        }
        Ok(space)
    }

    /// Delete a space. The current user must be a moderator.
    pub async fn delete(&self, space_id: &str) -> ClientResult<()> {
        self.require_online()?;
        async {
            self.require_moderator(space_id).await?;
            self.call(
                IqKind::Set,
                Payload::SpaceDelete {
                    space_id: space_id.to_string(),
                },
            )
            .await?;
            self.store.delete_space(&self.user(), space_id).await?;
            info!("space deleted");
            Ok(())
        }
        .instrument(spans::space_op("delete", Some(space_id)))
        .await
    }

    /// Reconfigure a space. The current user must be a moderator.
    ///
    /// The space type cannot change.
    pub async fn configure(
        &self,
        space_id: &str,
        config: SpaceConfiguration,
    ) -> ClientResult<Space> {
        self.require_online()?;
        config.validate()?;
        async {
            let current = self.require_moderator(space_id).await?;
            if config.space_type != current.space_type {
                return Err(ClientError::InvalidData(format!(
                    "space type is {} and cannot change to {}",
                    current.space_type, config.space_type
                )));
            }
            self.call(
                IqKind::Set,
                Payload::SpaceConfigure {
                    space_id: space_id.to_string(),
                    configuration: config,
                },
            )
            .await?;
            let space = self
                .fetch(space_id)
                .await?
                .ok_or_else(|| ClientError::UnknownSpace(space_id.to_string()))?;
            self.remember(&space).await?;
            info!("space configured");
            Ok(space)
        }
        .instrument(spans::space_op("configure", Some(space_id)))
        .await
    }

    /// Look up a space. `None` if the service does not know it, or offline
    /// if there is no snapshot.
    pub async fn get(&self, space_id: &str) -> ClientResult<Option<Space>> {
        if !self.mode.is_online() {
            return Ok(self.store.space(&self.user(), space_id).await?);
        }
        match self.fetch(space_id).await? {
            Some(space) => {
                self.remember(&space).await?;
                Ok(Some(space))
            }
            None => {
                self.store.delete_space(&self.user(), space_id).await?;
                Ok(None)
            }
        }
    }

    /// Ask the service for a space, including its channels.
    async fn fetch(&self, space_id: &str) -> ClientResult<Option<Space>> {
        let service = self.spaces_service()?;
        let reply = self
            .session()
            .request(
                IqKind::Get,
                &service,
                Payload::SpaceInfo {
                    space_id: space_id.to_string(),
                },
            )
            .await?;
        let mut space = match reply.into_result() {
            Ok(Payload::SpaceInfoResult { space }) => space,
            Ok(_) => return Ok(None),
            Err(err) if err.condition == ErrorCondition::ItemNotFound => return Ok(None),
            Err(err) => return Err(ClientError::from_stanza_error(&err)),
        };
        if space.channels.is_empty() {
            match self
                .call(
                    IqKind::Get,
                    Payload::SpaceChannels {
                        space_id: space_id.to_string(),
                    },
                )
                .await?
            {
                Payload::SpaceChannelsResult { channels } => space.channels = channels,
                _ => debug!(space_id = %space_id, "no channel list returned"),
            }
        }
        if space.space_type == SpaceType::Other {
            space.space_type = SpaceType::from_space_id(&space.id);
        }
        Ok(Some(space))
    }

    /// Every space the current user can see.
    ///
    /// Online this replaces the cached snapshots of the current user.
    pub async fn list_all(&self) -> ClientResult<Vec<Space>> {
        let user = self.user();
        if !self.mode.is_online() {
            return Ok(self.store.spaces_for(&user).await?);
        }
        async {
            let items = match self
                .call(IqKind::Get, Payload::DiscoItems { node: None })
                .await?
            {
                Payload::DiscoItemsResult { items } => items,
                _ => Vec::new(),
            };
            let mut spaces = Vec::with_capacity(items.len());
            for item in items {
                let Some(space_id) = item.node else { continue };
                match self.fetch(&space_id).await {
                    Ok(Some(space)) => spaces.push(space),
                    Ok(None) => debug!(space_id = %space_id, "listed space vanished"),
                    Err(e) => {
                        warn!(space_id = %space_id, error = %e, "failed to fetch listed space");
                        return Err(e);
                    }
                }
            }
            let mine: Vec<Space> = spaces
                .iter()
                .filter(|s| s.is_member(&user))
                .cloned()
                .collect();
            self.store.replace_spaces(&user, &mine).await?;
            debug!(count = spaces.len(), "spaces listed");
            Ok(spaces)
        }
        .instrument(spans::space_op("list", None))
        .await
    }

    /// Names of the spaces the current user can see, keyed by space id.
    ///
    /// Falls back to the snapshots when offline or when the service cannot
    /// be asked.
    pub async fn spaces_list(&self) -> ClientResult<BTreeMap<String, String>> {
        let spaces = if self.mode.is_online() {
            match self.list_all().await {
                Ok(spaces) => spaces,
                Err(e) => {
                    warn!(error = %e, code = e.error_code(), "listing spaces failed, using snapshots");
                    self.store.spaces_for(&self.user()).await?
                }
            }
        } else {
            self.store.spaces_for(&self.user()).await?
        };
        Ok(spaces.into_iter().map(|s| (s.id, s.name)).collect())
    }

    /// The private space of the current user, if it exists. Never creates it.
    pub async fn get_default_space(&self) -> ClientResult<Option<Space>> {
        let username = self.session().settings().username.clone();
        Ok(self
            .get(&username)
            .await?
            .filter(|s| s.space_type == SpaceType::Private))
    }

    /// Drop every space snapshot of the current user.
    pub async fn clear_cache(&self) -> ClientResult<()> {
        let user = self.user();
        self.store.replace_spaces(&user, &[]).await?;
        info!(user = %user, "space snapshots cleared");
        Ok(())
    }

    pub async fn list_spaces_of_type(&self, space_type: SpaceType) -> ClientResult<Vec<Space>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|s| s.space_type == space_type)
            .collect())
    }

    /// Pubsub channel of a space: snapshot first, then the service.
    pub async fn get_pubsub_channel(&self, space_id: &str) -> ClientResult<SpaceChannel> {
        if let Some(space) = self.store.space(&self.user(), space_id).await?
            && let Some(channel) = space.pubsub_channel()
        {
            return Ok(channel.clone());
        }
        if self.mode.is_online()
            && let Some(space) = self.fetch(space_id).await?
            && let Some(channel) = space.pubsub_channel()
        {
            return Ok(channel.clone());
        }
        Err(ClientError::UnknownEntity(format!(
            "pubsub channel of {}",
            space_id
        )))
    }

    /// Replace the data models of an organizational space.
    pub async fn set_models(&self, space_id: &str, models: Vec<DataModel>) -> ClientResult<()> {
        self.require_online()?;
        async {
            let mut space = self.require_moderator(space_id).await?;
            if space.space_type != SpaceType::Orga {
                return Err(ClientError::InvalidData(format!(
                    "{} is not an organizational space",
                    space_id
                )));
            }
            self.call(
                IqKind::Set,
                Payload::SpaceModels {
                    space_id: space_id.to_string(),
                    models: Some(models.clone()),
                },
            )
            .await?;
            space.data_models = models.into_iter().collect();
            self.remember(&space).await?;
            Ok(())
        }
        .instrument(spans::space_op("set_models", Some(space_id)))
        .await
    }

    /// Data models of an organizational space.
    pub async fn get_models(&self, space_id: &str) -> ClientResult<Vec<DataModel>> {
        if !self.mode.is_online() {
            let space = self
                .store
                .space(&self.user(), space_id)
                .await?
                .ok_or_else(|| ClientError::UnknownSpace(space_id.to_string()))?;
            return Ok(space.data_models.into_iter().collect());
        }
        match self
            .call(
                IqKind::Get,
                Payload::SpaceModels {
                    space_id: space_id.to_string(),
                    models: None,
                },
            )
            .await?
        {
            Payload::SpaceModelsResult { models } => Ok(models),
            _ => Ok(Vec::new()),
        }
    }
}
