//! Scripted in-process server.
//!
//! Answers the requests of one client over a [`MemoryServer`] end the way a
//! spaces deployment would: login and registration on the domain, service
//! discovery, a spaces service, a pubsub service and optionally a
//! persistence service. Knobs let tests reject or swallow requests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use spacelink::net::{MemoryServer, MemoryTransport};
use spacelink::proto::stanza::{DiscoItem, QueryScope};
use spacelink::proto::{
    DataObject, DataObjectFilter, ErrorCondition, Iq, Payload, Persistence, PubSubEvent,
    PubSubItem, Role, Space, SpaceChannel, SpaceConfiguration, SpaceType, Stanza, jid,
};

pub const DOMAIN: &str = "example.org";
pub const SPACES: &str = "spaces.example.org";
pub const PUBSUB: &str = "pubsub.example.org";
pub const PERSISTENCE: &str = "persistence.example.org";

/// Node of the pubsub channel the server creates for a space.
pub fn node_of(space_id: &str) -> String {
    format!("spaces#{}", space_id)
}

/// A space hosted by the test server with `moderator` as its only moderator.
pub fn hosted_space(
    id: &str,
    space_type: SpaceType,
    moderator: &str,
    persistence: Persistence,
) -> Space {
    let mut members = BTreeMap::new();
    members.insert(jid::bare(moderator).to_string(), Role::Moderator);
    Space {
        id: id.to_string(),
        name: id.to_string(),
        domain: SPACES.to_string(),
        space_type,
        channels: vec![SpaceChannel::pubsub(node_of(id), PUBSUB)],
        members,
        persistence,
        data_models: Default::default(),
    }
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, String>,
    bound: Option<String>,
    registration: bool,
    persistence_service: bool,
    echo: bool,
    events_without_payload: bool,
    spaces: BTreeMap<String, Space>,
    nodes: HashMap<String, Vec<PubSubItem>>,
    subscriptions: HashSet<String>,
    rejected_objects: HashSet<String>,
    silenced: HashSet<String>,
    received: Vec<Iq>,
    next_space: u32,
}

/// Handle on the running server.
#[derive(Clone)]
pub struct TestServer {
    end: MemoryServer,
    state: Arc<Mutex<State>>,
}

impl TestServer {
    /// Create a link pair and start serving its server end.
    pub fn spawn() -> (Self, MemoryTransport) {
        let (transport, end) = MemoryTransport::pair();
        let state = Arc::new(Mutex::new(State {
            registration: true,
            persistence_service: true,
            echo: true,
            ..State::default()
        }));
        let server = Self { end, state };

        let task = server.clone();
        tokio::spawn(async move {
            while let Some(stanza) = task.end.recv().await {
                let Stanza::Iq(iq) = stanza else { continue };
                let outbound = task.handle(iq);
                for stanza in outbound {
                    task.end.deliver(stanza);
                }
            }
        });
        (server, transport)
    }

    pub fn end(&self) -> &MemoryServer {
        &self.end
    }

    pub fn add_account(&self, username: &str, password: &str) {
        self.state
            .lock()
            .accounts
            .insert(username.to_string(), password.to_string());
    }

    pub fn has_account(&self, username: &str) -> bool {
        self.state.lock().accounts.contains_key(username)
    }

    pub fn set_registration(&self, supported: bool) {
        self.state.lock().registration = supported;
    }

    pub fn set_persistence_service(&self, offered: bool) {
        self.state.lock().persistence_service = offered;
    }

    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    /// Announce items without their payload, forcing a fetch.
    pub fn set_events_without_payload(&self, enabled: bool) {
        self.state.lock().events_without_payload = enabled;
    }

    /// Reject publishes of the object with this `id` attribute.
    pub fn reject_object(&self, object_id: &str) {
        self.state
            .lock()
            .rejected_objects
            .insert(object_id.to_string());
    }

    /// Swallow requests with this payload type, e.g. `"publish"`.
    pub fn silence(&self, payload_type: &str) {
        self.state.lock().silenced.insert(payload_type.to_string());
    }

    pub fn unsilence(&self, payload_type: &str) {
        self.state.lock().silenced.remove(payload_type);
    }

    pub fn add_space(&self, space: Space) {
        let mut state = self.state.lock();
        state.nodes.entry(node_of(&space.id)).or_default();
        state.spaces.insert(space.id.clone(), space);
    }

    pub fn space(&self, space_id: &str) -> Option<Space> {
        self.state.lock().spaces.get(space_id).cloned()
    }

    pub fn is_subscribed(&self, node: &str) -> bool {
        self.state.lock().subscriptions.contains(node)
    }

    /// Payloads retained on a node, in publication order.
    pub fn node_items(&self, node: &str) -> Vec<DataObject> {
        self.state
            .lock()
            .nodes
            .get(node)
            .map(|items| items.iter().filter_map(|i| i.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Requests received so far with this payload type.
    pub fn requests(&self, payload_type: &str) -> Vec<Iq> {
        self.state
            .lock()
            .received
            .iter()
            .filter(|iq| payload_type_of(&iq.payload) == payload_type)
            .cloned()
            .collect()
    }

    /// Store an item as if another user published it and notify subscribers.
    pub fn push_item(&self, node: &str, item_id: &str, object: DataObject) -> bool {
        let item = PubSubItem {
            id: Some(item_id.to_string()),
            payload: Some(object),
        };
        let event = {
            let mut state = self.state.lock();
            state
                .nodes
                .entry(node.to_string())
                .or_default()
                .push(item.clone());
            state.event_for(node, item)
        };
        match event {
            Some(event) => self.end.deliver(event),
            None => false,
        }
    }

    /// Send a raw notification.
    pub fn notify(&self, event: PubSubEvent) -> bool {
        self.end.deliver(event)
    }

    fn handle(&self, iq: Iq) -> Vec<Stanza> {
        let mut state = self.state.lock();
        state.received.push(iq.clone());
        if iq.is_reply() || state.silenced.contains(payload_type_of(&iq.payload)) {
            return Vec::new();
        }
        let to = iq.to.clone().unwrap_or_default();
        match to.as_str() {
            DOMAIN => vec![state.on_domain(&iq).into()],
            SPACES => vec![state.on_spaces(&iq).into()],
            PUBSUB => state.on_pubsub(&iq),
            PERSISTENCE if state.persistence_service => vec![state.on_persistence(&iq).into()],
            _ => vec![iq.error(ErrorCondition::ServiceUnavailable, None).into()],
        }
    }
}

fn payload_type_of(payload: &Payload) -> &'static str {
    match payload {
        Payload::Empty => "empty",
        Payload::Error(_) => "error",
        Payload::Login { .. } => "login",
        Payload::LoginResult { .. } => "login_result",
        Payload::RegistrationQuery => "registration_query",
        Payload::RegistrationInfo { .. } => "registration_info",
        Payload::Register { .. } => "register",
        Payload::DiscoItems { .. } => "disco_items",
        Payload::DiscoItemsResult { .. } => "disco_items_result",
        Payload::SpacesVersion => "spaces_version",
        Payload::SpacesVersionResult { .. } => "spaces_version_result",
        Payload::SpaceCreate { .. } => "space_create",
        Payload::SpaceCreated { .. } => "space_created",
        Payload::SpaceDelete { .. } => "space_delete",
        Payload::SpaceConfigure { .. } => "space_configure",
        Payload::SpaceInfo { .. } => "space_info",
        Payload::SpaceInfoResult { .. } => "space_info_result",
        Payload::SpaceChannels { .. } => "space_channels",
        Payload::SpaceChannelsResult { .. } => "space_channels_result",
        Payload::SpaceModels { .. } => "space_models",
        Payload::SpaceModelsResult { .. } => "space_models_result",
        Payload::Subscribe { .. } => "subscribe",
        Payload::Unsubscribe { .. } => "unsubscribe",
        Payload::Publish { .. } => "publish",
        Payload::Published { .. } => "published",
        Payload::Items { .. } => "items",
        Payload::ItemsResult { .. } => "items_result",
        Payload::Query { .. } => "query",
        Payload::QueryResult { .. } => "query_result",
        Payload::Delete { .. } => "delete",
        Payload::DeleteResult { .. } => "delete_result",
    }
}

impl State {
    fn requester(&self) -> String {
        self.bound
            .as_deref()
            .map(|a| jid::bare(a).to_string())
            .unwrap_or_default()
    }

    fn event_for(&self, node: &str, item: PubSubItem) -> Option<PubSubEvent> {
        if !self.subscriptions.contains(node) {
            return None;
        }
        let item = if self.events_without_payload {
            PubSubItem {
                id: item.id,
                payload: None,
            }
        } else {
            item
        };
        Some(PubSubEvent {
            from: PUBSUB.to_string(),
            node: node.to_string(),
            items: vec![item],
        })
    }

    fn on_domain(&mut self, iq: &Iq) -> Iq {
        match &iq.payload {
            Payload::Login {
                username,
                password,
                resource,
            } => {
                if self.accounts.get(username) != Some(password) {
                    return iq.error(ErrorCondition::NotAuthorized, Some("bad credentials".into()));
                }
                let address = format!("{}/{}", jid::join(username, DOMAIN), resource);
                self.bound = Some(address.clone());
                iq.result(Payload::LoginResult { address })
            }
            Payload::RegistrationQuery => iq.result(Payload::RegistrationInfo {
                supported: self.registration,
            }),
            Payload::Register { username, password } => {
                if !self.registration {
                    iq.error(ErrorCondition::FeatureNotImplemented, None)
                } else if self.accounts.contains_key(username) {
                    iq.error(ErrorCondition::Conflict, None)
                } else if password.is_empty() {
                    iq.error(ErrorCondition::NotAcceptable, Some("empty password".into()))
                } else {
                    self.accounts.insert(username.clone(), password.clone());
                    iq.result(Payload::Empty)
                }
            }
            Payload::DiscoItems { node: None } => {
                let mut items = vec![DiscoItem {
                    address: SPACES.to_string(),
                    name: Some("MIRROR Spaces Service".to_string()),
                    node: None,
                }];
                items.push(DiscoItem {
                    address: PUBSUB.to_string(),
                    name: Some("Publish-Subscribe service".to_string()),
                    node: None,
                });
                if self.persistence_service {
                    items.push(DiscoItem {
                        address: PERSISTENCE.to_string(),
                        name: Some("MIRROR Persistence Service".to_string()),
                        node: None,
                    });
                }
                iq.result(Payload::DiscoItemsResult { items })
            }
            _ => iq.error(ErrorCondition::FeatureNotImplemented, None),
        }
    }

    fn on_spaces(&mut self, iq: &Iq) -> Iq {
        let requester = self.requester();
        match &iq.payload {
            Payload::SpacesVersion => iq.result(Payload::SpacesVersionResult {
                version: "0.4".to_string(),
            }),
            Payload::DiscoItems { node: None } => {
                let items = self
                    .spaces
                    .values()
                    .map(|s| DiscoItem {
                        address: SPACES.to_string(),
                        name: Some(s.name.clone()),
                        node: Some(s.id.clone()),
                    })
                    .collect();
                iq.result(Payload::DiscoItemsResult { items })
            }
            Payload::SpaceCreate { configuration } => {
                let config = configuration.clone().unwrap_or_else(|| {
                    let local = jid::local(&requester).unwrap_or("user").to_string();
                    SpaceConfiguration::new(SpaceType::Private, local)
                        .moderator(&requester)
                        .persistence(Persistence::On)
                });
                let id = match config.space_type {
                    SpaceType::Private => jid::local(&requester).unwrap_or("user").to_string(),
                    other => {
                        self.next_space += 1;
                        format!("{}#{}", other, self.next_space)
                    }
                };
                if self.spaces.contains_key(&id) {
                    return iq.error(ErrorCondition::Conflict, None);
                }
                let space = Space {
                    id: id.clone(),
                    name: config.name,
                    domain: SPACES.to_string(),
                    space_type: config.space_type,
                    channels: vec![SpaceChannel::pubsub(node_of(&id), PUBSUB)],
                    members: config.members,
                    persistence: config.persistence,
                    data_models: config.data_models,
                };
                self.nodes.entry(node_of(&id)).or_default();
                self.spaces.insert(id.clone(), space);
                iq.result(Payload::SpaceCreated { space_id: id })
            }
            Payload::SpaceDelete { space_id } => match self.spaces.get(space_id) {
                None => iq.error(ErrorCondition::ItemNotFound, None),
                Some(space) if !space.is_moderator(&requester) => {
                    iq.error(ErrorCondition::Forbidden, None)
                }
                Some(_) => {
                    self.spaces.remove(space_id);
                    self.nodes.remove(&node_of(space_id));
                    iq.result(Payload::Empty)
                }
            },
            Payload::SpaceConfigure {
                space_id,
                configuration,
            } => match self.spaces.get_mut(space_id) {
                None => iq.error(ErrorCondition::ItemNotFound, None),
                Some(space) => {
                    space.name = configuration.name.clone();
                    space.members = configuration.members.clone();
                    space.persistence = configuration.persistence;
                    space.data_models = configuration.data_models.clone();
                    iq.result(Payload::Empty)
                }
            },
            Payload::SpaceInfo { space_id } => match self.spaces.get(space_id) {
                // Channels come from a separate request.
                Some(space) => iq.result(Payload::SpaceInfoResult {
                    space: Space {
                        channels: Vec::new(),
                        ..space.clone()
                    },
                }),
                None => iq.error(ErrorCondition::ItemNotFound, None),
            },
            Payload::SpaceChannels { space_id } => match self.spaces.get(space_id) {
                Some(space) => iq.result(Payload::SpaceChannelsResult {
                    channels: space.channels.clone(),
                }),
                None => iq.error(ErrorCondition::ItemNotFound, None),
            },
            Payload::SpaceModels { space_id, models } => match self.spaces.get_mut(space_id) {
                None => iq.error(ErrorCondition::ItemNotFound, None),
                Some(space) => match models {
                    Some(models) => {
                        space.data_models = models.iter().cloned().collect();
                        iq.result(Payload::Empty)
                    }
                    None => iq.result(Payload::SpaceModelsResult {
                        models: space.data_models.iter().cloned().collect(),
                    }),
                },
            },
            _ => iq.error(ErrorCondition::FeatureNotImplemented, None),
        }
    }

    fn on_pubsub(&mut self, iq: &Iq) -> Vec<Stanza> {
        match &iq.payload {
            Payload::Subscribe { node, .. } => {
                if !self.nodes.contains_key(node) {
                    return vec![iq.error(ErrorCondition::ItemNotFound, None).into()];
                }
                self.subscriptions.insert(node.clone());
                vec![iq.result(Payload::Empty).into()]
            }
            Payload::Unsubscribe { node, .. } => {
                self.subscriptions.remove(node);
                vec![iq.result(Payload::Empty).into()]
            }
            Payload::Publish { node, item } => {
                if !self.nodes.contains_key(node) {
                    return vec![iq.error(ErrorCondition::ItemNotFound, None).into()];
                }
                if let Some(id) = item.payload.as_ref().and_then(|p| p.id())
                    && self.rejected_objects.contains(id)
                {
                    return vec![iq.error(ErrorCondition::NotAllowed, None).into()];
                }
                let item_id = item
                    .id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                let stored = PubSubItem {
                    id: Some(item_id.clone()),
                    payload: item.payload.clone(),
                };
                if let Some(items) = self.nodes.get_mut(node) {
                    items.push(stored.clone());
                }
                let mut out: Vec<Stanza> = vec![
                    iq.result(Payload::Published {
                        node: node.clone(),
                        item_id,
                    })
                    .into(),
                ];
                if self.echo
                    && let Some(event) = self.event_for(node, stored)
                {
                    out.push(event.into());
                }
                out
            }
            Payload::Items { node, item_ids } => match self.nodes.get(node) {
                None => vec![iq.error(ErrorCondition::ItemNotFound, None).into()],
                Some(items) => {
                    let items = items
                        .iter()
                        .filter(|i| {
                            item_ids.is_empty()
                                || i.id.as_ref().is_some_and(|id| item_ids.contains(id))
                        })
                        .cloned()
                        .collect();
                    vec![
                        iq.result(Payload::ItemsResult {
                            node: node.clone(),
                            items,
                        })
                        .into(),
                    ]
                }
            },
            _ => vec![iq.error(ErrorCondition::FeatureNotImplemented, None).into()],
        }
    }

    fn on_persistence(&mut self, iq: &Iq) -> Iq {
        match &iq.payload {
            Payload::Query { scope, filters } => {
                let objects = self
                    .objects_in(scope)
                    .into_iter()
                    .filter(|o| filters.iter().all(|f| f.accepts(o)))
                    .collect();
                iq.result(Payload::QueryResult { objects })
            }
            Payload::Delete { ids } => {
                let mut deleted = 0;
                for items in self.nodes.values_mut() {
                    let before = items.len();
                    items.retain(|i| {
                        !i.payload
                            .as_ref()
                            .and_then(|p| p.id())
                            .is_some_and(|id| ids.iter().any(|x| x == id))
                    });
                    deleted += (before - items.len()) as u32;
                }
                iq.result(Payload::DeleteResult { deleted })
            }
            _ => iq.error(ErrorCondition::FeatureNotImplemented, None),
        }
    }

    fn objects_in(&self, scope: &QueryScope) -> Vec<DataObject> {
        let payloads = |node: &str| -> Vec<DataObject> {
            self.nodes
                .get(node)
                .map(|items| items.iter().filter_map(|i| i.payload.clone()).collect())
                .unwrap_or_default()
        };
        match scope {
            QueryScope::Ids { ids } => self
                .nodes
                .keys()
                .flat_map(|node| payloads(node))
                .filter(|o| o.id().is_some_and(|id| ids.iter().any(|x| x == id)))
                .collect(),
            QueryScope::Spaces { space_ids } => space_ids
                .iter()
                .flat_map(|id| payloads(&node_of(id)))
                .collect(),
        }
    }
}
