//! Stanza envelopes.
//!
//! A [`Stanza`] is either an [`Iq`] request/reply or a [`PubSubEvent`]
//! notification pushed by a pubsub service. Requests and replies are
//! correlated by [`Iq::id`].

use serde::{Deserialize, Serialize};

use crate::filter::QueryFilter;
use crate::object::DataObject;
use crate::space::{DataModel, Space, SpaceChannel, SpaceConfiguration};

/// Top-level unit exchanged with the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stanza", rename_all = "snake_case")]
pub enum Stanza {
    /// Request or reply.
    Iq(Iq),
    /// Pubsub notification.
    Event(PubSubEvent),
}

impl Stanza {
    /// Sender address, if set.
    pub fn from(&self) -> Option<&str> {
        match self {
            Self::Iq(iq) => iq.from.as_deref(),
            Self::Event(ev) => Some(&ev.from),
        }
    }

    /// The iq, if this is one.
    pub fn as_iq(&self) -> Option<&Iq> {
        match self {
            Self::Iq(iq) => Some(iq),
            Self::Event(_) => None,
        }
    }
}

impl From<Iq> for Stanza {
    fn from(iq: Iq) -> Self {
        Self::Iq(iq)
    }
}

impl From<PubSubEvent> for Stanza {
    fn from(ev: PubSubEvent) -> Self {
        Self::Event(ev)
    }
}

/// Iq type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IqKind {
    /// Read request.
    Get,
    /// Write request.
    Set,
    /// Successful reply.
    Result,
    /// Error reply.
    Error,
}

impl IqKind {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

/// A request or reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iq {
    /// Correlation id, unique per outstanding request.
    pub id: String,
    /// Request or reply type.
    pub kind: IqKind,
    /// Sender address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Recipient address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Typed payload.
    pub payload: Payload,
}

impl Iq {
    fn request(kind: IqKind, id: impl Into<String>, to: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            kind,
            from: None,
            to: Some(to.into()),
            payload,
        }
    }

    /// A `get` request.
    pub fn get(id: impl Into<String>, to: impl Into<String>, payload: Payload) -> Self {
        Self::request(IqKind::Get, id, to, payload)
    }

    /// A `set` request.
    pub fn set(id: impl Into<String>, to: impl Into<String>, payload: Payload) -> Self {
        Self::request(IqKind::Set, id, to, payload)
    }

    /// A successful reply to this request.
    pub fn result(&self, payload: Payload) -> Self {
        Self {
            id: self.id.clone(),
            kind: IqKind::Result,
            from: self.to.clone(),
            to: self.from.clone(),
            payload,
        }
    }

    /// An error reply to this request.
    pub fn error(&self, condition: ErrorCondition, text: Option<String>) -> Self {
        Self {
            id: self.id.clone(),
            kind: IqKind::Error,
            from: self.to.clone(),
            to: self.from.clone(),
            payload: Payload::Error(StanzaError { condition, text }),
        }
    }

    /// Whether this is a reply rather than a request.
    pub fn is_reply(&self) -> bool {
        matches!(self.kind, IqKind::Result | IqKind::Error)
    }

    /// Split a reply into its payload or the error it carries.
    ///
    /// An error reply without an error payload yields `internal-server-error`.
    pub fn into_result(self) -> Result<Payload, StanzaError> {
        match self.kind {
            IqKind::Error => match self.payload {
                Payload::Error(err) => Err(err),
                _ => Err(StanzaError {
                    condition: ErrorCondition::InternalServerError,
                    text: None,
                }),
            },
            _ => Ok(self.payload),
        }
    }

    /// The error carried by an error reply.
    pub fn stanza_error(&self) -> Option<&StanzaError> {
        match (&self.kind, &self.payload) {
            (IqKind::Error, Payload::Error(err)) => Some(err),
            _ => None,
        }
    }
}

/// Error conditions reported by servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCondition {
    /// Malformed request.
    BadRequest,
    /// Resource already exists.
    Conflict,
    /// Sender lacks permission.
    Forbidden,
    /// Request data not acceptable.
    NotAcceptable,
    /// Action not allowed for the sender.
    NotAllowed,
    /// Sender not authorized.
    NotAuthorized,
    /// Addressed item does not exist.
    ItemNotFound,
    /// Feature not implemented by the recipient.
    FeatureNotImplemented,
    /// Service temporarily unavailable.
    ServiceUnavailable,
    /// Server side failure.
    InternalServerError,
}

impl ErrorCondition {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::NotAcceptable => "not-acceptable",
            Self::NotAllowed => "not-allowed",
            Self::NotAuthorized => "not-authorized",
            Self::ItemNotFound => "item-not-found",
            Self::FeatureNotImplemented => "feature-not-implemented",
            Self::ServiceUnavailable => "service-unavailable",
            Self::InternalServerError => "internal-server-error",
        }
    }
}

/// Error payload of an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StanzaError {
    /// Condition.
    pub condition: ErrorCondition,
    /// Human readable text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl std::fmt::Display for StanzaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text {
            Some(text) => write!(f, "{}: {}", self.condition.as_str(), text),
            None => f.write_str(self.condition.as_str()),
        }
    }
}

/// An entry returned by service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoItem {
    /// Address of the entity.
    pub address: String,
    /// Human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Node, for node-level items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

/// An item of a pubsub node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubItem {
    /// Item id assigned by the pubsub service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Payload. Absent for notifications of large items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<DataObject>,
}

impl PubSubItem {
    /// An item carrying a payload and no id.
    pub fn with_payload(payload: DataObject) -> Self {
        Self {
            id: None,
            payload: Some(payload),
        }
    }
}

/// Items published to a node, pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubEvent {
    /// Address of the pubsub service.
    pub from: String,
    /// Node the items were published to.
    pub node: String,
    /// Published items in publication order.
    #[serde(default)]
    pub items: Vec<PubSubItem>,
}

/// Selection of a persistence query or delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum QueryScope {
    /// Objects with the given ids.
    Ids {
        /// Object ids.
        ids: Vec<String>,
    },
    /// Objects published to the given spaces.
    Spaces {
        /// Space ids.
        space_ids: Vec<String>,
    },
}

/// Iq payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Empty acknowledgement.
    Empty,
    /// Error reply payload.
    Error(StanzaError),

    /// Authenticate and bind a resource.
    Login {
        /// Local part of the account.
        username: String,
        /// Password.
        password: String,
        /// Resource to bind.
        resource: String,
    },
    /// Successful login, carrying the bound address.
    LoginResult {
        /// Full address of the session.
        address: String,
    },
    /// Ask whether in-band registration is supported.
    RegistrationQuery,
    /// Registration support answer.
    RegistrationInfo {
        /// Whether accounts can be registered.
        supported: bool,
    },
    /// Register an account.
    Register {
        /// Local part of the account.
        username: String,
        /// Password.
        password: String,
    },

    /// List items of an entity or node.
    DiscoItems {
        /// Node to list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<String>,
    },
    /// Discovered items.
    DiscoItemsResult {
        /// Items.
        items: Vec<DiscoItem>,
    },
    /// Ask a spaces service for its protocol version.
    SpacesVersion,
    /// Spaces service protocol version.
    SpacesVersionResult {
        /// Version string.
        version: String,
    },

    /// Create a space. Without configuration a default private space is created.
    SpaceCreate {
        /// Requested configuration.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        configuration: Option<SpaceConfiguration>,
    },
    /// Space created.
    SpaceCreated {
        /// Id of the new space.
        space_id: String,
    },
    /// Delete a space.
    SpaceDelete {
        /// Space id.
        space_id: String,
    },
    /// Reconfigure a space.
    SpaceConfigure {
        /// Space id.
        space_id: String,
        /// New configuration.
        configuration: SpaceConfiguration,
    },
    /// Fetch space information.
    SpaceInfo {
        /// Space id.
        space_id: String,
    },
    /// Space information. Channels may be empty and are fetched separately.
    SpaceInfoResult {
        /// The space.
        space: Space,
    },
    /// Fetch the channels of a space.
    SpaceChannels {
        /// Space id.
        space_id: String,
    },
    /// Channels of a space.
    SpaceChannelsResult {
        /// Channels.
        channels: Vec<SpaceChannel>,
    },
    /// Get (`models` absent) or set the data models of an organizational space.
    SpaceModels {
        /// Space id.
        space_id: String,
        /// Models to set.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        models: Option<Vec<DataModel>>,
    },
    /// Data models of a space.
    SpaceModelsResult {
        /// Models.
        models: Vec<DataModel>,
    },

    /// Subscribe an address to a node.
    Subscribe {
        /// Node.
        node: String,
        /// Subscriber address.
        address: String,
    },
    /// Unsubscribe an address from a node.
    Unsubscribe {
        /// Node.
        node: String,
        /// Subscriber address.
        address: String,
    },
    /// Publish an item.
    Publish {
        /// Node.
        node: String,
        /// Item to publish.
        item: PubSubItem,
    },
    /// Publish acknowledgement.
    Published {
        /// Node.
        node: String,
        /// Id assigned to the item.
        item_id: String,
    },
    /// Fetch items of a node. Empty `item_ids` fetches all retained items.
    Items {
        /// Node.
        node: String,
        /// Item ids.
        #[serde(default)]
        item_ids: Vec<String>,
    },
    /// Fetched items.
    ItemsResult {
        /// Node.
        node: String,
        /// Items.
        items: Vec<PubSubItem>,
    },

    /// Query the persistence service.
    Query {
        /// Selection.
        scope: QueryScope,
        /// Filters all returned objects must pass.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filters: Vec<QueryFilter>,
    },
    /// Persistence query result.
    QueryResult {
        /// Matching objects.
        objects: Vec<DataObject>,
    },
    /// Delete objects from the persistence service.
    Delete {
        /// Object ids.
        ids: Vec<String>,
    },
    /// Delete confirmation.
    DeleteResult {
        /// Number of deleted objects.
        deleted: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_swaps_addresses() {
        let mut req = Iq::get("1", "spaces.example.org", Payload::SpacesVersion);
        req.from = Some("alice@example.org/a".into());
        let reply = req.result(Payload::SpacesVersionResult {
            version: "0.4".into(),
        });
        assert_eq!(reply.id, "1");
        assert_eq!(reply.from.as_deref(), Some("spaces.example.org"));
        assert_eq!(reply.to.as_deref(), Some("alice@example.org/a"));
        assert!(reply.is_reply());
        assert!(reply.stanza_error().is_none());
    }

    #[test]
    fn error_reply_carries_condition() {
        let req = Iq::set(
            "2",
            "example.org",
            Payload::Register {
                username: "alice".into(),
                password: "pw".into(),
            },
        );
        let reply = req.error(ErrorCondition::Conflict, None);
        assert_eq!(
            reply.stanza_error().map(|e| e.condition),
            Some(ErrorCondition::Conflict)
        );
        assert!(reply.into_result().is_err());
    }

    #[test]
    fn json_shape() {
        let stanza = Stanza::Iq(Iq::get(
            "7",
            "pubsub.example.org",
            Payload::Items {
                node: "n".into(),
                item_ids: vec!["a".into()],
            },
        ));
        let json = serde_json::to_value(&stanza).unwrap();
        assert_eq!(json["stanza"], "iq");
        assert_eq!(json["kind"], "get");
        assert_eq!(json["payload"]["type"], "items");
        let back: Stanza = serde_json::from_value(json).unwrap();
        assert_eq!(back, stanza);
    }

    #[test]
    fn error_condition_wire_names() {
        let json = serde_json::to_string(&ErrorCondition::NotAllowed).unwrap();
        assert_eq!(json, "\"not-allowed\"");
        assert_eq!(ErrorCondition::ItemNotFound.as_str(), "item-not-found");
    }
}
