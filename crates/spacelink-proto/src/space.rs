//! Spaces: shared channels with a membership, a type and a persistence setting.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::jid;

/// Kind of space. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    /// Single-user space. Has no multi-user channel.
    Private,
    /// Team space.
    Team,
    /// Organizational space. Carries a set of supported data models.
    Orga,
    /// Unknown type reported by a server. Cannot be used to create spaces.
    Other,
}

impl SpaceType {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Team => "team",
            Self::Orga => "orga",
            Self::Other => "other",
        }
    }

    /// Infer the type from a space id (`team#...`, `orga#...`).
    ///
    /// Ids without a known prefix are private spaces.
    pub fn from_space_id(space_id: &str) -> Self {
        if space_id.starts_with("team#") {
            Self::Team
        } else if space_id.starts_with("orga#") {
            Self::Orga
        } else {
            Self::Private
        }
    }

    /// Whether spaces of this type have a multi-user channel.
    pub fn has_muc(&self) -> bool {
        matches!(self, Self::Team | Self::Orga)
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpaceType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "team" => Ok(Self::Team),
            "orga" => Ok(Self::Orga),
            "other" => Ok(Self::Other),
            _ => Err(ProtocolError::UnknownValue {
                kind: "space type",
                value: s.to_string(),
            }),
        }
    }
}

/// Role of a member within a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular member.
    Member,
    /// Moderator. Moderators are members too.
    Moderator,
}

impl Role {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
        }
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Ok(Self::Member),
            "moderator" => Ok(Self::Moderator),
            _ => Err(ProtocolError::UnknownValue {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Persistence setting of a space.
///
/// Serialized as `"false"`, `"true"` or an ISO 8601 duration such as `"P1DT2H"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Persistence {
    /// Items are not retained.
    #[default]
    Off,
    /// Items are retained indefinitely.
    On,
    /// Items are retained for the given time.
    Duration(Duration),
}

impl Persistence {
    /// Parse a persistence setting.
    ///
    /// `"true"`/`"1"` mean [`Persistence::On`], `"false"`/`"0"` mean
    /// [`Persistence::Off`], anything else is read as an ISO 8601 duration.
    /// Unparsable values are treated as `Off`.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "true" | "1" => Self::On,
            "false" | "0" | "" => Self::Off,
            other => parse_iso_duration(other).map_or(Self::Off, Self::Duration),
        }
    }

    /// Whether items are retained at all.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Off)
    }
}

impl From<String> for Persistence {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Persistence> for String {
    fn from(value: Persistence) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("false"),
            Self::On => f.write_str("true"),
            Self::Duration(d) => f.write_str(&format_iso_duration(*d)),
        }
    }
}

/// Parse the `PnWnDTnHnMnS` subset of ISO 8601 durations.
///
/// Years and months have no fixed length and are rejected.
fn parse_iso_duration(value: &str) -> Option<Duration> {
    let rest = value.strip_prefix('P')?;
    let (date, time) = match rest.find('T') {
        Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
        None => (rest, None),
    };

    let mut secs: u64 = 0;
    let mut seen = false;
    for (number, unit) in components(date)? {
        secs += number.checked_mul(match unit {
            'W' => 7 * 86_400,
            'D' => 86_400,
            _ => return None,
        })?;
        seen = true;
    }
    if let Some(time) = time {
        let parts = components(time)?;
        if parts.is_empty() {
            return None;
        }
        for (number, unit) in parts {
            secs += number.checked_mul(match unit {
                'H' => 3_600,
                'M' => 60,
                'S' => 1,
                _ => return None,
            })?;
            seen = true;
        }
    }
    seen.then(|| Duration::from_secs(secs))
}

fn components(part: &str) -> Option<Vec<(u64, char)>> {
    let mut out = Vec::new();
    let mut number = String::new();
    for ch in part.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else {
            if number.is_empty() {
                return None;
            }
            out.push((number.parse().ok()?, ch));
            number.clear();
        }
    }
    number.is_empty().then_some(out)
}

fn format_iso_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || seconds > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if seconds > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{}S", seconds));
        }
    }
    out
}

/// A data model supported by an organizational space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataModel {
    /// Namespace of the model.
    pub namespace: String,
    /// Location of the model schema.
    pub schema_location: String,
}

impl DataModel {
    /// Create a data model reference.
    pub fn new(namespace: impl Into<String>, schema_location: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            schema_location: schema_location.into(),
        }
    }
}

/// A channel of a space with its type-specific properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceChannel {
    /// Channel type, e.g. [`SpaceChannel::PUBSUB`].
    pub kind: String,
    /// Channel properties.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl SpaceChannel {
    /// Publish/subscribe channel. Properties `node` and `domain`.
    pub const PUBSUB: &'static str = "pubsub";
    /// Multi-user chat channel. Property `address`.
    pub const MUC: &'static str = "muc";
    /// Persistence channel.
    pub const PERSISTENCE: &'static str = "persistence";

    /// Create a channel without properties.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Pubsub channel for `node` hosted on `domain`.
    pub fn pubsub(node: impl Into<String>, domain: impl Into<String>) -> Self {
        Self::new(Self::PUBSUB)
            .with_property("node", node)
            .with_property("domain", domain)
    }

    /// Look up a property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// A space as known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    /// Space identifier, unique within its domain.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Domain of the spaces service.
    pub domain: String,
    /// Space type.
    pub space_type: SpaceType,
    /// Channels of the space.
    #[serde(default)]
    pub channels: Vec<SpaceChannel>,
    /// Members by bare address.
    #[serde(default)]
    pub members: BTreeMap<String, Role>,
    /// Persistence setting.
    #[serde(default)]
    pub persistence: Persistence,
    /// Supported data models (organizational spaces only).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub data_models: BTreeSet<DataModel>,
}

impl Space {
    /// The first channel of the given kind.
    pub fn channel(&self, kind: &str) -> Option<&SpaceChannel> {
        self.channels.iter().find(|c| c.kind == kind)
    }

    /// The pubsub channel.
    pub fn pubsub_channel(&self) -> Option<&SpaceChannel> {
        self.channel(SpaceChannel::PUBSUB)
    }

    /// Node identifier of the pubsub channel.
    pub fn pubsub_node(&self) -> Option<&str> {
        self.pubsub_channel().and_then(|c| c.property("node"))
    }

    /// Address of the pubsub service owning the node.
    pub fn pubsub_domain(&self) -> Option<&str> {
        self.pubsub_channel().and_then(|c| c.property("domain"))
    }

    /// The multi-user channel, if the space type has one.
    pub fn muc_channel(&self) -> Option<&SpaceChannel> {
        if self.space_type.has_muc() {
            self.channel(SpaceChannel::MUC)
        } else {
            None
        }
    }

    /// Role of `address`, if a member.
    pub fn role_of(&self, address: &str) -> Option<Role> {
        let bare = jid::bare(address);
        self.members
            .iter()
            .find(|(member, _)| member.eq_ignore_ascii_case(bare))
            .map(|(_, role)| *role)
    }

    /// Whether `address` is a member. Moderators are members.
    pub fn is_member(&self, address: &str) -> bool {
        self.role_of(address).is_some()
    }

    /// Whether `address` is a moderator.
    pub fn is_moderator(&self, address: &str) -> bool {
        self.role_of(address) == Some(Role::Moderator)
    }

    /// Configuration reproducing this space, as a starting point for changes.
    pub fn configuration(&self) -> SpaceConfiguration {
        SpaceConfiguration {
            space_type: self.space_type,
            name: self.name.clone(),
            members: self.members.clone(),
            persistence: self.persistence,
            data_models: self.data_models.clone(),
        }
    }
}

/// Requested configuration for creating or reconfiguring a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceConfiguration {
    /// Space type. Ignored on reconfiguration.
    pub space_type: SpaceType,
    /// Display name.
    pub name: String,
    /// Members by bare address.
    #[serde(default)]
    pub members: BTreeMap<String, Role>,
    /// Persistence setting.
    #[serde(default)]
    pub persistence: Persistence,
    /// Supported data models (organizational spaces only).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub data_models: BTreeSet<DataModel>,
}

impl SpaceConfiguration {
    /// Start a configuration.
    pub fn new(space_type: SpaceType, name: impl Into<String>) -> Self {
        Self {
            space_type,
            name: name.into(),
            members: BTreeMap::new(),
            persistence: Persistence::Off,
            data_models: BTreeSet::new(),
        }
    }

    /// Add a member. Does not downgrade an existing moderator.
    pub fn member(mut self, address: &str) -> Self {
        self.members
            .entry(jid::bare(address).to_string())
            .or_insert(Role::Member);
        self
    }

    /// Add a moderator.
    pub fn moderator(mut self, address: &str) -> Self {
        self.members
            .insert(jid::bare(address).to_string(), Role::Moderator);
        self
    }

    /// Set the persistence setting.
    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    /// Add a supported data model.
    pub fn data_model(mut self, model: DataModel) -> Self {
        self.data_models.insert(model);
        self
    }

    /// Check the configuration can be submitted.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("The space name must not be empty.".to_string());
        }
        if self.space_type == SpaceType::Other {
            errors.push("The space type must be private, team or orga.".to_string());
        }
        if self.members.is_empty() {
            errors.push("At least one member is required.".to_string());
        }
        if !self.members.values().any(|r| *r == Role::Moderator) {
            errors.push("At least one moderator is required.".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::InvalidConfiguration(errors))
        }
    }
}
