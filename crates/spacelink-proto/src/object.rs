//! Opaque data objects exchanged over pubsub channels.
//!
//! The client never looks inside [`DataObject::content`]. It only reads the
//! element name and namespace, which identify the data model, and a small set
//! of protocol attributes used for bookkeeping and filtering.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::cdm::{CdmData, CdmVersion};

/// Protocol attribute names carried on data objects.
pub mod attr {
    /// Object identifier.
    pub const ID: &str = "id";
    /// Publication timestamp (RFC 3339).
    pub const TIMESTAMP: &str = "timestamp";
    /// Common data model version.
    pub const CDM_VERSION: &str = "cdmVersion";
    /// Version of the application data model.
    pub const MODEL_VERSION: &str = "modelVersion";
    /// Address of the publisher.
    pub const PUBLISHER: &str = "publisher";
    /// Identifier of a referenced object.
    pub const REF: &str = "ref";
    /// Application supplied identifier.
    pub const CUSTOM_ID: &str = "customId";
    /// Identifier of the object this one copies.
    pub const COPY_OF: &str = "copyOf";
    /// Identifier of the object this one updates.
    pub const UPDATES: &str = "updates";
    /// Creator address, used by the 0.x data model versions.
    pub const CREATOR: &str = "creator";
}

/// A data object as published to and delivered from a pubsub node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataObject {
    /// Element name of the payload.
    pub name: String,
    /// Namespace of the payload, identifying its data model.
    pub namespace: String,
    /// Protocol and model attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Serialized inner content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl DataObject {
    /// Look up an attribute, treating blank values as absent.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Object identifier.
    pub fn id(&self) -> Option<&str> {
        self.attribute(attr::ID)
    }

    /// Raw timestamp attribute.
    pub fn timestamp_raw(&self) -> Option<&str> {
        self.attribute(attr::TIMESTAMP)
    }

    /// Parsed publication timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp_raw()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    /// Declared CDM version string, if any.
    pub fn cdm_version(&self) -> Option<&str> {
        self.attribute(attr::CDM_VERSION)
    }

    /// Version of the application data model.
    pub fn model_version(&self) -> Option<&str> {
        self.attribute(attr::MODEL_VERSION)
    }

    /// Publisher address. Falls back to `creator` for 0.x objects.
    pub fn publisher(&self) -> Option<&str> {
        self.attribute(attr::PUBLISHER)
            .or_else(|| self.attribute(attr::CREATOR))
    }

    /// Identifier of the referenced object.
    pub fn reference(&self) -> Option<&str> {
        self.attribute(attr::REF)
    }

    /// Typed view of the CDM attributes, if the object conforms to any version.
    pub fn cdm_data(&self) -> Option<CdmData> {
        CdmData::from_object(self)
    }

    /// `(name, namespace)` pair identifying the data model of this object.
    pub fn model_key(&self) -> (&str, &str) {
        (&self.name, &self.namespace)
    }
}

/// Builder for outbound [`DataObject`]s.
#[derive(Debug, Clone)]
pub struct DataObjectBuilder {
    object: DataObject,
}

impl DataObjectBuilder {
    /// Start a new object with the given element name and namespace.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            object: DataObject {
                name: name.into(),
                namespace: namespace.into(),
                attributes: BTreeMap::new(),
                content: None,
            },
        }
    }

    /// Start from an existing object.
    pub fn from_object(object: DataObject) -> Self {
        Self { object }
    }

    /// Set an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.object.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the opaque inner content.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.object.content = Some(content.into());
        self
    }

    /// Declare the CDM version of the object.
    pub fn cdm_version(self, version: CdmVersion) -> Self {
        self.attribute(attr::CDM_VERSION, version.as_str())
    }

    /// Fill in a random `id` and the current `timestamp` where missing.
    pub fn stamp(mut self) -> Self {
        let attrs = &mut self.object.attributes;
        if attrs.get(attr::ID).map_or(true, |v| v.trim().is_empty()) {
            attrs.insert(attr::ID.to_string(), uuid::Uuid::new_v4().to_string());
        }
        if attrs
            .get(attr::TIMESTAMP)
            .map_or(true, |v| v.trim().is_empty())
        {
            attrs.insert(
                attr::TIMESTAMP.to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        }
        self
    }

    /// Finish building.
    pub fn build(self) -> DataObject {
        self.object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_attributes_are_absent() {
        let obj = DataObjectBuilder::new("note", "urn:test")
            .attribute("id", "  ")
            .build();
        assert_eq!(obj.id(), None);
    }

    #[test]
    fn publisher_falls_back_to_creator() {
        let obj = DataObjectBuilder::new("note", "urn:test")
            .attribute("creator", "alice@example.org/a")
            .build();
        assert_eq!(obj.publisher(), Some("alice@example.org/a"));
    }

    #[test]
    fn stamp_keeps_existing_id() {
        let obj = DataObjectBuilder::new("note", "urn:test")
            .attribute("id", "fixed")
            .stamp()
            .build();
        assert_eq!(obj.id(), Some("fixed"));
        assert!(obj.timestamp().is_some());
    }

    #[test]
    fn serde_shape_is_stable() {
        let obj = DataObjectBuilder::new("note", "urn:test")
            .attribute("id", "1")
            .content("<body/>")
            .build();
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["name"], "note");
        assert_eq!(json["attributes"]["id"], "1");
        let back: DataObject = serde_json::from_value(json).unwrap();
        assert_eq!(back, obj);
    }
}
