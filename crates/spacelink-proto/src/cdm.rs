//! Versioned common data model (CDM) attributes.
//!
//! Every data object declares, or implies, one of four CDM versions. Each
//! version is a variant of [`CdmData`] with its own validation function.
//! Objects without a usable `cdmVersion` attribute are classified by
//! [`probe_cdm_version`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::object::{attr, DataObject};

/// Known CDM versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CdmVersion {
    /// CDM 0.1
    #[serde(rename = "0.1")]
    V0_1,
    /// CDM 0.2
    #[serde(rename = "0.2")]
    V0_2,
    /// CDM 1.0
    #[serde(rename = "1.0")]
    V1_0,
    /// CDM 2.0
    #[serde(rename = "2.0")]
    V2_0,
}

impl CdmVersion {
    /// Order in which versions are tried when an object does not declare one.
    pub const PROBE_ORDER: [CdmVersion; 4] = [
        CdmVersion::V2_0,
        CdmVersion::V1_0,
        CdmVersion::V0_2,
        CdmVersion::V0_1,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V0_1 => "0.1",
            Self::V0_2 => "0.2",
            Self::V1_0 => "1.0",
            Self::V2_0 => "2.0",
        }
    }

    /// Attribute problems of `object` with respect to this version. Empty means valid.
    pub fn verify(&self, object: &DataObject) -> Vec<String> {
        match self {
            Self::V0_1 => CdmV0_1::verify(object),
            Self::V0_2 => CdmV0_2::verify(object),
            Self::V1_0 => CdmV1_0::verify(object),
            Self::V2_0 => CdmV2_0::verify(object),
        }
    }
}

impl fmt::Display for CdmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CdmVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0.1" => Ok(Self::V0_1),
            "0.2" => Ok(Self::V0_2),
            "1.0" => Ok(Self::V1_0),
            "2.0" => Ok(Self::V2_0),
            other => Err(ProtocolError::UnknownValue {
                kind: "cdm version",
                value: other.to_string(),
            }),
        }
    }
}

fn require(object: &DataObject, key: &str, errors: &mut Vec<String>) {
    if object.attribute(key).is_none() {
        errors.push(format!("Missing or empty attribute: {}.", key));
    }
}

fn owned(object: &DataObject, key: &str) -> Option<String> {
    object.attribute(key).map(str::to_string)
}

fn required(object: &DataObject, key: &str) -> String {
    object.attribute(key).unwrap_or_default().to_string()
}

/// CDM 0.1 attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdmV0_1 {
    /// Object identifier.
    pub id: String,
    /// Publication timestamp.
    pub timestamp: String,
    /// Creator address.
    pub creator: Option<String>,
}

impl CdmV0_1 {
    fn verify(object: &DataObject) -> Vec<String> {
        let mut errors = Vec::new();
        require(object, attr::ID, &mut errors);
        require(object, attr::TIMESTAMP, &mut errors);
        errors
    }

    fn extract(object: &DataObject) -> Self {
        Self {
            id: required(object, attr::ID),
            timestamp: required(object, attr::TIMESTAMP),
            creator: owned(object, attr::CREATOR),
        }
    }
}

/// CDM 0.2 attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdmV0_2 {
    /// Object identifier.
    pub id: String,
    /// Publication timestamp.
    pub timestamp: String,
    /// Creator address.
    pub creator: Option<String>,
    /// Referenced object.
    pub reference: Option<String>,
}

impl CdmV0_2 {
    fn verify(object: &DataObject) -> Vec<String> {
        CdmV0_1::verify(object)
    }

    fn extract(object: &DataObject) -> Self {
        Self {
            id: required(object, attr::ID),
            timestamp: required(object, attr::TIMESTAMP),
            creator: owned(object, attr::CREATOR),
            reference: owned(object, attr::REF),
        }
    }
}

/// CDM 1.0 attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdmV1_0 {
    /// Object identifier.
    pub id: String,
    /// Publication timestamp.
    pub timestamp: String,
    /// Application data model version.
    pub model_version: String,
    /// Application supplied identifier.
    pub custom_id: Option<String>,
    /// Publisher address.
    pub publisher: Option<String>,
    /// Referenced object.
    pub reference: Option<String>,
}

impl CdmV1_0 {
    fn verify(object: &DataObject) -> Vec<String> {
        let mut errors = CdmV0_1::verify(object);
        require(object, attr::MODEL_VERSION, &mut errors);
        errors
    }

    fn extract(object: &DataObject) -> Self {
        Self {
            id: required(object, attr::ID),
            timestamp: required(object, attr::TIMESTAMP),
            model_version: required(object, attr::MODEL_VERSION),
            custom_id: owned(object, attr::CUSTOM_ID),
            publisher: owned(object, attr::PUBLISHER),
            reference: owned(object, attr::REF),
        }
    }
}

/// CDM 2.0 attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdmV2_0 {
    /// Attributes shared with 1.0.
    pub base: CdmV1_0,
    /// Identifier of the object this one updates.
    pub updates: Option<String>,
    /// Identifier of the object this one copies.
    pub copy_of: Option<String>,
}

impl CdmV2_0 {
    fn verify(object: &DataObject) -> Vec<String> {
        CdmV1_0::verify(object)
    }

    fn extract(object: &DataObject) -> Self {
        Self {
            base: CdmV1_0::extract(object),
            updates: owned(object, attr::UPDATES),
            copy_of: owned(object, attr::COPY_OF),
        }
    }
}

/// CDM attributes of a data object, tagged by version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdmData {
    /// CDM 0.1
    V0_1(CdmV0_1),
    /// CDM 0.2
    V0_2(CdmV0_2),
    /// CDM 1.0
    V1_0(CdmV1_0),
    /// CDM 2.0
    V2_0(CdmV2_0),
}

impl CdmData {
    /// Validate `object` against `version` and extract its attributes.
    pub fn parse(version: CdmVersion, object: &DataObject) -> Result<Self, ProtocolError> {
        let errors = version.verify(object);
        if !errors.is_empty() {
            return Err(ProtocolError::InvalidObject(errors));
        }
        Ok(match version {
            CdmVersion::V0_1 => Self::V0_1(CdmV0_1::extract(object)),
            CdmVersion::V0_2 => Self::V0_2(CdmV0_2::extract(object)),
            CdmVersion::V1_0 => Self::V1_0(CdmV1_0::extract(object)),
            CdmVersion::V2_0 => Self::V2_0(CdmV2_0::extract(object)),
        })
    }

    /// Classify an object.
    ///
    /// A recognised `cdmVersion` attribute is authoritative: if the object does
    /// not validate against it, the result is `None`. Without a recognised
    /// version the object is probed with [`probe_cdm_version`].
    pub fn from_object(object: &DataObject) -> Option<Self> {
        let declared = object
            .cdm_version()
            .and_then(|v| v.parse::<CdmVersion>().ok());
        match declared {
            Some(version) => Self::parse(version, object).ok(),
            None => probe_cdm_version(object).and_then(|v| Self::parse(v, object).ok()),
        }
    }

    /// Version of this variant.
    pub fn version(&self) -> CdmVersion {
        match self {
            Self::V0_1(_) => CdmVersion::V0_1,
            Self::V0_2(_) => CdmVersion::V0_2,
            Self::V1_0(_) => CdmVersion::V1_0,
            Self::V2_0(_) => CdmVersion::V2_0,
        }
    }

    /// Object identifier.
    pub fn id(&self) -> &str {
        match self {
            Self::V0_1(d) => &d.id,
            Self::V0_2(d) => &d.id,
            Self::V1_0(d) => &d.id,
            Self::V2_0(d) => &d.base.id,
        }
    }

    /// Publication timestamp.
    pub fn timestamp(&self) -> &str {
        match self {
            Self::V0_1(d) => &d.timestamp,
            Self::V0_2(d) => &d.timestamp,
            Self::V1_0(d) => &d.timestamp,
            Self::V2_0(d) => &d.base.timestamp,
        }
    }

    /// Publisher, or creator for 0.x versions.
    pub fn publisher(&self) -> Option<&str> {
        match self {
            Self::V0_1(d) => d.creator.as_deref(),
            Self::V0_2(d) => d.creator.as_deref(),
            Self::V1_0(d) => d.publisher.as_deref(),
            Self::V2_0(d) => d.base.publisher.as_deref(),
        }
    }

    /// Referenced object, where the version supports references.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::V0_1(_) => None,
            Self::V0_2(d) => d.reference.as_deref(),
            Self::V1_0(d) => d.reference.as_deref(),
            Self::V2_0(d) => d.base.reference.as_deref(),
        }
    }

    /// Application data model version, for 1.0 and later.
    pub fn model_version(&self) -> Option<&str> {
        match self {
            Self::V0_1(_) | Self::V0_2(_) => None,
            Self::V1_0(d) => Some(&d.model_version),
            Self::V2_0(d) => Some(&d.base.model_version),
        }
    }
}

/// Guess the CDM version of an object that does not declare one.
///
/// Compatibility shim for publishers that omit `cdmVersion`. Versions are
/// tried newest first (2.0, 1.0, 0.2, 0.1) and the first one the object
/// validates against wins. An object with `id`, `timestamp` and
/// `modelVersion` therefore always resolves to 2.0, even though it also
/// satisfies 1.0.
pub fn probe_cdm_version(object: &DataObject) -> Option<CdmVersion> {
    CdmVersion::PROBE_ORDER
        .into_iter()
        .find(|version| version.verify(object).is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DataObjectBuilder;

    fn object(attrs: &[(&str, &str)]) -> DataObject {
        attrs
            .iter()
            .fold(DataObjectBuilder::new("mood", "urn:mood"), |b, (k, v)| {
                b.attribute(*k, *v)
            })
            .build()
    }

    #[test]
    fn probe_prefers_newest_valid_version() {
        let obj = object(&[("id", "1"), ("timestamp", "t"), ("modelVersion", "1.0")]);
        assert_eq!(probe_cdm_version(&obj), Some(CdmVersion::V2_0));
    }

    #[test]
    fn probe_falls_back_to_zero_two() {
        let obj = object(&[("id", "1"), ("timestamp", "t")]);
        assert_eq!(probe_cdm_version(&obj), Some(CdmVersion::V0_2));
    }

    #[test]
    fn probe_fails_without_id() {
        let obj = object(&[("timestamp", "t")]);
        assert_eq!(probe_cdm_version(&obj), None);
        assert!(CdmData::from_object(&obj).is_none());
    }

    #[test]
    fn declared_version_is_authoritative() {
        let obj = object(&[("id", "1"), ("timestamp", "t"), ("cdmVersion", "1.0")]);
        assert!(CdmData::from_object(&obj).is_none());

        let obj = object(&[("id", "1"), ("timestamp", "t"), ("cdmVersion", "0.1")]);
        let data = CdmData::from_object(&obj).unwrap();
        assert_eq!(data.version(), CdmVersion::V0_1);
    }

    #[test]
    fn unknown_declared_version_is_probed() {
        let obj = object(&[("id", "1"), ("timestamp", "t"), ("cdmVersion", "9.9")]);
        assert_eq!(
            CdmData::from_object(&obj).map(|d| d.version()),
            Some(CdmVersion::V0_2)
        );
    }

    #[test]
    fn verify_lists_every_missing_attribute() {
        let obj = object(&[]);
        let errors = CdmVersion::V1_0.verify(&obj);
        assert_eq!(errors.len(), 3);
        assert!(errors[2].contains("modelVersion"));
    }

    #[test]
    fn version_accessors() {
        let obj = object(&[
            ("id", "1"),
            ("timestamp", "t"),
            ("modelVersion", "2"),
            ("publisher", "bob@example.org"),
            ("ref", "0"),
            ("copyOf", "x"),
        ]);
        let data = CdmData::parse(CdmVersion::V2_0, &obj).unwrap();
        assert_eq!(data.publisher(), Some("bob@example.org"));
        assert_eq!(data.reference(), Some("0"));
        assert_eq!(data.model_version(), Some("2"));
        match data {
            CdmData::V2_0(v2) => assert_eq!(v2.copy_of.as_deref(), Some("x")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
