//! Predicates over data objects.
//!
//! [`QueryFilter`] is serializable so the same filter can be evaluated
//! locally (application validity filter, cached reads) or forwarded to a
//! persistence service as part of a query.

use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::object::DataObject;

/// Anything that can accept or reject a data object.
pub trait DataObjectFilter: Send + Sync + fmt::Debug {
    /// Whether `object` passes this filter.
    fn accepts(&self, object: &DataObject) -> bool;
}

/// How a namespace filter compares namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceCompare {
    /// Exact match.
    #[default]
    Strict,
    /// Substring match.
    Contains,
    /// Regular expression match.
    Regex,
}

/// A serializable data object filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum QueryFilter {
    /// Timestamp within the given bounds (inclusive). Open bounds are unbounded.
    Period {
        /// Lower bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<DateTime<Utc>>,
        /// Upper bound.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<DateTime<Utc>>,
    },
    /// Publisher starts with the given address.
    Publisher {
        /// Address prefix, usually a bare address.
        publisher: String,
    },
    /// Object references the given object id.
    References {
        /// Referenced object id.
        id: String,
    },
    /// Namespace comparison.
    Namespace {
        /// Namespace or pattern.
        namespace: String,
        /// Comparison mode.
        #[serde(default)]
        compare: NamespaceCompare,
    },
    /// Namespace equals and, if given, model version equals.
    DataModel {
        /// Data model namespace.
        namespace: String,
        /// Required model version.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// All inner filters accept.
    And {
        /// Inner filters.
        filters: Vec<QueryFilter>,
    },
    /// At least one inner filter accepts.
    Or {
        /// Inner filters.
        filters: Vec<QueryFilter>,
    },
}

impl QueryFilter {
    /// Objects published within `[from, to]`.
    pub fn period(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        Self::Period { from, to }
    }

    /// Objects whose publisher starts with `publisher`.
    pub fn publisher(publisher: impl Into<String>) -> Self {
        Self::Publisher {
            publisher: publisher.into(),
        }
    }

    /// Objects referencing `id`.
    pub fn references(id: impl Into<String>) -> Self {
        Self::References { id: id.into() }
    }

    /// Objects whose namespace matches `namespace` under `compare`.
    pub fn namespace(namespace: impl Into<String>, compare: NamespaceCompare) -> Self {
        Self::Namespace {
            namespace: namespace.into(),
            compare,
        }
    }

    /// Objects of a data model, optionally restricted to one model version.
    pub fn data_model(namespace: impl Into<String>, version: Option<String>) -> Self {
        Self::DataModel {
            namespace: namespace.into(),
            version,
        }
    }
}

impl DataObjectFilter for QueryFilter {
    fn accepts(&self, object: &DataObject) -> bool {
        match self {
            Self::Period { from, to } => match object.timestamp() {
                Some(ts) => from.map_or(true, |f| ts >= f) && to.map_or(true, |t| ts <= t),
                None => false,
            },
            Self::Publisher { publisher } => object
                .publisher()
                .is_some_and(|p| p.starts_with(publisher.as_str())),
            Self::References { id } => object.reference() == Some(id.as_str()),
            Self::Namespace { namespace, compare } => match compare {
                NamespaceCompare::Strict => object.namespace == *namespace,
                NamespaceCompare::Contains => object.namespace.contains(namespace.as_str()),
                // Invalid patterns match nothing.
                NamespaceCompare::Regex => Regex::new(namespace)
                    .map(|re| re.is_match(&object.namespace))
                    .unwrap_or(false),
            },
            Self::DataModel { namespace, version } => {
                object.namespace == *namespace
                    && version
                        .as_deref()
                        .map_or(true, |v| object.model_version() == Some(v))
            }
            Self::And { filters } => filters.iter().all(|f| f.accepts(object)),
            Self::Or { filters } => filters.iter().any(|f| f.accepts(object)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DataObjectBuilder;

    fn mood(ts: &str, publisher: &str) -> DataObject {
        DataObjectBuilder::new("mood", "mirror:application:moodmap:mood")
            .attribute("id", "m1")
            .attribute("timestamp", ts)
            .attribute("publisher", publisher)
            .attribute("modelVersion", "1.0")
            .attribute("ref", "m0")
            .build()
    }

    #[test]
    fn period_bounds_are_inclusive() {
        let obj = mood("2024-01-01T10:00:00Z", "a@x");
        let at = DateTime::parse_from_rfc3339("2024-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(QueryFilter::period(Some(at), Some(at)).accepts(&obj));
        assert!(QueryFilter::period(None, None).accepts(&obj));
        let later = at + chrono::Duration::seconds(1);
        assert!(!QueryFilter::period(Some(later), None).accepts(&obj));
    }

    #[test]
    fn period_rejects_unparsable_timestamp() {
        let obj = mood("yesterday", "a@x");
        assert!(!QueryFilter::period(None, None).accepts(&obj));
    }

    #[test]
    fn publisher_is_prefix_match() {
        let obj = mood("2024-01-01T10:00:00Z", "alice@example.org/phone");
        assert!(QueryFilter::publisher("alice@example.org").accepts(&obj));
        assert!(!QueryFilter::publisher("bob@example.org").accepts(&obj));
    }

    #[test]
    fn namespace_modes() {
        let obj = mood("2024-01-01T10:00:00Z", "a@x");
        assert!(QueryFilter::namespace("mirror:application:moodmap:mood", NamespaceCompare::Strict)
            .accepts(&obj));
        assert!(QueryFilter::namespace("moodmap", NamespaceCompare::Contains).accepts(&obj));
        assert!(QueryFilter::namespace("^mirror:.*:mood$", NamespaceCompare::Regex).accepts(&obj));
        assert!(!QueryFilter::namespace("(", NamespaceCompare::Regex).accepts(&obj));
    }

    #[test]
    fn combinators() {
        let obj = mood("2024-01-01T10:00:00Z", "a@x");
        let yes = QueryFilter::references("m0");
        let no = QueryFilter::data_model("mirror:application:moodmap:mood", Some("2.0".into()));
        assert!(QueryFilter::Or {
            filters: vec![no.clone(), yes.clone()]
        }
        .accepts(&obj));
        assert!(!QueryFilter::And {
            filters: vec![no, yes]
        }
        .accepts(&obj));
    }

    #[test]
    fn wire_shape_is_tagged() {
        let json = serde_json::to_value(QueryFilter::publisher("a@x")).unwrap();
        assert_eq!(json["filter"], "publisher");
    }
}
