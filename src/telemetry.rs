//! Tracing setup and span constructors.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::LogFormat;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set.
pub fn init(default_filter: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let registry = tracing_subscriber::registry().with(filter);
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = match format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    };
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Session connect, including login and discovery.
    pub fn connect(user: &str, domain: &str) -> Span {
        info_span!("connect", user = %user, domain = %domain)
    }

    /// One request/reply round-trip.
    pub fn request(id: &str, to: &str, kind: &str) -> Span {
        info_span!("request", id = %id, to = %to, kind = %kind)
    }

    /// Offline queue replay.
    pub fn replay(user: &str) -> Span {
        info_span!("replay", user = %user)
    }

    /// A space management operation.
    pub fn space_op(op: &str, space_id: Option<&str>) -> Span {
        if let Some(space_id) = space_id {
            info_span!("space_op", op = %op, space = %space_id)
        } else {
            info_span!("space_op", op = %op)
        }
    }

    /// Handling of one inbound pubsub item.
    pub fn delivery(node: &str, item_id: &str) -> Span {
        info_span!("delivery", node = %node, item = %item_id)
    }
}
