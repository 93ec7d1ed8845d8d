//! Unified error handling for spacelink.
//!
//! Every public operation fails with one [`ClientError`]. Lower layers have
//! their own error types ([`TransportError`], [`StoreError`]) which are
//! wrapped when they surface.

use spacelink_proto::stanza::{ErrorCondition, StanzaError};
use spacelink_proto::ProtocolError;
use thiserror::Error;

pub use crate::net::TransportError;
pub use crate::store::StoreError;

/// Convenience alias for results of public operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the session and the engines.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connect or login failed.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("session is already connected")]
    AlreadyConnected,

    /// A required service was not discovered or is not offered.
    #[error("not supported by server: {0}")]
    UnsupportedByServer(String),

    #[error("account already exists: {0}")]
    AccountExists(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No reply within the bound. The request is not retried.
    #[error("request {id} to {to} timed out after {timeout_ms} ms")]
    RequestTimedOut {
        id: String,
        to: String,
        timeout_ms: u64,
    },

    /// The server refused the request.
    #[error("rejected by server: {0}")]
    Rejected(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Role check failed.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("unknown space: {0}")]
    UnknownSpace(String),

    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Attempted while the effective mode is offline.
    #[error("operation requires online mode")]
    RequiresOnline,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::AlreadyConnected => "already_connected",
            Self::UnsupportedByServer(_) => "unsupported_by_server",
            Self::AccountExists(_) => "account_exists",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RequestTimedOut { .. } => "request_timed_out",
            Self::Rejected(_) => "rejected",
            Self::InvalidData(_) => "invalid_data",
            Self::AccessDenied(_) => "access_denied",
            Self::NotAuthorized(_) => "not_authorized",
            Self::UnknownSpace(_) => "unknown_space",
            Self::UnknownEntity(_) => "unknown_entity",
            Self::RequiresOnline => "requires_online",
            Self::Store(_) => "store_error",
            Self::Transport(_) => "transport_error",
        }
    }

    /// Translate a server-signaled error into the generic taxonomy.
    ///
    /// Components with more specific mappings match on the condition first.
    pub fn from_stanza_error(err: &StanzaError) -> Self {
        match err.condition {
            ErrorCondition::BadRequest | ErrorCondition::NotAcceptable => {
                Self::InvalidData(err.to_string())
            }
            ErrorCondition::Forbidden
            | ErrorCondition::NotAllowed
            | ErrorCondition::NotAuthorized => Self::NotAuthorized(err.to_string()),
            ErrorCondition::ItemNotFound => Self::UnknownEntity(err.to_string()),
            ErrorCondition::FeatureNotImplemented | ErrorCondition::ServiceUnavailable => {
                Self::UnsupportedByServer(err.to_string())
            }
            _ => Self::Rejected(err.to_string()),
        }
    }

    /// Whether this error came from a local failure rather than the server.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Transport(_))
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidConfiguration(_) | ProtocolError::InvalidObject(_) => {
                Self::InvalidData(err.to_string())
            }
            other => Self::Transport(TransportError::Protocol(other)),
        }
    }
}
