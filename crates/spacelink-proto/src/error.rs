//! Error types for the protocol library.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Protocol-level errors: framing, decoding and model validation.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Underlying I/O failure while framing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded the configured maximum length.
    #[error("frame exceeds {max} bytes")]
    FrameTooLong {
        /// Configured limit.
        max: usize,
    },

    /// A frame could not be decoded into a stanza.
    #[error("malformed stanza: {0}")]
    Json(#[from] serde_json::Error),

    /// A data object failed validation against its data model version.
    #[error("invalid data object: {}", .0.join(" "))]
    InvalidObject(Vec<String>),

    /// A space configuration failed validation.
    #[error("invalid space configuration: {}", .0.join(" "))]
    InvalidConfiguration(Vec<String>),

    /// An unrecognised enumeration value.
    #[error("unknown {kind}: {value}")]
    UnknownValue {
        /// What was being parsed.
        kind: &'static str,
        /// The offending input.
        value: String,
    },
}
