//! # spacelink-proto
//!
//! Wire and data-model types shared by the spacelink client.
//!
//! ## Contents
//!
//! - [`stanza`]: request/reply envelopes and pubsub event notifications
//! - [`object`]: opaque data objects exchanged over pubsub channels
//! - [`cdm`]: the versioned common data model attributes carried by data objects
//! - [`filter`]: predicates over data objects, usable locally or forwarded to a persistence service
//! - [`space`]: spaces, their channels, members and configuration
//! - [`codec`]: a line-delimited JSON codec for tokio (feature `tokio`)
//!
//! ## Quick Start
//!
//! ```rust
//! use spacelink_proto::object::DataObjectBuilder;
//! use spacelink_proto::stanza::{Iq, Payload, PubSubItem};
//!
//! let object = DataObjectBuilder::new("mood", "mirror:application:moodmap:mood")
//!     .attribute("modelVersion", "1.0")
//!     .content("<mood>happy</mood>")
//!     .build();
//!
//! let publish = Iq::set(
//!     "req-1",
//!     "pubsub.example.org",
//!     Payload::Publish {
//!         node: "spaces#team#42".to_string(),
//!         item: PubSubItem::with_payload(object),
//!     },
//! );
//! assert!(!publish.is_reply());
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod cdm;
#[cfg(feature = "tokio")]
pub mod codec;
pub mod error;
pub mod filter;
pub mod jid;
pub mod object;
pub mod space;
pub mod stanza;

pub use self::cdm::{CdmData, CdmVersion};
#[cfg(feature = "tokio")]
pub use self::codec::StanzaCodec;
pub use self::error::ProtocolError;
pub use self::filter::{DataObjectFilter, QueryFilter};
pub use self::object::{DataObject, DataObjectBuilder};
pub use self::space::{
    DataModel, Persistence, Role, Space, SpaceChannel, SpaceConfiguration, SpaceType,
};
pub use self::stanza::{ErrorCondition, Iq, IqKind, Payload, PubSubEvent, PubSubItem, Stanza};
