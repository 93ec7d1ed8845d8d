//! spacelink - client engine for spaces-based pubsub networks.
//!
//! A [`Session`](session::Session) connects to a server, logs in and
//! discovers the spaces and persistence services. On top of it the
//! [`SpaceMembershipEngine`](spaces::SpaceMembershipEngine) manages spaces
//! and the [`DataExchangeEngine`](data::DataExchangeEngine) exchanges data
//! objects on their channels, queueing publishes locally while offline.

pub mod channels;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod mode;
pub mod net;
pub mod observer;
pub mod request;
pub mod session;
pub mod spaces;
pub mod store;
pub mod telemetry;

pub use client::Client;
pub use error::{ClientError, ClientResult};
pub use mode::Mode;
pub use spacelink_proto as proto;
