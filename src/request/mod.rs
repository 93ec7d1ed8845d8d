//! Request/response correlation.
//!
//! Every remote call goes through the same protocol: register a
//! [`ResponseFuture`] under a fresh correlation id, send, then wait with a
//! bound. The reply dispatcher resolves the future when a reply with that id
//! arrives.

mod future;
mod ids;
mod pending;

pub use future::{ResponseFuture, WaitError};
pub use ids::CorrelationIds;
pub use pending::PendingRequests;
