//! Integration test common infrastructure.
//!
//! Provides an in-process scripted server and a client wired to it over a
//! memory link, plus observers that record what the client reports.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
