//! Infrastructure layer for relay-server.
//!
//! # Responsibilities
//!
//! - Binding the TCP listener and running the accept loop
//! - Upgrading connections on the configured path to WebSocket
//! - Adapting WebSocket frames to envelopes for the session layer
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Message dispatch and fan-out (application layer)
//! - Configuration parsing (done in `main.rs`)

pub mod connection;
pub mod ws_server;

pub use ws_server::{run_server, RelayServer};
