//! Domain layer for relay-server.
//!
//! Plain configuration types with no I/O beyond reading a config file on
//! request.  Message and id types live in `relay-core`, shared with clients.

pub mod config;

pub use config::{ConfigError, ServerConfig};
