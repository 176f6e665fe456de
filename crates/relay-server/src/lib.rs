//! relay-server library crate.
//!
//! A real-time state relay: clients connect over WebSocket, report their own
//! position and health, and receive every other client's updates.
//!
//! # Architecture
//!
//! ```text
//! Client (JSON envelopes over WebSocket)
//!         ↕
//! [relay-server]
//!   ├── domain/           ServerConfig
//!   ├── application/
//!   │     ├── session     one task per client: read loop + writer task
//!   │     └── router      registry + fan-out, one task, mailbox-driven
//!   └── infrastructure/
//!         ├── ws_server   accept loop, path check, WebSocket upgrade
//!         └── connection  envelope reader/writer over WebSocket or memory
//! ```

/// Domain layer: configuration types.
pub mod domain;

/// Application layer: sessions and the router.
pub mod application;

/// Infrastructure layer: listener, WebSocket adapter.
pub mod infrastructure;
