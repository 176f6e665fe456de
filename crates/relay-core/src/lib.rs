//! # relay-core
//!
//! Shared library for the state relay containing the wire protocol and the
//! session identifier types.
//!
//! This crate is used by both the relay server and the demo client.
//! It has zero dependencies on sockets, async runtimes, or logging setup.
//!
//! # Architecture overview
//!
//! The relay is a real-time state-synchronisation hub: every connected client
//! streams its own position and health, and receives the position and health
//! of every other connected client.
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – How messages travel over the wire.  Every message is a
//!   JSON *envelope* `{"type": ..., "data": ...}` whose `data` field carries the
//!   base64-encoded JSON payload for that type.
//!
//! - **`domain`** – Identifiers with no transport meaning: the [`SessionId`]
//!   stamped on every relayed update, and the allocator that keeps session ids
//!   unique among live sessions.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::Envelope` instead of `relay_core::protocol::messages::Envelope`.
pub use domain::ids::{IdAllocator, SessionId, MAX_SESSION_ID};
pub use protocol::codec::{
    decode_envelope, decode_message, encode_envelope, encode_message, ProtocolError,
};
pub use protocol::messages::{
    Envelope, Identity, MessageKind, PlayerState, Position, RelayMessage, StateUpdate,
};
