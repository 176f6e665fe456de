//! Connection adapter: one duplex, message-framed connection per client.
//!
//! A connection is split into two halves so each direction has exactly one
//! owner:
//!
//! - [`EnvelopeReader`] is owned by the session's read cycle.
//! - [`EnvelopeWriter`] is owned by the session's single writer task.
//!
//! Neither half retries.  Any error means the connection is dead and the
//! session that owns it ends.
//!
//! # Testability
//!
//! The traits let session and router tests run over in-memory channels
//! ([`memory`]) instead of real sockets ([`websocket`]).

use async_trait::async_trait;
use relay_core::{Envelope, ProtocolError};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub mod memory;
pub mod websocket;

/// Read or write failure on a connection.  Always fatal to that connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection or the stream ended.
    #[error("connection closed")]
    Closed,

    /// The WebSocket layer reported an I/O or protocol error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A frame arrived that is not a JSON envelope.
    #[error("malformed frame: {0}")]
    Malformed(#[from] ProtocolError),
}

/// The inbound half of a connection.
#[async_trait]
pub trait EnvelopeReader: Send {
    /// Waits for the next complete envelope.
    ///
    /// Transport-level control frames (ping/pong) are consumed silently.
    async fn receive(&mut self) -> Result<Envelope, TransportError>;
}

/// The outbound half of a connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnvelopeWriter: Send {
    /// Writes one envelope as one frame.  Best-effort, no retry.
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError>;
}
