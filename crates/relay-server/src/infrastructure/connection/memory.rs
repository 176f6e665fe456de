//! In-memory connection for unit and integration testing.
//!
//! [`memory_connection`] returns the two server-side halves plus a
//! [`MemoryPeer`] that plays the client: it injects inbound envelopes, reads
//! what the server wrote, and can simulate a dropped connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use relay_core::Envelope;
use tokio::sync::mpsc;

use super::{EnvelopeReader, EnvelopeWriter, TransportError};

/// Server-side inbound half backed by a channel.
pub struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<Result<Envelope, TransportError>>,
}

/// Server-side outbound half backed by a channel.
pub struct MemoryWriter {
    outbound: mpsc::UnboundedSender<Envelope>,
    broken: Arc<AtomicBool>,
}

/// The client end of an in-memory connection.
pub struct MemoryPeer {
    inbound: Option<mpsc::UnboundedSender<Result<Envelope, TransportError>>>,
    outbound: mpsc::UnboundedReceiver<Envelope>,
    broken: Arc<AtomicBool>,
}

/// Creates a connected (reader, writer, peer) triple.
pub fn memory_connection() -> (MemoryReader, MemoryWriter, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let broken = Arc::new(AtomicBool::new(false));
    (
        MemoryReader { inbound: in_rx },
        MemoryWriter {
            outbound: out_tx,
            broken: Arc::clone(&broken),
        },
        MemoryPeer {
            inbound: Some(in_tx),
            outbound: out_rx,
            broken,
        },
    )
}

impl MemoryPeer {
    /// Delivers an envelope to the server's reader.
    ///
    /// Silently does nothing after [`MemoryPeer::drop_connection`].
    pub fn send(&self, envelope: Envelope) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(envelope));
        }
    }

    /// Simulates the connection dying: the reader sees
    /// [`TransportError::Closed`] once queued envelopes are drained, and every
    /// later write fails.
    pub fn drop_connection(&mut self) {
        self.inbound = None;
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Makes every later write fail while leaving reads intact.
    pub fn break_writes(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Waits for the next envelope the server wrote.
    ///
    /// Returns `None` once the server-side writer has been dropped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.outbound.recv().await
    }

    /// Returns an envelope the server already wrote, without waiting.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.outbound.try_recv().ok()
    }
}

#[async_trait]
impl EnvelopeReader for MemoryReader {
    async fn receive(&mut self) -> Result<Envelope, TransportError> {
        match self.inbound.recv().await {
            Some(result) => result,
            None => Err(TransportError::Closed),
        }
    }
}

#[async_trait]
impl EnvelopeWriter for MemoryWriter {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(envelope.clone())
            .map_err(|_| TransportError::Closed)
    }
}
