//! JSON codec for state relay envelopes and payloads.
//!
//! Decoding happens in two independent steps:
//!
//! 1. [`decode_envelope`] turns one WebSocket frame into an [`Envelope`].
//!    Failure here means the peer is not speaking the protocol at all.
//! 2. [`decode_message`] turns an envelope into a typed [`RelayMessage`].
//!    Failure here is local to that one message; the connection is fine.
//!
//! Encoding mirrors this: [`encode_message`] builds the envelope, and
//! [`encode_envelope`] renders it as the text frame sent on the wire.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::protocol::messages::{Envelope, MessageKind, RelayMessage};

/// Errors that can occur during envelope or payload encoding/decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame is not a JSON envelope, or its `data` is not base64.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The envelope has a known type but its payload does not match that type.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: MessageKind, reason: String },

    /// A payload could not be serialized.
    #[error("failed to encode {kind} payload: {reason}")]
    Encode { kind: MessageKind, reason: String },
}

// ── Envelope framing ──────────────────────────────────────────────────────────

/// Parses one frame (text or binary, both carry JSON) into an [`Envelope`].
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidEnvelope`] if the frame is not valid JSON,
/// lacks a `type` field, or has a known type whose `data` is not a base64
/// string.  The `data` of an unknown type is never inspected.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::decode_envelope;
///
/// let envelope = decode_envelope(br#"{"type":"login","data":"e30="}"#).unwrap();
/// assert_eq!(envelope.kind, "login");
/// assert_eq!(envelope.payload, b"{}");
/// ```
pub fn decode_envelope(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    serde_json::from_slice(frame).map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))
}

/// Renders an [`Envelope`] as the JSON text sent in one WebSocket frame.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidEnvelope`] if serialization fails.
pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    serde_json::to_string(envelope).map_err(|e| ProtocolError::InvalidEnvelope(e.to_string()))
}

// ── Typed messages ────────────────────────────────────────────────────────────

/// Decodes the payload of an envelope according to its `type`.
///
/// Returns `Ok(None)` for envelopes whose `type` is outside the known set.
/// Unknown types are not errors; callers drop them.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if the type is known but the
/// payload does not decode as that type.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::{decode_message, Envelope, RelayMessage};
///
/// let envelope = Envelope { kind: "emote".into(), payload: b"{}".to_vec() };
/// assert_eq!(decode_message(&envelope).unwrap(), None);
/// ```
pub fn decode_message(envelope: &Envelope) -> Result<Option<RelayMessage>, ProtocolError> {
    let Some(kind) = envelope.known_kind() else {
        return Ok(None);
    };
    let payload = envelope.payload.as_slice();
    let msg = match kind {
        MessageKind::Login => RelayMessage::Login(decode_payload(kind, payload)?),
        MessageKind::PlayerState => RelayMessage::PlayerState(decode_payload(kind, payload)?),
        MessageKind::State => RelayMessage::State(decode_payload(kind, payload)?),
    };
    Ok(Some(msg))
}

/// Serializes a [`RelayMessage`] into an envelope tagged with its kind.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if the payload cannot be serialized.
pub fn encode_message(msg: &RelayMessage) -> Result<Envelope, ProtocolError> {
    let kind = msg.kind();
    let payload = match msg {
        RelayMessage::Login(identity) => encode_payload(kind, identity)?,
        RelayMessage::PlayerState(state) => encode_payload(kind, state)?,
        RelayMessage::State(update) => encode_payload(kind, update)?,
    };
    Ok(Envelope::new(kind, payload))
}

fn decode_payload<T: DeserializeOwned>(kind: MessageKind, payload: &[u8]) -> Result<T, ProtocolError> {
    serde_json::from_slice(payload).map_err(|e| ProtocolError::MalformedPayload {
        kind,
        reason: e.to_string(),
    })
}

fn encode_payload<T: Serialize>(kind: MessageKind, payload: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(payload).map_err(|e| ProtocolError::Encode {
        kind,
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
