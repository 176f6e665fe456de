//! All state relay protocol message types.
//!
//! # Wire shape
//!
//! Every WebSocket message carries exactly one [`Envelope`]:
//!
//! ```json
//! {"type":"playerState","data":"eyJoZWFsdGgiOjEwMCwicG9zaXRpb24iOnsieCI6NSwieSI6OX19"}
//! ```
//!
//! `type` names the payload and `data` is the payload itself: a JSON document
//! encoded as standard base64.  The double encoding keeps the outer envelope
//! readable by routers that never look inside the payload.
//!
//! # Known payloads
//!
//! | type          | direction       | payload                                   |
//! |---------------|-----------------|-------------------------------------------|
//! | `login`       | client → server | [`Identity`]                              |
//! | `playerState` | client → server | [`PlayerState`]                           |
//! | `state`       | server → client | [`StateUpdate`]                           |

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::ids::SessionId;

// ── Message kinds ─────────────────────────────────────────────────────────────

/// The closed set of envelope tags the relay understands.
///
/// Any other tag is *not* an error: readers drop such envelopes silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `"login"` – a client announces who it is.
    Login,
    /// `"playerState"` – a client reports its own position and health.
    PlayerState,
    /// `"state"` – the relay forwards another client's position and health.
    State,
}

impl MessageKind {
    /// Returns the tag used in the envelope's `type` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Login => "login",
            MessageKind::PlayerState => "playerState",
            MessageKind::State => "state",
        }
    }

    /// Looks up a tag.  Returns `None` for tags outside the known set.
    ///
    /// Matching is exact and case-sensitive, as on the wire.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "login" => Some(MessageKind::Login),
            "playerState" => Some(MessageKind::PlayerState),
            "state" => Some(MessageKind::State),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// The outer `{type, data}` wrapper around every message.
///
/// `kind` is kept as a raw string so that envelopes with unknown tags can
/// still be framed and then ignored by the receiver.
///
/// `data` is only interpreted for known kinds.  For an unknown tag it may hold
/// any JSON value; it is discarded and the payload is left empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// Tag naming the payload type (see [`MessageKind`]).
    #[serde(rename = "type")]
    pub kind: String,
    /// Serialized payload bytes.  Base64 on the wire; `null` or absent means
    /// an empty payload.
    #[serde(rename = "data", serialize_with = "base64_data::serialize")]
    pub payload: Vec<u8>,
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            data: Option<serde_json::Value>,
        }

        let wire = Wire::deserialize(deserializer)?;
        let payload = match (MessageKind::from_tag(&wire.kind), wire.data) {
            (None, _) | (Some(_), None) => Vec::new(),
            (Some(_), Some(serde_json::Value::String(text))) => {
                base64_data::decode(&text).map_err(D::Error::custom)?
            }
            (Some(kind), Some(_)) => {
                return Err(D::Error::custom(format!(
                    "{kind} data must be a base64 string"
                )))
            }
        };
        Ok(Self {
            kind: wire.kind,
            payload,
        })
    }
}

impl Envelope {
    /// Builds an envelope for a known kind.
    pub fn new(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            payload,
        }
    }

    /// Returns the known kind of this envelope, if any.
    pub fn known_kind(&self) -> Option<MessageKind> {
        MessageKind::from_tag(&self.kind)
    }
}

/// Serde adapter: `Vec<u8>` ⇄ standard base64 string.
mod base64_data {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(text.as_bytes())
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

/// LOGIN payload: who is on the other end of a connection.
///
/// `client_id` is chosen by the client and carries no uniqueness guarantee;
/// the relay never uses it for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "clientID")]
    pub client_id: i64,
    pub username: String,
}

/// A point in the shared world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// PLAYER_STATE payload: a client's own position and health.
///
/// Any `sessionID` the client puts in this payload is ignored; the relay
/// stamps the update with the receiving session's id instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub health: i64,
    pub position: Position,
}

/// STATE payload: one client's state as relayed to every other client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub health: i64,
    pub position: Position,
    /// Session the update originated from.  Always set by the relay.
    #[serde(rename = "sessionID")]
    pub session_id: SessionId,
}

impl StateUpdate {
    /// Stamps a client-reported state with the id of the session it arrived on.
    pub fn stamped(state: PlayerState, session_id: SessionId) -> Self {
        Self {
            health: state.health,
            position: state.position,
            session_id,
        }
    }
}

// ── Typed message ─────────────────────────────────────────────────────────────

/// A decoded envelope with a known kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Login(Identity),
    PlayerState(PlayerState),
    State(StateUpdate),
}

impl RelayMessage {
    /// Returns the envelope tag for this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            RelayMessage::Login(_) => MessageKind::Login,
            RelayMessage::PlayerState(_) => MessageKind::PlayerState,
            RelayMessage::State(_) => MessageKind::State,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_tags_match_wire_names() {
        assert_eq!(MessageKind::Login.as_str(), "login");
        assert_eq!(MessageKind::PlayerState.as_str(), "playerState");
        assert_eq!(MessageKind::State.as_str(), "state");
    }

    #[test]
    fn test_message_kind_from_tag_rejects_unknown_and_wrong_case() {
        assert_eq!(MessageKind::from_tag("chat"), None);
        assert_eq!(MessageKind::from_tag("Login"), None);
        assert_eq!(MessageKind::from_tag("playerstate"), None);
        assert_eq!(MessageKind::from_tag(""), None);
    }

    #[test]
    fn test_envelope_serializes_type_and_base64_data() {
        // Arrange
        let envelope = Envelope::new(MessageKind::Login, b"{}".to_vec());

        // Act
        let json = serde_json::to_value(&envelope).unwrap();

        // Assert – "{}" is "e30=" in standard base64
        assert_eq!(json["type"], "login");
        assert_eq!(json["data"], "e30=");
    }

    #[test]
    fn test_envelope_null_or_missing_data_is_empty_payload() {
        let with_null: Envelope = serde_json::from_str(r#"{"type":"x","data":null}"#).unwrap();
        let without: Envelope = serde_json::from_str(r#"{"type":"x"}"#).unwrap();
        assert!(with_null.payload.is_empty());
        assert!(without.payload.is_empty());
    }

    #[test]
    fn test_envelope_rejects_non_base64_data() {
        let result = serde_json::from_str::<Envelope>(r#"{"type":"login","data":"%%%"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_rejects_object_data_for_known_kind() {
        let result = serde_json::from_str::<Envelope>(r#"{"type":"playerState","data":{"x":1}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_envelope_with_unknown_tag_accepts_any_data() {
        // Arrange
        let frames = [
            r#"{"type":"emote","data":{"a":1}}"#,
            r#"{"type":"emote","data":"%%% not base64"}"#,
            r#"{"type":"emote","data":[1,2,3]}"#,
        ];

        for frame in frames {
            // Act
            let envelope: Envelope = serde_json::from_str(frame).unwrap();

            // Assert
            assert_eq!(envelope.kind, "emote");
            assert!(envelope.payload.is_empty());
        }
    }

    #[test]
    fn test_known_kind_for_unknown_tag_is_none() {
        let envelope = Envelope {
            kind: "emote".to_string(),
            payload: Vec::new(),
        };
        assert_eq!(envelope.known_kind(), None);
    }

    #[test]
    fn test_state_update_uses_session_id_key() {
        // Arrange
        let update = StateUpdate::stamped(
            PlayerState {
                health: 100,
                position: Position { x: 5, y: 9 },
            },
            SessionId::new(1),
        );

        // Act
        let json = serde_json::to_value(update).unwrap();

        // Assert
        assert_eq!(
            json,
            serde_json::json!({"health": 100, "position": {"x": 5, "y": 9}, "sessionID": 1})
        );
    }

    #[test]
    fn test_identity_uses_client_id_key() {
        let identity: Identity =
            serde_json::from_str(r#"{"clientID":7,"username":"Ann"}"#).unwrap();
        assert_eq!(identity.client_id, 7);
        assert_eq!(identity.username, "Ann");
    }

    #[test]
    fn test_relay_message_kind() {
        let msg = RelayMessage::PlayerState(PlayerState {
            health: 1,
            position: Position::default(),
        });
        assert_eq!(msg.kind(), MessageKind::PlayerState);
    }
}
