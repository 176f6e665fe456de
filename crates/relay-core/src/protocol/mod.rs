//! Protocol module containing the envelope, payload types and the JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_envelope, decode_message, encode_envelope, encode_message, ProtocolError};
pub use messages::*;
