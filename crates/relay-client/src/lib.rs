//! relay-client library crate.
//!
//! A minimal client for the state relay, used for manual testing and demos:
//!
//! 1. Connect to the relay's WebSocket endpoint.
//! 2. Send one `login` with a random client id.
//! 3. Send a `playerState` with a random position at a fixed interval.
//! 4. Concurrently log every `state` the relay forwards from other clients.
//!
//! A failed write or a lost connection ends [`run`] with an error.  Bad or
//! unknown inbound envelopes are logged and skipped.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relay_core::{
    decode_envelope, decode_message, encode_envelope, encode_message, Envelope, Identity,
    PlayerState, Position, ProtocolError, RelayMessage, StateUpdate,
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Relay endpoint used when none is given.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:40000/ws";

/// Health reported in every player state.
pub const FULL_HEALTH: i64 = 100;

/// Positions are drawn from `0..WORLD_SIZE` on both axes.
pub const WORLD_SIZE: i64 = 1000;

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Error type for the demo client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: WsError,
    },

    #[error("failed to send to relay: {0}")]
    Send(#[source] WsError),

    #[error("connection to relay lost")]
    ConnectionLost,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Settings for one client run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub username: String,
    /// Time between two player-state updates.
    pub interval: Duration,
    /// Stop cleanly after this many updates.  `None` runs until an error.
    pub max_updates: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            username: "player".to_string(),
            interval: Duration::from_millis(1000),
            max_updates: None,
        }
    }
}

// ── Pure helpers ──────────────────────────────────────────────────────────────

/// Draws a process-local client id.  Not unique across clients or restarts.
pub fn random_client_id<R: Rng + ?Sized>(rng: &mut R) -> i64 {
    rng.gen_range(0..i64::MAX)
}

/// Builds the `login` envelope for `username`.
///
/// # Errors
///
/// Propagates [`ProtocolError::Encode`] from the codec.
pub fn login_envelope(client_id: i64, username: &str) -> Result<Envelope, ProtocolError> {
    encode_message(&RelayMessage::Login(Identity {
        client_id,
        username: username.to_string(),
    }))
}

/// A full-health state at a random position in the world.
pub fn random_player_state<R: Rng + ?Sized>(rng: &mut R) -> PlayerState {
    PlayerState {
        health: FULL_HEALTH,
        position: Position {
            x: rng.gen_range(0..WORLD_SIZE),
            y: rng.gen_range(0..WORLD_SIZE),
        },
    }
}

/// Parses one inbound text frame.
///
/// Returns `Ok(Some(_))` for a `state` message and `Ok(None)` for any other
/// well-formed envelope.
///
/// # Errors
///
/// Returns a [`ProtocolError`] if the frame or its payload cannot be decoded.
pub fn parse_state(frame: &str) -> Result<Option<StateUpdate>, ProtocolError> {
    let envelope = decode_envelope(frame.as_bytes())?;
    match decode_message(&envelope)? {
        Some(RelayMessage::State(update)) => Ok(Some(update)),
        _ => Ok(None),
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// Connects, logs in and publishes until an error or `max_updates` is reached.
///
/// # Errors
///
/// Returns [`ClientError::Connect`] if the relay is unreachable,
/// [`ClientError::Send`] on a failed write, and [`ClientError::ConnectionLost`]
/// if the relay closes the connection.
pub async fn run(config: ClientConfig) -> Result<(), ClientError> {
    let (ws, _response) = connect_async(config.url.as_str())
        .await
        .map_err(|source| ClientError::Connect {
            url: config.url.clone(),
            source,
        })?;
    info!("connected to {}", config.url);

    let (mut sink, stream) = ws.split();
    let mut rng = StdRng::from_entropy();

    let client_id = random_client_id(&mut rng);
    send_envelope(&mut sink, &login_envelope(client_id, &config.username)?).await?;
    info!(client_id, "logged in as {}", config.username);

    let mut reader = tokio::spawn(log_states(stream));

    let result = tokio::select! {
        published = publish_states(&mut sink, &mut rng, &config) => published,
        _ = &mut reader => Err(ClientError::ConnectionLost),
    };
    reader.abort();

    if result.is_ok() {
        // Best-effort close; the relay cleans up either way.
        let _ = sink.close().await;
    }
    result
}

async fn send_envelope(
    sink: &mut SplitSink<ClientStream, WsMessage>,
    envelope: &Envelope,
) -> Result<(), ClientError> {
    let text = encode_envelope(envelope)?;
    sink.send(WsMessage::Text(text))
        .await
        .map_err(ClientError::Send)
}

async fn publish_states(
    sink: &mut SplitSink<ClientStream, WsMessage>,
    rng: &mut StdRng,
    config: &ClientConfig,
) -> Result<(), ClientError> {
    let mut ticker = tokio::time::interval(config.interval);
    let mut sent: u64 = 0;

    while config.max_updates.map_or(true, |max| sent < max) {
        ticker.tick().await;
        let state = random_player_state(rng);
        let envelope = encode_message(&RelayMessage::PlayerState(state))?;
        send_envelope(sink, &envelope).await?;
        sent += 1;
        debug!(
            x = state.position.x,
            y = state.position.y,
            "sent player state #{sent}"
        );
    }
    Ok(())
}

/// Logs forwarded states until the connection ends.
async fn log_states(mut stream: SplitStream<ClientStream>) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("read error: {e}");
                break;
            }
        };

        match parse_state(&text) {
            Ok(Some(update)) => info!(
                session = %update.session_id,
                x = update.position.x,
                y = update.position.y,
                health = update.health,
                "peer state"
            ),
            Ok(None) => debug!("ignoring non-state message"),
            Err(e) => warn!("skipping bad message: {e}"),
        }
    }
    info!("relay closed the connection");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
