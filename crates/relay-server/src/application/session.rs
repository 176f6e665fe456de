//! Session: one connected client, from registration to teardown.
//!
//! A session owns both halves of its connection.  The read half stays on the
//! session's own task and is processed strictly in arrival order.  The write
//! half moves into a dedicated writer task that drains the session's outbound
//! queue, so writes to one connection never interleave.
//!
//! Whichever of the two finishes first ends the session; the other is
//! cancelled and the router is told exactly once.

use std::net::SocketAddr;

use relay_core::{
    decode_message, encode_message, Envelope, Identity, MessageKind, ProtocolError, RelayMessage,
    SessionId, StateUpdate,
};
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::application::router::{OutboundQueue, RouterError, RouterHandle, SessionHandle};
use crate::infrastructure::connection::{EnvelopeReader, EnvelopeWriter, TransportError};

/// Why a session ended abnormally.  A clean close by the peer is not an error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("writer task failed: {0}")]
    Writer(#[from] JoinError),
}

/// What [`Session::handle_envelope`] did with one inbound envelope.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// A login was recorded on the session.
    LoggedIn,
    /// A player state was stamped and handed to the router.
    Published,
    /// The envelope was well-formed but not for the server to act on.
    Ignored,
    /// The payload could not be decoded; the message was dropped.
    Dropped(ProtocolError),
}

/// Per-connection state owned by the session task.
pub struct Session {
    id: SessionId,
    identity: Option<Identity>,
    router: RouterHandle,
}

impl Session {
    pub fn new(id: SessionId, router: RouterHandle) -> Self {
        Self {
            id,
            identity: None,
            router,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The identity from the client's login, if it has sent one.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Acts on one inbound envelope.
    ///
    /// A malformed payload only drops that message.  The client-supplied
    /// session id in a player state is never trusted; the update is stamped
    /// with this session's id.
    ///
    /// # Errors
    ///
    /// [`RouterError::Closed`] if the router is gone and the update cannot be
    /// published.
    pub fn handle_envelope(&mut self, envelope: &Envelope) -> Result<Dispatch, RouterError> {
        if envelope.known_kind() == Some(MessageKind::State) {
            debug!(session = %self.id, "ignoring client-sent state envelope");
            return Ok(Dispatch::Ignored);
        }

        let message = match decode_message(envelope) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(session = %self.id, kind = %envelope.kind, "ignoring unknown envelope");
                return Ok(Dispatch::Ignored);
            }
            Err(e) => {
                warn!(session = %self.id, "dropping message: {e}");
                return Ok(Dispatch::Dropped(e));
            }
        };

        match message {
            RelayMessage::Login(identity) => {
                if let Some(existing) = &self.identity {
                    debug!(
                        session = %self.id,
                        "ignoring repeated login (already {})", existing.username
                    );
                    return Ok(Dispatch::Ignored);
                }
                info!(
                    session = %self.id,
                    client_id = identity.client_id,
                    "login: {}", identity.username
                );
                self.identity = Some(identity);
                Ok(Dispatch::LoggedIn)
            }
            RelayMessage::PlayerState(state) => {
                let update = StateUpdate::stamped(state, self.id);
                debug!(
                    session = %self.id,
                    x = update.position.x,
                    y = update.position.y,
                    health = update.health,
                    "player state"
                );
                self.router.state_update(update)?;
                Ok(Dispatch::Published)
            }
            RelayMessage::State(_) => Ok(Dispatch::Ignored),
        }
    }

    /// Reads and dispatches envelopes until the connection closes.
    ///
    /// Returns `Ok(())` when the peer closed the connection cleanly.
    pub async fn read_loop<R>(&mut self, reader: &mut R) -> Result<(), SessionError>
    where
        R: EnvelopeReader + ?Sized,
    {
        loop {
            let envelope = match reader.receive().await {
                Ok(envelope) => envelope,
                Err(TransportError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            self.handle_envelope(&envelope)?;
        }
    }
}

/// Drains `outbound`, writing each update as a `state` envelope.
///
/// Returns `Ok(())` when the queue is closed, or the first write error.
/// The queue is dropped on return, so later deliveries to this session fail.
pub async fn write_loop<W>(
    writer: &mut W,
    mut outbound: OutboundQueue,
    id: SessionId,
) -> Result<(), TransportError>
where
    W: EnvelopeWriter + ?Sized,
{
    while let Some(update) = outbound.recv().await {
        let envelope = encode_message(&RelayMessage::State(update))?;
        writer.send(&envelope).await?;
        debug!(session = %id, origin = %update.session_id, "state delivered");
    }
    Ok(())
}

/// Runs one session to completion over an already-upgraded connection.
///
/// 1. Registers with the router and receives the session id.
/// 2. Spawns the writer task.
/// 3. Runs the read loop until it or the writer finishes.
/// 4. Cancels the other half and unregisters.
///
/// # Errors
///
/// Returns the transport or router error that ended the session.  A clean
/// close by the peer returns `Ok(())`.
pub async fn run_session<R, W>(
    mut reader: R,
    mut writer: W,
    router: RouterHandle,
    peer: SocketAddr,
) -> Result<(), SessionError>
where
    R: EnvelopeReader,
    W: EnvelopeWriter + 'static,
{
    // ── Step 1: register and receive the id ──
    // The router keeps the sending side; `outbound` feeds this session's writer.
    let (handle, outbound) = SessionHandle::channel();
    let id = router.session_started(handle).await?;
    info!(session = %id, %peer, "session started");

    // ── Step 2: hand the write half to its own task ──
    let mut writer_task = tokio::spawn(async move { write_loop(&mut writer, outbound, id).await });
    let mut session = Session::new(id, router.clone());

    // ── Step 3: read until either half finishes ──
    // A read loop ending (close, transport or envelope error) and a writer
    // failing both end the session; the first one to finish decides `result`.
    let result = tokio::select! {
        read = session.read_loop(&mut reader) => read,
        written = &mut writer_task => match written {
            Ok(outcome) => outcome.map_err(SessionError::from),
            Err(e) => Err(SessionError::Writer(e)),
        },
    };

    // ── Step 4: tear down exactly once ──
    // Aborting a finished task is a no-op, so this covers both select arms.
    writer_task.abort();
    router.session_ended(id);

    let username = session.identity().map(|i| i.username.as_str()).unwrap_or("-");
    match &result {
        Ok(()) => info!(session = %id, %peer, "session ended ({username})"),
        Err(e) => warn!(session = %id, %peer, "session ended ({username}): {e}"),
    }
    result
}

// ── Tests ─────────────────────────────────────────────────────────────────────
