//! WebSocket implementation of the connection adapter (tokio-tungstenite).
//!
//! Text and binary frames both carry one JSON envelope.  Ping and pong frames
//! are answered by tungstenite itself; the reader skips them.  A close frame
//! or the end of the stream is reported as [`TransportError::Closed`].

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

use relay_core::{decode_envelope, encode_envelope, Envelope};

use super::{EnvelopeReader, EnvelopeWriter, TransportError};

/// An upgraded server-side WebSocket connection.
pub type WsStream = WebSocketStream<TcpStream>;

/// Inbound half of a WebSocket connection.
pub struct WsEnvelopeReader {
    stream: SplitStream<WsStream>,
}

/// Outbound half of a WebSocket connection.
pub struct WsEnvelopeWriter {
    sink: SplitSink<WsStream, WsMessage>,
}

/// Splits an upgraded WebSocket into independently owned reader and writer.
pub fn split(ws: WsStream) -> (WsEnvelopeReader, WsEnvelopeWriter) {
    let (sink, stream) = ws.split();
    (WsEnvelopeReader { stream }, WsEnvelopeWriter { sink })
}

#[async_trait]
impl EnvelopeReader for WsEnvelopeReader {
    async fn receive(&mut self) -> Result<Envelope, TransportError> {
        loop {
            let frame = match self.stream.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Err(TransportError::Closed)
                }
                Some(Err(e)) => return Err(TransportError::WebSocket(e)),
            };

            match frame {
                WsMessage::Text(text) => return Ok(decode_envelope(text.as_bytes())?),
                WsMessage::Binary(bytes) => return Ok(decode_envelope(&bytes)?),
                WsMessage::Close(_) => return Err(TransportError::Closed),
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            }
        }
    }
}

#[async_trait]
impl EnvelopeWriter for WsEnvelopeWriter {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), TransportError> {
        let text = encode_envelope(envelope)?;
        self.sink.send(WsMessage::Text(text)).await?;
        Ok(())
    }
}
