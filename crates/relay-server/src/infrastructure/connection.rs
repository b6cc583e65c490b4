//! The frame writer: one registered connection's outbound half.
//!
//! The websocket handshake and framing (including unmasking of client
//! payloads) are handled by tokio-tungstenite; this module's job is the one
//! write primitive the rest of the server needs — "serialize an envelope
//! into a single unfragmented text frame, bounded by a deadline" — plus a
//! close that tolerates repetition.
//!
//! # The `RelayConnection` seam
//!
//! The registry and the message handler are generic over [`RelayConnection`]
//! so their locking and fan-out behavior can be unit-tested against
//! [`MockConnection`](super::mock::MockConnection) without opening sockets.
//! Production code uses [`WsConnection`], which wraps the write half of an
//! accepted tungstenite stream.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;

/// Error returned by a bounded frame write.  Never retried by the caller:
/// a failed peer is skipped and a failed acknowledgment is dropped.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The write did not complete within the configured deadline.
    #[error("write deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
    /// The underlying websocket write failed (peer closed, I/O error).
    #[error("websocket write failed: {0}")]
    Transport(#[from] WsError),
}

/// A registered connection's outbound half.
///
/// Implementations must make `close` safe to call more than once and safe to
/// call on an already-failed connection.
#[allow(async_fn_in_trait)]
pub trait RelayConnection: Send + 'static {
    /// Writes `payload` as one unfragmented text frame, failing if the write
    /// does not complete within `deadline`.
    async fn write_text(&mut self, payload: String, deadline: Duration) -> Result<(), WriteError>;

    /// Closes the connection.  Idempotent; errors are swallowed because the
    /// peer may already be gone.
    async fn close(&mut self);
}

/// Production [`RelayConnection`] over an accepted websocket's write half.
pub struct WsConnection {
    sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
}

impl WsConnection {
    /// Wraps the write half produced by splitting an upgraded stream.
    pub fn new(sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>) -> Self {
        Self { sink }
    }
}

impl RelayConnection for WsConnection {
    async fn write_text(&mut self, payload: String, deadline: Duration) -> Result<(), WriteError> {
        match timeout(deadline, self.sink.send(WsMessage::Text(payload))).await {
            Ok(result) => Ok(result?),
            Err(_elapsed) => Err(WriteError::DeadlineExceeded(deadline)),
        }
    }

    async fn close(&mut self) {
        // Sends a Close frame and flushes.  A second close, or a close on a
        // connection whose peer already vanished, returns an error we have
        // no use for.
        let _ = self.sink.close().await;
    }
}
