//! The programmatic relay client.
//!
//! [`RelayClient::login`] opens the websocket session and splits it in two:
//! the write half stays on the client for sending requests, and the read half
//! moves into a background read pump that routes every inbound frame by its
//! envelope type — acknowledgments (type 2) resolve the pending request with
//! the matching sequence number, notifies (type 3) are pushed to the channel
//! handed back from `login`, and anything else is ignored.
//!
//! Requests are numbered by a [`SequenceCounter`], so several requests can be
//! in flight on one connection without their acknowledgments getting crossed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::debug;

use relay_core::protocol::{Envelope, MessageType, SequenceCounter};

// ── Public API ────────────────────────────────────────────────────────────────

/// How long [`RelayClient::request`] waits for the server's acknowledgment
/// before giving up on it.
pub const ACK_WAIT: Duration = Duration::from_secs(10);

/// Buffered notifies before the read pump blocks on a slow consumer.
const NOTIFY_BUFFER: usize = 64;

/// Errors surfaced by [`RelayClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The handshake, a send, or the connection teardown failed.
    #[error("websocket transport error: {0}")]
    Transport(#[from] WsError),

    /// The server did not acknowledge the request within [`ACK_WAIT`].
    #[error("no acknowledgment for sequence {sequence} within {wait:?}")]
    AckTimeout {
        /// Sequence number of the unacknowledged request.
        sequence: i64,
        /// How long the client waited.
        wait: Duration,
    },

    /// The connection closed while an acknowledgment was still outstanding.
    #[error("connection closed before the acknowledgment arrived")]
    ConnectionClosed,
}

type ClientSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type ClientStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Acknowledgment channels for requests still waiting, keyed by sequence
/// number.
type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Envelope>>>>;

/// A logged-in relay session.
///
/// # Examples
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), relay_client::ClientError> {
/// use relay_client::RelayClient;
///
/// let (mut client, mut notifies) = RelayClient::login("ws://127.0.0.1:8000", "a").await?;
/// let ack = client.request("hello, everyone").await?;
/// assert_eq!(ack.message, "ok");
/// if let Some(envelope) = notifies.recv().await {
///     println!("{:?} says: {}", envelope.from, envelope.message);
/// }
/// client.logout().await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayClient {
    user: String,
    sink: ClientSink,
    sequence: SequenceCounter,
    pending: PendingMap,
    pump: JoinHandle<()>,
}

impl RelayClient {
    /// Connects to the relay at `url` (e.g. `ws://127.0.0.1:8000`) and logs
    /// in as `user`.
    ///
    /// Returns the session plus the channel on which relayed messages from
    /// other users arrive.  Note that the relay rejects a duplicate identity
    /// by closing the connection *after* the handshake, so a second login
    /// under a live identity succeeds here and then observes the channel
    /// closing.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP connection or websocket handshake fails.
    pub async fn login(
        url: &str,
        user: &str,
    ) -> Result<(Self, mpsc::Receiver<Envelope>), ClientError> {
        let request_url = format!("{}/?user={user}", url.trim_end_matches('/'));
        let (ws_stream, _response) = connect_async(&request_url).await?;
        debug!("logged in as {user} at {url}");

        let (sink, stream) = ws_stream.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_BUFFER);
        let pump = tokio::spawn(read_pump(stream, Arc::clone(&pending), notify_tx));

        Ok((
            Self {
                user: user.to_owned(),
                sink,
                sequence: SequenceCounter::new(),
                pending,
                pump,
            },
            notify_rx,
        ))
    }

    /// The identity this session logged in under.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Sends `message` to every other connected user and waits for the
    /// server's acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AckTimeout`] when no acknowledgment arrives
    /// within [`ACK_WAIT`], and [`ClientError::ConnectionClosed`] when the
    /// connection ends while the request is outstanding.
    pub async fn request(&mut self, message: &str) -> Result<Envelope, ClientError> {
        let sequence = self.sequence.next();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending.lock().await.insert(sequence, ack_tx);

        let envelope = Envelope {
            sequence,
            kind: MessageType::Request,
            message: message.to_owned(),
            from: None,
        };
        if let Err(e) = self.sink.send(WsMessage::Text(envelope.encode())).await {
            self.pending.lock().await.remove(&sequence);
            return Err(ClientError::Transport(e));
        }

        match timeout(ACK_WAIT, ack_rx).await {
            Ok(Ok(ack)) => Ok(ack),
            // The read pump drains the pending map when the stream ends.
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_elapsed) => {
                self.pending.lock().await.remove(&sequence);
                Err(ClientError::AckTimeout {
                    sequence,
                    wait: ACK_WAIT,
                })
            }
        }
    }

    /// Closes the session and waits for the read pump to wind down.
    ///
    /// # Errors
    ///
    /// Returns an error if sending the close frame fails; a connection that
    /// is already closed is not an error.
    pub async fn logout(mut self) -> Result<(), ClientError> {
        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => {}
            Err(e) => return Err(ClientError::Transport(e)),
        }
        // The pump exits once the server's side of the close handshake lands.
        let _ = timeout(ACK_WAIT, self.pump).await;
        debug!("logged out {}", self.user);
        Ok(())
    }
}

// ── Read pump ─────────────────────────────────────────────────────────────────

/// Routes inbound frames until the connection ends, then fails every request
/// still waiting for its acknowledgment.
async fn read_pump(
    mut stream: ClientStream,
    pending: PendingMap,
    notifies: mpsc::Sender<Envelope>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            // Binary, ping, pong, close, and raw frames: nothing to route.
            Ok(_) => continue,
            Err(e) => {
                debug!("read pump ending: {e}");
                break;
            }
        };

        let envelope = Envelope::decode_lossy(&text);
        match envelope.kind {
            MessageType::Response => {
                if let Some(ack_tx) = pending.lock().await.remove(&envelope.sequence) {
                    let _ = ack_tx.send(envelope);
                } else {
                    debug!("unmatched acknowledgment for sequence {}", envelope.sequence);
                }
            }
            MessageType::Notify => {
                // A dropped receiver is fine; keep pumping so outstanding
                // requests still get their acknowledgments.
                let _ = notifies.send(envelope).await;
            }
            other => {
                debug!("ignoring inbound frame of type {:?}", i64::from(other));
            }
        }
    }

    // Dropping the senders wakes every waiter with a closed-channel error.
    pending.lock().await.clear();
}
