//! WebSocket server: accept loop, upgrade handler, and per-user read loop.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming connections and upgrading each to a websocket
//!    session, extracting the `user` identity from the request URI.
//! 3. Registering the session (duplicate logins are rejected outright, not
//!    taken over: both connections are closed).
//! 4. Running one read loop per session that hands each text frame to the
//!    message handler as a detached task.
//! 5. Deregistering the user and closing the connection when its read loop
//!    exits.
//!
//! # Concurrency model
//!
//! One Tokio task per accepted connection plus one detached task per
//! received text frame — no worker pool, no admission control.  The accept
//! loop never blocks on a session: it spawns and moves on.  Shutdown is
//! cooperative: a shared `AtomicBool` stops the accept loop (polled with a
//! 200 ms accept timeout), and the registry's one-shot shutdown closes the
//! registered connections out from under their read loops, which observe the
//! close as end-of-stream and deregister themselves.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{Request as UpgradeRequest, Response as UpgradeResponse},
        Error as WsError, Message as WsMessage,
    },
    WebSocketStream,
};
use tracing::{error, info, warn};

use crate::application::dispatch;
use crate::domain::{user_from_query, ServerConfig};
use crate::infrastructure::connection::{RelayConnection, WsConnection};
use crate::infrastructure::registry::Registry;

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound relay listener plus the registry its sessions share.
///
/// Binding and running are separate steps so callers (and the integration
/// tests) can learn the actual address of an ephemeral-port listener, and so
/// a shutdown handler can hold the registry before the accept loop starts.
pub struct RelayServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<Registry<WsConnection>>,
}

impl RelayServer {
    /// Binds the listener described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (already in use,
    /// insufficient permission).  This is the one failure that is fatal to
    /// the process.
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("failed to bind relay listener on {}", config.listen_addr))?;
        let local_addr = listener
            .local_addr()
            .context("listener has no local address")?;
        let registry = Arc::new(Registry::new(config.write_wait));

        Ok(Self {
            config,
            listener,
            local_addr,
            registry,
        })
    }

    /// The address actually bound; differs from the configured one when an
    /// ephemeral port (port 0) was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle to the session registry, for wiring up shutdown.
    pub fn registry(&self) -> Arc<Registry<WsConnection>> {
        Arc::clone(&self.registry)
    }

    /// Runs the accept loop until `running` is cleared.
    ///
    /// Each accepted connection is handed to a dedicated task; a slow or
    /// misbehaving client never delays the next accept.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        info!(
            id = %self.config.id,
            "relay listening on {}", self.local_addr
        );

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Short accept timeout so the loop keeps checking the running
            // flag even when nobody is connecting.
            let accepted = timeout(Duration::from_millis(200), self.listener.accept()).await;

            match accepted {
                Ok(Ok((stream, peer_addr))) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        handle_session(stream, peer_addr, registry).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient accept error (e.g. fd exhaustion); keep serving.
                    error!("accept error: {e}");
                }
                Err(_elapsed) => {
                    // No connection within the poll window; re-check the flag.
                }
            }
        }

        Ok(())
    }
}

// ── Per-session upgrade handler ───────────────────────────────────────────────

/// Entry point of each per-connection task: runs the upgrade and logs the
/// outcome.  Separating the outer wrapper from [`run_session`] keeps `?`
/// available inside while every exit path still gets logged.
async fn handle_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<Registry<WsConnection>>,
) {
    if let Err(e) = run_session(raw_stream, peer_addr, registry).await {
        warn!("session with {peer_addr} aborted: {e:#}");
    }
}

/// Upgrades one inbound connection and, if it carries a valid identity that
/// is not already logged in, registers it and spawns its read loop.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<Registry<WsConnection>>,
) -> anyhow::Result<()> {
    // Capture the `user` query parameter during the handshake callback; the
    // upgraded stream no longer exposes the original request URI.
    let mut user = String::new();
    let mut ws_stream = accept_hdr_async(raw_stream, |req: &UpgradeRequest, resp: UpgradeResponse| {
        user = user_from_query(req.uri().query());
        Ok(resp)
    })
    .await
    .with_context(|| format!("websocket handshake failed with {peer_addr}"))?;

    // No identity: the upgrade succeeded but the session is refused with no
    // application-level response.
    if user.is_empty() {
        info!("connection from {peer_addr} rejected: missing user identity");
        let _ = ws_stream.close(None).await;
        return Ok(());
    }

    let (sink, stream) = ws_stream.split();
    let conn = WsConnection::new(sink);

    // Duplicate login is rejected outright — this is deliberately not a
    // takeover: the existing connection AND the new one are both closed.
    // The closed newcomer stays in the table until the evicted session's
    // read loop exits and removes the key.
    if let Some(mut previous) = registry.put(&user, conn).await {
        warn!("duplicate login for {user} from {peer_addr}: closing both connections");
        previous.close().await;
        registry.close(&user).await;
        return Ok(());
    }

    info!("user {user} in from {peer_addr}");

    // The read loop is a detached task bound to (user, conn); this session
    // task's job is done.
    tokio::spawn(async move {
        if let Err(e) = read_loop(&user, stream, &registry).await {
            warn!("read loop for {user} ended: {e}");
        }
        if let Some(mut conn) = registry.remove(&user).await {
            conn.close().await;
        }
        info!("connection of {user} closed");
    });

    Ok(())
}

// ── Read loop ─────────────────────────────────────────────────────────────────

/// Reads frames for `user` until the peer closes or a read fails.
///
/// Text frames (already unmasked by the codec) are dispatched to the message
/// handler as detached tasks — the loop never awaits a fan-out, so multiple
/// frames from one sender may be handled concurrently and out of order.
/// Every other frame kind is silently ignored.  No read deadline is applied:
/// a silent peer is never reaped by this loop alone.
async fn read_loop(
    user: &str,
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
    registry: &Arc<Registry<WsConnection>>,
) -> Result<(), WsError> {
    while let Some(frame) = stream.next().await {
        match frame? {
            WsMessage::Text(text) => {
                let registry = Arc::clone(registry);
                let sender = user.to_owned();
                tokio::spawn(async move {
                    dispatch(registry.as_ref(), &sender, &text).await;
                });
            }
            // Binary, ping, pong, close, and raw frames: ignored.  A close
            // handshake surfaces as this stream ending.
            _ => {}
        }
    }
    Ok(())
}
