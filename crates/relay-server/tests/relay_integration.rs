//! End-to-end tests for the relay over real sockets.
//!
//! Each test binds a listener on an ephemeral port, connects plain
//! tokio-tungstenite clients to it, and asserts on the exact JSON frames the
//! relay produces.  The registry handle returned by the server is used to
//! wait for registrations and deregistrations instead of sleeping, since a
//! client's handshake completes slightly before the server registers it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use relay_server::domain::ServerConfig;
use relay_server::infrastructure::{RelayServer, Registry, WsConnection};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for any single wait in these tests.
const STEP: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Binds a relay on an ephemeral port and runs its accept loop in the
/// background.  The running flag keeps the loop alive for the test's
/// lifetime.
async fn start_relay() -> (SocketAddr, Arc<Registry<WsConnection>>, Arc<AtomicBool>) {
    let config = ServerConfig {
        id: "test".to_owned(),
        listen_addr: "127.0.0.1:0".parse().expect("valid address"),
        write_wait: Duration::from_secs(2),
    };
    let server = RelayServer::bind(config).await.expect("bind must succeed");
    let addr = server.local_addr();
    let registry = server.registry();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    tokio::spawn(async move {
        let _ = server.run(flag).await;
    });

    (addr, registry, running)
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let (stream, _response) = connect_async(format!("ws://{addr}/?user={user}"))
        .await
        .expect("websocket connect must succeed");
    stream
}

/// Blocks until `user` has (or no longer has) a registry entry.
async fn wait_registered(registry: &Registry<WsConnection>, user: &str, present: bool) {
    timeout(STEP, async {
        while registry.is_registered(user).await != present {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("user {user} never reached registered={present}"));
}

/// Reads frames until a text frame arrives and returns it parsed as JSON.
async fn recv_json(client: &mut Client) -> Value {
    loop {
        let frame = timeout(STEP, client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended while waiting for a frame")
            .expect("read failed while waiting for a frame");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("frame is not valid JSON");
        }
    }
}

/// Asserts that the server closes this connection: nothing but the close
/// handshake may arrive.
async fn expect_closed(client: &mut Client) {
    loop {
        match timeout(STEP, client.next())
            .await
            .expect("timed out waiting for the connection to close")
        {
            None => return,
            Some(Ok(Message::Close(_))) => continue,
            Some(Ok(other)) => panic!("expected close, got: {other:?}"),
            Some(Err(_)) => return,
        }
    }
}

// ── Fan-out ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_broadcast_reaches_every_peer_and_acks_sender() {
    let (addr, registry, _running) = start_relay().await;
    let mut a = connect(addr, "a").await;
    let mut b = connect(addr, "b").await;
    let mut c = connect(addr, "c").await;
    for user in ["a", "b", "c"] {
        wait_registered(&registry, user, true).await;
    }

    a.send(Message::Text(
        r#"{"sequence":1,"type":1,"message":"hi"}"#.to_owned(),
    ))
    .await
    .expect("send");

    let expected_notify = json!({"sequence": 1, "type": 3, "message": "hi", "from": "a"});
    assert_eq!(recv_json(&mut b).await, expected_notify);
    assert_eq!(recv_json(&mut c).await, expected_notify);

    // The sender's first (and only) frame is the acknowledgment — it never
    // receives its own notify.
    assert_eq!(
        recv_json(&mut a).await,
        json!({"sequence": 1, "type": 2, "message": "ok"})
    );
}

#[tokio::test]
async fn test_malformed_payload_degrades_to_empty_notify() {
    let (addr, registry, _running) = start_relay().await;
    let mut a = connect(addr, "a").await;
    let mut b = connect(addr, "b").await;
    for user in ["a", "b"] {
        wait_registered(&registry, user, true).await;
    }

    a.send(Message::Text("certainly not json".to_owned()))
        .await
        .expect("send");

    // The peer still gets a notify, just a content-less one, and the sender
    // is still acknowledged (sequence 0 is omitted on the wire).
    assert_eq!(recv_json(&mut b).await, json!({"type": 3, "from": "a"}));
    assert_eq!(
        recv_json(&mut a).await,
        json!({"type": 2, "message": "ok"})
    );
}

#[tokio::test]
async fn test_disconnected_peer_is_absent_from_later_broadcasts() {
    let (addr, registry, _running) = start_relay().await;
    let mut a = connect(addr, "a").await;
    let mut b = connect(addr, "b").await;
    let mut c = connect(addr, "c").await;
    for user in ["a", "b", "c"] {
        wait_registered(&registry, user, true).await;
    }

    // "b" leaves; its read loop must deregister it.
    b.close(None).await.expect("close");
    wait_registered(&registry, "b", false).await;

    a.send(Message::Text(
        r#"{"sequence":2,"type":1,"message":"still there?"}"#.to_owned(),
    ))
    .await
    .expect("send");

    assert_eq!(
        recv_json(&mut c).await,
        json!({"sequence": 2, "type": 3, "message": "still there?", "from": "a"})
    );
    assert_eq!(
        recv_json(&mut a).await,
        json!({"sequence": 2, "type": 2, "message": "ok"})
    );
    assert_eq!(registry.len().await, 2);
}

// ── Login edge cases ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_user_parameter_closes_the_connection() {
    let (addr, registry, _running) = start_relay().await;

    let (mut client, _response) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("the upgrade itself succeeds");

    expect_closed(&mut client).await;
    assert!(registry.is_empty().await, "nothing may be registered");
}

#[tokio::test]
async fn test_duplicate_login_closes_both_connections() {
    let (addr, registry, _running) = start_relay().await;

    let mut first = connect(addr, "dup").await;
    wait_registered(&registry, "dup", true).await;
    let mut second = connect(addr, "dup").await;

    // Not a takeover: the existing session AND the newcomer are both closed.
    expect_closed(&mut second).await;
    expect_closed(&mut first).await;

    // The evicted session's read loop removes the key on its way out, after
    // which the identity is free again.
    wait_registered(&registry, "dup", false).await;
    let mut third = connect(addr, "dup").await;
    wait_registered(&registry, "dup", true).await;

    // The fresh session is fully functional.
    third
        .send(Message::Text(r#"{"sequence":7,"type":1}"#.to_owned()))
        .await
        .expect("send");
    assert_eq!(
        recv_json(&mut third).await,
        json!({"sequence": 7, "type": 2, "message": "ok"})
    );
}

// ── Shutdown and startup failure ──────────────────────────────────────────────

#[tokio::test]
async fn test_shutdown_closes_every_connection_and_is_idempotent() {
    let (addr, registry, running) = start_relay().await;
    let mut a = connect(addr, "a").await;
    let mut b = connect(addr, "b").await;
    for user in ["a", "b"] {
        wait_registered(&registry, user, true).await;
    }

    running.store(false, Ordering::Relaxed);
    // Concurrent double invocation must close each connection exactly once
    // and must not panic.
    tokio::join!(registry.shutdown(), registry.shutdown());

    expect_closed(&mut a).await;
    expect_closed(&mut b).await;

    // Shutdown does not clear the table itself; each read loop deregisters
    // its own user once it observes the close.
    timeout(STEP, async {
        while !registry.is_empty().await {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("read loops must deregister their users after shutdown");
}

#[tokio::test]
async fn test_bind_conflict_is_a_startup_failure() {
    let (addr, _registry, _running) = start_relay().await;

    let conflicting = ServerConfig {
        id: "conflict".to_owned(),
        listen_addr: addr,
        write_wait: Duration::from_secs(2),
    };
    let result = RelayServer::bind(conflicting).await;
    assert!(result.is_err(), "second bind on {addr} must fail");
}
