//! Round-trip tests: a real relay server in-process, exercised through the
//! programmatic client.

use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};

use relay_client::RelayClient;
use relay_core::protocol::MessageType;
use relay_server::domain::ServerConfig;
use relay_server::infrastructure::{RelayServer, Registry, WsConnection};

/// Upper bound for any single wait in these tests.
const STEP: Duration = Duration::from_secs(5);

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn start_relay() -> (String, Arc<Registry<WsConnection>>) {
    let config = ServerConfig {
        id: "roundtrip".to_owned(),
        listen_addr: "127.0.0.1:0".parse().expect("valid address"),
        write_wait: Duration::from_secs(2),
    };
    let server = RelayServer::bind(config).await.expect("bind must succeed");
    let url = format!("ws://{}", server.local_addr());
    let registry = server.registry();

    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(async move {
        let _ = server.run(running).await;
    });

    (url, registry)
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

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_is_acked_and_relayed_to_the_peer() {
    let (url, registry) = start_relay().await;

    let (mut a, _a_notifies) = RelayClient::login(&url, "a").await.expect("login a");
    let (b, mut b_notifies) = RelayClient::login(&url, "b").await.expect("login b");
    for user in ["a", "b"] {
        wait_registered(&registry, user, true).await;
    }

    let ack = a.request("hello").await.expect("request must be acked");
    assert_eq!(ack.kind, MessageType::Response);
    assert_eq!(ack.sequence, 1, "first request carries sequence 1");
    assert_eq!(ack.message, "ok");

    let relayed = timeout(STEP, b_notifies.recv())
        .await
        .expect("timed out waiting for the relayed message")
        .expect("notify channel closed unexpectedly");
    assert_eq!(relayed.kind, MessageType::Notify);
    assert_eq!(relayed.sequence, 1);
    assert_eq!(relayed.message, "hello");
    assert_eq!(relayed.from.as_deref(), Some("a"));

    // Sequence numbers advance per request within the session.
    let ack = a.request("again").await.expect("second request");
    assert_eq!(ack.sequence, 2);

    a.logout().await.expect("logout a");
    b.logout().await.expect("logout b");
}

#[tokio::test]
async fn test_logged_out_user_no_longer_receives_messages() {
    let (url, registry) = start_relay().await;

    let (a, mut a_notifies) = RelayClient::login(&url, "a").await.expect("login a");
    let (mut b, _b_notifies) = RelayClient::login(&url, "b").await.expect("login b");
    for user in ["a", "b"] {
        wait_registered(&registry, user, true).await;
    }

    a.logout().await.expect("logout a");
    wait_registered(&registry, "a", false).await;

    // "a" is gone from the table, so the fan-out only acknowledges "b".
    let ack = b.request("anyone left?").await.expect("request must be acked");
    assert_eq!(ack.message, "ok");
    assert_eq!(registry.len().await, 1);

    // The logged-out client's notify channel is closed, not silent.
    let closed = timeout(STEP, a_notifies.recv())
        .await
        .expect("timed out waiting for the channel to close");
    assert!(closed.is_none(), "notify channel must close after logout");

    b.logout().await.expect("logout b");
}

#[tokio::test]
async fn test_duplicate_login_closes_both_sessions() {
    let (url, registry) = start_relay().await;

    let (_first, mut first_notifies) = RelayClient::login(&url, "dup").await.expect("login");
    wait_registered(&registry, "dup", true).await;

    // The handshake itself succeeds; the relay then closes both connections.
    let (_second, mut second_notifies) = RelayClient::login(&url, "dup").await.expect("login");

    for notifies in [&mut first_notifies, &mut second_notifies] {
        let closed = timeout(STEP, notifies.recv())
            .await
            .expect("timed out waiting for the channel to close");
        assert!(closed.is_none(), "both sessions must observe the close");
    }
}

#[tokio::test]
async fn test_login_fails_when_the_relay_is_unreachable() {
    // Bind an ephemeral port, then free it so the connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let result = RelayClient::login(&format!("ws://{addr}"), "a").await;
    assert!(result.is_err(), "login must surface the transport error");
}
