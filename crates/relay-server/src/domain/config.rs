//! Server configuration.
//!
//! [`ServerConfig`] is the single source of truth for all runtime settings.
//! It is populated from CLI arguments in `main.rs` (with environment-variable
//! overrides) or from [`Default`] in tests and local development; the domain
//! layer itself never reads the environment.

use std::net::SocketAddr;
use std::time::Duration;

/// All runtime configuration for the relay server.
///
/// Build this once at startup and hand it to
/// [`RelayServer::bind`](crate::infrastructure::ws_server::RelayServer::bind);
/// the server clones what it needs into its session tasks.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Instance identifier, included in startup and lifecycle log lines so
    /// multiple relays can share one log stream.
    pub id: String,

    /// The address and port the websocket listener binds to.
    ///
    /// `0.0.0.0` accepts connections from any interface; use `127.0.0.1` to
    /// accept only local connections.  Port 0 binds an ephemeral port, which
    /// the integration tests rely on.
    pub listen_addr: SocketAddr,

    /// Write deadline applied to every outbound frame.
    ///
    /// A peer write that does not complete within this window fails and is
    /// skipped; it is never retried.  There is no read deadline: a silent
    /// peer is only reaped when its connection actually closes.
    pub write_wait: Duration,
}

/// Default write deadline, matching the original deployment.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

impl Default for ServerConfig {
    /// Returns a configuration suitable for local development:
    /// id `demo`, listening on `0.0.0.0:8000`, 10-second write deadline.
    fn default() -> Self {
        Self {
            id: "demo".to_owned(),
            // Compile-time-known valid socket address.
            listen_addr: "0.0.0.0:8000".parse().expect("valid default address"),
            write_wait: DEFAULT_WRITE_WAIT,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
