//! relay-server — entry point.
//!
//! A minimal websocket relay: clients connect to `ws://host:port/?user=<id>`,
//! and every text frame a client sends is fanned out to all other connected
//! clients, with an acknowledgment returned to the sender.
//!
//! # Usage
//!
//! ```text
//! relay-server serve [OPTIONS]
//!
//! Options:
//!   --listen     <ADDR>  Listen address [default: 0.0.0.0:8000]
//!   --id         <ID>    Instance identifier for log lines [default: demo]
//!   --write-wait <SECS>  Per-frame write deadline in seconds [default: 10]
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable           | Default        | Description                   |
//! |--------------------|----------------|-------------------------------|
//! | `RELAY_LISTEN`     | `0.0.0.0:8000` | Listen address                |
//! | `RELAY_ID`         | `demo`         | Instance identifier           |
//! | `RELAY_WRITE_WAIT` | `10`           | Write deadline (seconds)      |
//!
//! Log verbosity is controlled by `RUST_LOG` (e.g. `RUST_LOG=debug`).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_server::domain::ServerConfig;
use relay_server::infrastructure::RelayServer;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Websocket relay server.
#[derive(Debug, Parser)]
#[command(name = "relay-server", about = "Websocket fan-out relay", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Starts the relay listener and blocks until Ctrl-C.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// Address and port to listen on.
    #[arg(long, default_value = "0.0.0.0:8000", env = "RELAY_LISTEN")]
    listen: String,

    /// Instance identifier included in log lines.
    #[arg(long, default_value = "demo", env = "RELAY_ID")]
    id: String,

    /// Per-frame write deadline in seconds; a peer write that takes longer
    /// is skipped.
    #[arg(long, default_value_t = 10, env = "RELAY_WRITE_WAIT")]
    write_wait: u64,
}

impl ServeArgs {
    /// Converts the parsed arguments into a [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--listen` is not a valid socket address.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let listen_addr: SocketAddr = self
            .listen
            .parse()
            .with_context(|| format!("invalid listen address: '{}'", self.listen))?;

        Ok(ServerConfig {
            id: self.id,
            listen_addr,
            write_wait: Duration::from_secs(self.write_wait),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => serve(args.into_server_config()?).await,
    }
}

/// Binds the listener and blocks until Ctrl-C.  A bind failure propagates
/// out of `main` and the process exits non-zero.
async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    info!(id = %config.id, "relay server starting on {}", config.listen_addr);

    let server = RelayServer::bind(config).await?;
    let registry = server.registry();

    // Ctrl-C clears the running flag (stopping the accept loop) and runs the
    // one-shot shutdown, closing every registered connection.  Read loops
    // observe their sockets closing and deregister themselves.
    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl-C — shutting down");
                running_signal.store(false, Ordering::Relaxed);
                registry.shutdown().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl-C: {e}");
            }
        }
    });

    server.run(running).await?;

    info!("relay server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
