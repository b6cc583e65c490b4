//! relay-client — interactive entry point.
//!
//! Logs in to a relay and turns stdin into requests: every line typed is
//! sent to all other connected users, acknowledgments and relayed messages
//! are printed as they arrive, and end-of-input (Ctrl-D) logs out.
//!
//! # Usage
//!
//! ```text
//! relay-client --user <ID> [--url <URL>]
//!
//! Options:
//!   --url   <URL>  Relay server URL [default: ws://127.0.0.1:8000]
//!   --user  <ID>   Identity to log in under (required)
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present.
//!
//! | Variable     | Default                | Description          |
//! |--------------|------------------------|----------------------|
//! | `RELAY_URL`  | `ws://127.0.0.1:8000`  | Relay server URL     |
//! | `RELAY_USER` | (none)                 | Identity to log in   |
//!
//! Log verbosity is controlled by `RUST_LOG` (e.g. `RUST_LOG=debug`).

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use relay_client::RelayClient;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Interactive websocket relay client.
#[derive(Debug, Parser)]
#[command(name = "relay-client", about = "Interactive relay client", version)]
struct Cli {
    /// Relay server URL.
    #[arg(long, default_value = "ws://127.0.0.1:8000", env = "RELAY_URL")]
    url: String,

    /// Identity to log in under.
    #[arg(long, env = "RELAY_USER")]
    user: String,
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

    let (mut client, mut notifies) = RelayClient::login(&cli.url, &cli.user)
        .await
        .with_context(|| format!("failed to log in to {} as {}", cli.url, cli.user))?;
    println!("logged in as {} — type a message and press enter", cli.user);

    // Relayed messages print as they arrive, interleaved with the prompt.
    tokio::spawn(async move {
        while let Some(envelope) = notifies.recv().await {
            let from = envelope.from.as_deref().unwrap_or("?");
            println!("[{from}] {}", envelope.message);
        }
        println!("connection closed by the server");
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match client.request(line).await {
            Ok(ack) => debug!("acknowledged sequence {}", ack.sequence),
            Err(e) => warn!("request failed: {e}"),
        }
    }

    client.logout().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_url_and_requires_user() {
        let cli = Cli::parse_from(["relay-client", "--user", "a"]);
        assert_eq!(cli.url, "ws://127.0.0.1:8000");
        assert_eq!(cli.user, "a");
    }

    #[test]
    fn test_cli_rejects_missing_user() {
        let result = Cli::try_parse_from(["relay-client"]);
        assert!(result.is_err(), "--user must be required");
    }

    #[test]
    fn test_cli_url_override() {
        let cli = Cli::parse_from(["relay-client", "--user", "a", "--url", "ws://relay:9000"]);
        assert_eq!(cli.url, "ws://relay:9000");
    }
}
