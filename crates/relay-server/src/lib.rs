//! relay-server library crate.
//!
//! A minimal websocket relay: clients connect under a user identity, any text
//! message one client sends is fanned out to every other connected client,
//! and the sender receives an acknowledgment.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Client (JSON over WebSocket, ?user=<identity>)
//!         ↕
//! [relay-server]
//!   ├── domain/           Pure types: ServerConfig, query-string parsing
//!   ├── application/      Message dispatch: decode, stamp, fan out, ack
//!   └── infrastructure/
//!         ├── connection/ Frame writer over the tungstenite sink
//!         ├── registry/   The session table and its single exclusive lock
//!         └── ws_server/  Accept loop, upgrade handler, per-user read loop
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async, no frameworks.
//! - `application` depends on `domain`, `relay-core`, and the
//!   `RelayConnection` seam only.
//! - `infrastructure` depends on everything plus `tokio` and `tungstenite`.

/// Domain layer: configuration and identity parsing (no I/O).
pub mod domain;

/// Application layer: the message handler.
pub mod application;

/// Infrastructure layer: websocket server, connections, session registry.
pub mod infrastructure;
