//! Infrastructure layer for relay-server.
//!
//! Everything that touches a socket lives here:
//!
//! - Binding the TCP listener and accepting connections
//! - Performing the websocket upgrade handshake
//! - The per-user read loop
//! - The session registry and its single exclusive lock
//! - Writing framed envelopes with a deadline
//!
//! Protocol content (what the envelopes mean) belongs to the application
//! layer; configuration and identity parsing belong to the domain layer.

pub mod connection;
pub mod mock;
pub mod registry;
pub mod ws_server;

pub use connection::{RelayConnection, WriteError, WsConnection};
pub use registry::{BroadcastOutcome, Registry};
pub use ws_server::RelayServer;
