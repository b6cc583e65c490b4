//! relay-client — a programmatic client for the websocket relay.
//!
//! The relay fans every message a user sends out to all other connected
//! users and acknowledges the sender.  This crate wraps that protocol in a
//! typed session: [`RelayClient::login`] connects and authenticates by query
//! parameter, [`RelayClient::request`] sends a message and awaits the
//! matching acknowledgment, and relayed messages from other users arrive on
//! the channel `login` returns.
//!
//! The companion `relay-client` binary is a small interactive shell over the
//! same type.

pub mod client;

pub use client::{ClientError, RelayClient, ACK_WAIT};
