//! Domain layer for relay-server.
//!
//! Pure business-logic types with no dependencies on I/O, networking, or
//! external frameworks: the server configuration and the parsing of the
//! `user` identity out of an upgrade request's query string.

pub mod config;
pub mod identity;

pub use config::ServerConfig;
pub use identity::user_from_query;
