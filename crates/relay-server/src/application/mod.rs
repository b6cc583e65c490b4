//! Application layer for relay-server: the message handler.

pub mod dispatch;

pub use dispatch::dispatch;
