//! relay-core: shared protocol types for the ws-relay server and client.
//!
//! This crate contains everything both sides of the wire must agree on:
//!
//! - The JSON [`protocol::envelope::Envelope`] exchanged as websocket text
//!   frames, with field-skipping rules that match the original deployment's
//!   `omitempty` encoding bit-for-bit.
//! - The numeric message-type codes ([`protocol::envelope::MessageType`]).
//! - The client-side [`protocol::sequence::SequenceCounter`] used to number
//!   outgoing requests so acknowledgments can be correlated.
//!
//! # Layer rules
//!
//! relay-core is pure data: no I/O, no async, no runtime dependencies beyond
//! `serde`/`serde_json`.  This keeps it usable from the server, the client,
//! and any future tooling without dragging in a websocket stack.

pub mod protocol;
