//! Wire protocol: the JSON envelope and request sequence numbering.

pub mod envelope;
pub mod sequence;

pub use envelope::{Envelope, MessageType};
pub use sequence::SequenceCounter;
