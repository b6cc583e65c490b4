//! The JSON envelope exchanged as websocket text frames.
//!
//! Every application message on the wire is one envelope:
//!
//! ```text
//! client → server (request):  {"sequence": 1, "type": 1, "message": "hi"}
//! server → peers  (notify):   {"sequence": 1, "type": 3, "message": "hi", "from": "a"}
//! server → sender (response): {"sequence": 1, "type": 2, "message": "ok"}
//! ```
//!
//! # Encoding rules
//!
//! The original deployment encoded envelopes with `omitempty` semantics, and
//! existing clients depend on that: a zero `sequence`, a zero `type`, an
//! empty `message`, and an absent `from` are all omitted from the JSON
//! object entirely.  The serde attributes below reproduce this exactly.
//!
//! # Decoding rules
//!
//! Decoding never rejects.  A payload that is not valid envelope JSON
//! degrades to the zero-valued envelope (sequence 0, empty message) and is
//! relayed as a content-less notify; see [`Envelope::decode_lossy`].

use serde::{Deserialize, Serialize};

// ── Message type codes ────────────────────────────────────────────────────────

/// Wire value of a client-originated request.
pub const TYPE_REQUEST: i64 = 1;
/// Wire value of a server acknowledgment back to the sender.
pub const TYPE_RESPONSE: i64 = 2;
/// Wire value of a relayed message pushed to every other user.
pub const TYPE_NOTIFY: i64 = 3;

/// The envelope's numeric `type` field.
///
/// Values 2 (response) and 3 (notify) are fixed server-emitted codes and must
/// never change, or deployed clients stop recognising acknowledgments.  The
/// request value is producer-supplied and unconstrained by the server, so any
/// other integer round-trips through [`MessageType::Other`] rather than
/// failing the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
pub enum MessageType {
    /// A client-originated message to be fanned out (wire value 1).
    Request,
    /// The server's acknowledgment to the sender (wire value 2).
    Response,
    /// A relayed message delivered to every other user (wire value 3).
    Notify,
    /// Any other wire value, preserved verbatim.
    Other(i64),
}

impl MessageType {
    /// `true` when this is the zero wire value, which is omitted on encode.
    fn is_zero(&self) -> bool {
        i64::from(*self) == 0
    }
}

impl Default for MessageType {
    /// The zero wire value, matching a field left unset by the producer.
    fn default() -> Self {
        MessageType::Other(0)
    }
}

impl From<i64> for MessageType {
    fn from(value: i64) -> Self {
        match value {
            TYPE_REQUEST => MessageType::Request,
            TYPE_RESPONSE => MessageType::Response,
            TYPE_NOTIFY => MessageType::Notify,
            other => MessageType::Other(other),
        }
    }
}

impl From<MessageType> for i64 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Request => TYPE_REQUEST,
            MessageType::Response => TYPE_RESPONSE,
            MessageType::Notify => TYPE_NOTIFY,
            MessageType::Other(other) => other,
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// One application message, in either direction.
///
/// Field order matches the wire examples above; every field is optional on
/// decode and omitted on encode when it holds its zero value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Producer-assigned sequence number, echoed back in the acknowledgment.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub sequence: i64,

    /// Message type code; see [`MessageType`].
    #[serde(rename = "type", default, skip_serializing_if = "MessageType::is_zero")]
    pub kind: MessageType,

    /// Free-form text payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// Identity of the original sender; stamped by the server on notifies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Envelope {
    /// Decodes `text` as an envelope, degrading to the zero-valued envelope
    /// when the payload is not valid envelope JSON.
    ///
    /// Malformed input is deliberately not rejected: the relay forwards it as
    /// a content-less notify and still acknowledges the sender.
    pub fn decode_lossy(text: &str) -> Envelope {
        serde_json::from_str(text).unwrap_or_default()
    }

    /// Builds the acknowledgment sent back to the sender of a request:
    /// `{"sequence": <sequence>, "type": 2, "message": "ok"}`.
    pub fn response_to(sequence: i64) -> Envelope {
        Envelope {
            sequence,
            kind: MessageType::Response,
            message: "ok".to_owned(),
            from: None,
        }
    }

    /// Encodes the envelope as single-line JSON.
    ///
    /// Serialization of this shape cannot fail in practice; an empty string
    /// is returned in the unreachable error case rather than panicking.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
