//! The message handler: decode, stamp, fan out, acknowledge.
//!
//! The read loop hands every text frame here in its own detached task, so a
//! slow fan-out never blocks reading (it does, however, serialize on the
//! registry lock with every other fan-out and registration — see the
//! registry module).

use relay_core::protocol::{Envelope, MessageType};
use tracing::debug;

use crate::infrastructure::connection::RelayConnection;
use crate::infrastructure::registry::Registry;

/// Handles one inbound text frame from `sender`.
///
/// The payload is decoded leniently: anything that is not valid envelope
/// JSON becomes the zero-valued envelope and is relayed as a content-less
/// notify.  The envelope is stamped with the sender's identity and the
/// notify type, written to every other registered user, and answered with
/// `{"sequence": <echoed>, "type": 2, "message": "ok"}` to the sender.
pub async fn dispatch<C: RelayConnection>(registry: &Registry<C>, sender: &str, payload: &str) {
    debug!("recv message {payload} from {sender}");

    let mut envelope = Envelope::decode_lossy(payload);
    let sequence = envelope.sequence;
    envelope.kind = MessageType::Notify;
    envelope.from = Some(sender.to_owned());

    let notify = envelope.encode();
    let response = Envelope::response_to(sequence).encode();

    let outcome = registry.broadcast(sender, &notify, &response).await;
    debug!(
        "fan-out from {sender}: delivered={} failed={} acked={}",
        outcome.delivered, outcome.failed, outcome.acked
    );
}

// ── Tests ─────────────────────────────────────────────────────────────────────
