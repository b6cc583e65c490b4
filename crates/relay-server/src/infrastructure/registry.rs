//! The session registry: one live connection per user identity.
//!
//! A single `tokio::sync::Mutex` over the user → connection table is the only
//! synchronisation in the server.  Every read, write, and iteration of the
//! table — including the peer writes performed while fanning a message out —
//! happens with that lock held, so a broadcast can never observe a login or
//! removal mid-flight, and two broadcasts never interleave.  The cost is that
//! the table is unavailable for the full duration of a fan-out, up to the
//! write deadline per slow peer; that trade is intentional and load-bearing
//! for the consistency guarantees above.
//!
//! # Lifecycle
//!
//! [`Registry::put`] always overwrites and hands the evicted connection back
//! to the caller.  On a duplicate login the upgrade handler closes both the
//! evicted and the fresh connection (via [`Registry::close`]) and walks away;
//! the dead entry lingers until the evicted session's read loop exits and
//! removes the key.  [`Registry::shutdown`] runs at most once and closes
//! every registered connection *in place*: read loops notice their socket
//! closing and deregister themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::connection::RelayConnection;

/// Counters describing one fan-out pass, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Peers the notify frame was written to successfully.
    pub delivered: usize,
    /// Peers whose write failed and was skipped.
    pub failed: usize,
    /// Whether the acknowledgment reached the sender.  `false` when the
    /// sender's write failed or its entry was already gone.
    pub acked: bool,
}

/// Thread-safe mapping from user identity to its active connection.
pub struct Registry<C: RelayConnection> {
    table: Mutex<HashMap<String, C>>,
    /// Deadline applied to every frame written during fan-out.
    write_wait: Duration,
    /// Latch ensuring [`shutdown`](Self::shutdown) runs its body once.
    shutdown_started: AtomicBool,
}

impl<C: RelayConnection> Registry<C> {
    /// Creates an empty registry whose fan-out writes use `write_wait` as
    /// their deadline.
    pub fn new(write_wait: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            write_wait,
            shutdown_started: AtomicBool::new(false),
        }
    }

    /// Atomically stores `conn` under `user`, returning whatever was stored
    /// before.
    ///
    /// Always overwrites.  When a previous connection comes back the caller
    /// owns the duplicate-login policy: close the returned connection *and*
    /// the one just stored (see [`close`](Self::close)).
    pub async fn put(&self, user: &str, conn: C) -> Option<C> {
        let mut table = self.table.lock().await;
        table.insert(user.to_owned(), conn)
    }

    /// Removes the mapping for `user` if present and hands the connection
    /// back for closing.  Idempotent.
    pub async fn remove(&self, user: &str) -> Option<C> {
        let mut table = self.table.lock().await;
        table.remove(user)
    }

    /// Closes `user`'s registered connection in place, leaving the entry in
    /// the table.  No-op when the user is not registered.
    pub async fn close(&self, user: &str) {
        let mut table = self.table.lock().await;
        if let Some(conn) = table.get_mut(user) {
            conn.close().await;
        }
    }

    /// `true` when `user` currently has an entry (live or already closed).
    pub async fn is_registered(&self, user: &str) -> bool {
        let table = self.table.lock().await;
        table.contains_key(user)
    }

    /// Number of entries currently in the table.
    pub async fn len(&self) -> usize {
        let table = self.table.lock().await;
        table.len()
    }

    /// `true` when no user is registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Fans `notify` out to every registered user except `sender`, then
    /// writes `response` to `sender`'s own connection — all under one
    /// exclusive critical section.
    ///
    /// A peer whose write fails is logged and skipped; the fan-out continues
    /// and nothing is retried.  The acknowledgment is silently dropped when
    /// the sender's entry has meanwhile disappeared.  Iteration order over
    /// peers is unspecified.
    pub async fn broadcast(&self, sender: &str, notify: &str, response: &str) -> BroadcastOutcome {
        let mut table = self.table.lock().await;

        let mut delivered = 0;
        let mut failed = 0;
        for (user, conn) in table.iter_mut() {
            if user == sender {
                continue;
            }
            match conn.write_text(notify.to_owned(), self.write_wait).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("write to {user} failed: {e}");
                    failed += 1;
                }
            }
        }

        let acked = match table.get_mut(sender) {
            Some(conn) => {
                match conn.write_text(response.to_owned(), self.write_wait).await {
                    Ok(()) => true,
                    Err(e) => {
                        // The sender may have half-closed between reading its
                        // frame and this acknowledgment.
                        debug!("acknowledgment to {sender} failed: {e}");
                        false
                    }
                }
            }
            None => {
                debug!("sender {sender} deregistered before acknowledgment; skipping");
                false
            }
        };

        BroadcastOutcome {
            delivered,
            failed,
            acked,
        }
    }

    /// Closes every registered connection.  Executes at most once no matter
    /// how many times or from how many tasks it is invoked.
    ///
    /// The table is deliberately *not* cleared and read loops are not
    /// signalled: each loop observes its socket closing as a read error and
    /// deregisters itself.
    pub async fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut table = self.table.lock().await;
        debug!("shutdown: closing {} connection(s)", table.len());
        for conn in table.values_mut() {
            conn.close().await;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
