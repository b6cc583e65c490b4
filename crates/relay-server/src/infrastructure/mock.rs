//! Mock connection for unit testing.
//!
//! Lets registry and dispatch tests observe exactly which frames were written
//! to which user and how many times each connection was closed, without a
//! running listener.  A probe handle stays valid after the connection itself
//! has been moved into the registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::connection::{RelayConnection, WriteError};

/// A [`RelayConnection`] that records writes instead of touching a socket.
pub struct MockConnection {
    writes: Arc<Mutex<Vec<String>>>,
    close_count: Arc<AtomicUsize>,
    fail_writes: bool,
}

/// Shared view of a [`MockConnection`]'s recorded activity.
#[derive(Clone)]
pub struct MockProbe {
    writes: Arc<Mutex<Vec<String>>>,
    close_count: Arc<AtomicUsize>,
}

impl MockConnection {
    /// Creates a mock whose writes always succeed.
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            close_count: Arc::new(AtomicUsize::new(0)),
            fail_writes: false,
        }
    }

    /// Creates a mock whose writes always fail, simulating a half-closed or
    /// stalled peer.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::new()
        }
    }

    /// Returns a probe that keeps observing this connection after it has
    /// been moved into a registry.
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            writes: Arc::clone(&self.writes),
            close_count: Arc::clone(&self.close_count),
        }
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProbe {
    /// All payloads written so far, in write order.
    pub fn written(&self) -> Vec<String> {
        self.writes.lock().expect("lock poisoned").clone()
    }

    /// Number of times `close` has been called.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl RelayConnection for MockConnection {
    async fn write_text(&mut self, payload: String, deadline: Duration) -> Result<(), WriteError> {
        if self.fail_writes {
            return Err(WriteError::DeadlineExceeded(deadline));
        }
        self.writes.lock().expect("lock poisoned").push(payload);
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}
