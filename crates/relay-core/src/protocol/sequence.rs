//! Thread-safe sequence counter for request numbering.
//!
//! Every request a client sends carries a sequence number, and the server
//! echoes it back in the acknowledgment.  The client uses the echo to match
//! each acknowledgment to the request that produced it, so concurrent
//! requests over one connection never get their replies crossed.
//!
//! Deployed clients allocate sequence numbers from 1 and wrap modulo 65536
//! (…, 65534, 65535, 0, 1, …); this counter reproduces that cycle.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU64` internally, so multiple tasks can call
//! [`SequenceCounter::next`] simultaneously without a lock and without two
//! callers ever observing the same in-cycle position.

use std::sync::atomic::{AtomicU64, Ordering};

/// The sequence number cycle length.  Wire sequence numbers are always in
/// `0..65536`.
pub const SEQUENCE_MODULUS: u64 = 65536;

/// A thread-safe counter cycling through the 16-bit sequence space.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// ```
pub struct SequenceCounter {
    /// Total number of allocations so far; the wire value is derived from it
    /// modulo [`SEQUENCE_MODULUS`].
    inner: AtomicU64,
}

impl SequenceCounter {
    /// Creates a new counter whose first [`next`](Self::next) returns 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU64::new(0),
        }
    }

    /// Returns the next sequence number.
    ///
    /// The first call returns 1; the value after 65535 is 0, then the cycle
    /// repeats.  `Ordering::Relaxed` is sufficient because the counter is
    /// used only for numbering, not for synchronising other memory.
    pub fn next(&self) -> i64 {
        // fetch_add returns the value before the increment, so call k
        // observes k - 1 and yields k modulo the cycle length.
        let allocations = self.inner.fetch_add(1, Ordering::Relaxed);
        (allocations.wrapping_add(1) % SEQUENCE_MODULUS) as i64
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
