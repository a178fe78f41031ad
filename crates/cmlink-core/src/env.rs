//! Time and randomness seam.
//!
//! The session reads the clock for its keepalive and draws randomness to pick
//! a backend endpoint. Both go through [`Environment`], so a simulation can
//! substitute a manual clock and a seeded generator and replay a run exactly.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

/// Clock, randomness and sleeping, supplied by the caller.
///
/// # Invariants
///
/// - `now()` is monotonic
/// - a simulated environment with a fixed seed yields the same
///   `random_bytes` sequence on every run
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type of this environment's clock.
    ///
    /// `std::time::Instant` for real connections; simulations use a virtual
    /// instant they advance by hand.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + std::fmt::Debug
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Wait for `duration`. Drivers use this; the state machines never await.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64` built from [`Environment::random_bytes`].
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Index in `0..len` for endpoint selection, or `None` for an empty pool.
    ///
    /// The modulo bias is irrelevant for pools of a handful of endpoints.
    fn random_index(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some((self.random_u64() % len as u64) as usize)
    }
}
