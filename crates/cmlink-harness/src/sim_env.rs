//! Seeded environment with a manual clock.
//!
//! Time only moves when the test says so, and randomness comes from a
//! ChaCha generator seeded by the test, so every run with the same seed
//! picks the same endpoints and fires the same timers.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use cmlink_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual instant: time elapsed since the simulation started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Instant at `elapsed` after the start of the simulation.
    pub const fn from_elapsed(elapsed: Duration) -> Self {
        Self(elapsed)
    }

    /// Time since the start of the simulation.
    pub const fn elapsed(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

struct SimState {
    now: SimInstant,
    rng: ChaCha8Rng,
}

/// Deterministic environment for simulation.
///
/// Clones share the clock and the generator.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment at time zero with a generator seeded from `seed`.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { now: SimInstant::default(), rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) -> SimInstant {
        let mut state = self.lock();
        state.now = state.now + by;
        state.now
    }

    /// Move the clock to `to`. Never moves it backwards.
    pub fn advance_to(&self, to: SimInstant) -> SimInstant {
        let mut state = self.lock();
        state.now = state.now.max(to);
        state.now
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("now", &self.lock().now).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> Self::Instant {
        self.lock().now
    }

    /// Advances the virtual clock and completes immediately.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let a = SimEnv::with_seed(42);
        let b = SimEnv::with_seed(42);

        assert_eq!(a.random_u64(), b.random_u64());
        assert_eq!(a.random_index(7), b.random_index(7));
    }

    #[test]
    fn clock_only_moves_when_told() {
        let env = SimEnv::default();
        assert_eq!(env.now(), SimInstant::default());

        env.advance(Duration::from_secs(3));
        assert_eq!(env.now().elapsed(), Duration::from_secs(3));

        env.advance_to(SimInstant::from_elapsed(Duration::from_secs(1)));
        assert_eq!(env.now().elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn clones_share_the_clock() {
        let env = SimEnv::default();
        let clone = env.clone();
        clone.advance(Duration::from_millis(5));

        assert_eq!(env.now() - SimInstant::default(), Duration::from_millis(5));
    }
}
