//! Wall-clock environment for real connections.
//!
//! The session only asks the environment for two things: the current instant
//! (to drive the keepalive) and a few random bytes (to pick a backend
//! endpoint). Here they come from the monotonic system clock and the OS RNG;
//! tokio provides the sleep used by drivers.

use std::time::{Duration, Instant};

use cmlink_core::env::Environment;

/// Environment backed by `std::time::Instant`, getrandom and tokio.
///
/// Randomness only spreads connects over the endpoint pool. If the OS RNG
/// fails, the failure is logged and the buffer is zeroed, which makes the
/// session dial the first endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Environment reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(err) = getrandom::fill(buffer) {
            tracing::error!(error = %err, len = buffer.len(), "OS RNG unavailable, using zeroes");
            buffer.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let env = SystemEnv::new();

        let before = env.now();
        std::thread::sleep(Duration::from_millis(5));

        assert!(env.now() > before);
    }

    #[test]
    fn consecutive_draws_differ() {
        let env = SystemEnv::new();

        assert_ne!(env.random_u64(), env.random_u64());
    }

    #[test]
    fn endpoint_choice_stays_in_the_pool() {
        let env = SystemEnv::new();

        assert_eq!(env.random_index(0), None);
        let picks: Vec<_> = (0..64).filter_map(|_| env.random_index(3)).collect();
        assert_eq!(picks.len(), 64);
        assert!(picks.iter().all(|&index| index < 3));
    }

    #[tokio::test]
    async fn sleep_waits_on_the_wall_clock() {
        let env = SystemEnv::new();
        let start = env.now();

        env.sleep(Duration::from_millis(20)).await;

        assert!(env.now() - start >= Duration::from_millis(20));
    }
}
