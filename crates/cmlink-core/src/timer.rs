//! Single repeating timer registration.
//!
//! A session owns at most one timer: the protocol keepalive. Scheduling again
//! replaces the registration. A poll that finds the deadline passed fires once
//! and re-arms relative to the poll time, so a stalled loop never produces a
//! burst of catch-up ticks.

use std::{
    ops::Add,
    time::{Duration, Instant},
};

/// Repeating interval timer driven by caller-supplied time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer<I = Instant> {
    armed: Option<Armed<I>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed<I> {
    interval: Duration,
    deadline: I,
}

impl<I> Default for IntervalTimer<I> {
    fn default() -> Self {
        Self { armed: None }
    }
}

impl<I> IntervalTimer<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Create an unarmed timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the repeating registration. A zero interval
    /// disarms the timer.
    pub fn schedule(&mut self, interval: Duration, now: I) {
        if interval.is_zero() {
            tracing::warn!("ignoring zero keepalive interval");
            self.armed = None;
            return;
        }
        self.armed = Some(Armed { interval, deadline: now + interval });
    }

    /// Drop the registration.
    pub fn cancel(&mut self) {
        self.armed = None;
    }

    /// Whether a registration exists.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Interval of the current registration.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.armed.map(|a| a.interval)
    }

    /// Next time the timer fires.
    #[must_use]
    pub fn deadline(&self) -> Option<I> {
        self.armed.map(|a| a.deadline)
    }

    /// Returns `true` at most once per call if the deadline has passed, and
    /// re-arms at `now + interval`.
    pub fn poll(&mut self, now: I) -> bool {
        let Some(armed) = self.armed.as_mut() else {
            return false;
        };
        if now < armed.deadline {
            return false;
        }
        armed.deadline = now + armed.interval;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> Duration {
        Duration::from_secs(secs)
    }

    // Duration doubles as a virtual instant here.
    type Timer = IntervalTimer<Duration>;

    #[test]
    fn fires_once_per_interval() {
        let mut timer = Timer::new();
        timer.schedule(at(10), at(0));

        assert!(!timer.poll(at(9)));
        assert!(timer.poll(at(10)));
        assert!(!timer.poll(at(15)));
        assert!(timer.poll(at(20)));
    }

    #[test]
    fn late_poll_does_not_catch_up() {
        let mut timer = Timer::new();
        timer.schedule(at(10), at(0));

        assert!(timer.poll(at(95)));
        assert!(!timer.poll(at(95)));
        assert_eq!(timer.deadline(), Some(at(105)));
    }

    #[test]
    fn schedule_replaces_registration() {
        let mut timer = Timer::new();
        timer.schedule(at(10), at(0));
        timer.schedule(at(30), at(5));

        assert_eq!(timer.interval(), Some(at(30)));
        assert!(!timer.poll(at(10)));
        assert!(timer.poll(at(35)));
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timer = Timer::new();
        timer.schedule(at(1), at(0));
        timer.cancel();

        assert!(!timer.is_armed());
        assert!(!timer.poll(at(100)));
    }

    #[test]
    fn zero_interval_disarms() {
        let mut timer = Timer::new();
        timer.schedule(at(1), at(0));
        timer.schedule(Duration::ZERO, at(0));
        assert!(!timer.is_armed());
    }
}
