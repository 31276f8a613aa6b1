//! Monotonic deadline primitive used by the protocol engine and every
//! transport's resync/poll loops.
//!
//! `arm(seconds)` records a deadline; `expired()` tests it against a
//! monotonic clock immune to wall-clock adjustments. `Instant` is exactly
//! that clock source on every platform Rust's standard library targets, so
//! there's no `clock_gettime(CLOCK_MONOTONIC, ..)`-style plumbing needed
//! here.

use std::time::{Duration, Instant};

/// An absolute deadline, armed with a relative duration.
///
/// A freshly zero-armed timer (`Timeout::armed(0.0)` or `Timeout::expired()`,
/// its `Default`) is immediately expired.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    deadline: Instant,
}

impl Timeout {
    /// Arm a new deadline `seconds` from now.
    pub fn armed(seconds: f32) -> Self {
        let mut timer = Self {
            deadline: Instant::now(),
        };
        timer.arm(seconds);
        timer
    }

    /// Return a timer whose deadline has already passed.
    pub fn expired() -> Self {
        Self::armed(0.0)
    }

    /// Re-arm this timer's deadline to `seconds` from now.
    pub fn arm(&mut self, seconds: f32) {
        self.deadline = Instant::now() + duration_from_secs_f32(seconds);
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

fn duration_from_secs_f32(seconds: f32) -> Duration {
    Duration::from_secs_f32(seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn zero_armed_timer_is_immediately_expired() {
        let t = Timeout::armed(0.0);
        assert!(t.is_expired());
    }

    #[test]
    fn default_expired_helper_is_expired() {
        assert!(Timeout::expired().is_expired());
    }

    #[test]
    fn armed_timer_is_not_expired_until_elapsed() {
        let t = Timeout::armed(0.05);
        assert!(!t.is_expired());
        sleep(Duration::from_millis(80));
        assert!(t.is_expired());
    }

    #[test]
    fn rearm_resets_the_deadline() {
        let mut t = Timeout::armed(0.0);
        assert!(t.is_expired());
        t.arm(0.05);
        assert!(!t.is_expired());
    }
}
