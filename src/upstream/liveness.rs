//! Liveness probes for upstreams.
//!
//! The dispatcher only asks "is this upstream usable right now?". Who answers
//! that question is decided when the pool is built: either a constant probe
//! or a flag that a health checker flips on its own schedule.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Reports whether an upstream is currently usable.
///
/// Implementations must be cheap and non-blocking; they are called while the
/// dispatcher holds its rotation lock.
pub trait Liveness: Send + Sync + Debug {
    fn is_alive(&self) -> bool;
}

/// Liveness probe that always reports the upstream as usable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl Liveness for AlwaysAlive {
    fn is_alive(&self) -> bool {
        true
    }
}

/// Mutable liveness flag updated by an external health checker.
///
/// Starts healthy. `unhealthy_threshold` consecutive failures mark it dead,
/// `healthy_threshold` consecutive successes bring it back.
#[derive(Debug)]
pub struct HealthFlag {
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    unhealthy_threshold: u32,
    healthy_threshold: u32,
}

impl HealthFlag {
    pub fn new(unhealthy_threshold: u32, healthy_threshold: u32) -> Self {
        Self {
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            unhealthy_threshold: unhealthy_threshold.max(1),
            healthy_threshold: healthy_threshold.max(1),
        }
    }

    /// Set the flag directly, clearing both streak counters.
    pub fn set_alive(&self, alive: bool) {
        self.healthy.store(alive, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
        self.consecutive_successes.store(0, Ordering::Release);
    }

    /// Record a successful probe. Returns true if this flipped the flag to healthy.
    pub fn record_success(&self) -> bool {
        self.consecutive_failures.store(0, Ordering::Release);
        let successes = self.consecutive_successes.fetch_add(1, Ordering::AcqRel) + 1;

        if !self.healthy.load(Ordering::Acquire) && successes >= self.healthy_threshold {
            self.healthy.store(true, Ordering::Release);
            self.consecutive_successes.store(0, Ordering::Release);
            return true;
        }
        false
    }

    /// Record a failed probe. Returns true if this flipped the flag to unhealthy.
    pub fn record_failure(&self) -> bool {
        self.consecutive_successes.store(0, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;

        if self.healthy.load(Ordering::Acquire) && failures >= self.unhealthy_threshold {
            self.healthy.store(false, Ordering::Release);
            self.consecutive_failures.store(0, Ordering::Release);
            return true;
        }
        false
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

impl Default for HealthFlag {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

impl Liveness for HealthFlag {
    fn is_alive(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_alive() {
        assert!(AlwaysAlive.is_alive());
    }

    #[test]
    fn test_flag_starts_healthy() {
        let flag = HealthFlag::default();
        assert!(flag.is_alive());
        assert_eq!(flag.consecutive_failures(), 0);
    }

    #[test]
    fn test_failures_mark_unhealthy() {
        let flag = HealthFlag::new(3, 2);

        assert!(!flag.record_failure());
        assert!(flag.is_alive());
        assert!(!flag.record_failure());
        assert!(flag.is_alive());

        assert!(flag.record_failure());
        assert!(!flag.is_alive());
    }

    #[test]
    fn test_successes_mark_healthy() {
        let flag = HealthFlag::new(1, 2);
        flag.record_failure();
        assert!(!flag.is_alive());

        assert!(!flag.record_success());
        assert!(!flag.is_alive());

        assert!(flag.record_success());
        assert!(flag.is_alive());
    }

    #[test]
    fn test_success_resets_failures() {
        let flag = HealthFlag::new(3, 2);

        flag.record_failure();
        flag.record_failure();
        flag.record_success();
        assert_eq!(flag.consecutive_failures(), 0);

        flag.record_failure();
        flag.record_failure();
        assert!(flag.is_alive());

        flag.record_failure();
        assert!(!flag.is_alive());
    }

    #[test]
    fn test_set_alive() {
        let flag = HealthFlag::default();
        flag.set_alive(false);
        assert!(!flag.is_alive());
        flag.set_alive(true);
        assert!(flag.is_alive());
    }

    #[test]
    fn test_zero_thresholds_clamped() {
        let flag = HealthFlag::new(0, 0);
        assert!(flag.record_failure());
        assert!(!flag.is_alive());
        assert!(flag.record_success());
        assert!(flag.is_alive());
    }
}
