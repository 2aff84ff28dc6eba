//! Time management for the estimator
//!
//! Measurement timestamps are milliseconds on a shared clock supplied by
//! the producers. The registry also needs "now" to decide when a subject
//! has gone idle; that comes from a [`TimeSource`]:
//! - [`SystemTime`] for deployments
//! - [`ManualClock`] for tests and replays, advanced explicitly

use std::sync::atomic::{AtomicU64, Ordering};

use crate::constants::time::MS_PER_SECOND;

/// Timestamp in milliseconds since epoch (or since the start of a replay)
pub type Timestamp = u64;

/// Source of time for the system
pub trait TimeSource: Send + Sync {
    /// Get current timestamp in milliseconds
    fn now(&self) -> Timestamp;

    /// Check if this source provides wall clock time (vs a controlled clock)
    fn is_wall_clock(&self) -> bool;

    /// Get precision in milliseconds
    fn precision_ms(&self) -> u32 {
        1
    }
}

/// Wall clock time source
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeSource for SystemTime {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime as StdSystemTime, UNIX_EPOCH};

        StdSystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Explicitly advanced clock, shareable across threads
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self { now: AtomicU64::new(timestamp) }
    }

    /// Jump to `timestamp`
    pub fn set(&self, timestamp: Timestamp) {
        self.now.store(timestamp, Ordering::SeqCst);
    }

    /// Move forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// Elapsed seconds between two timestamps, zero if `later` is not later
pub fn elapsed_secs(earlier: Timestamp, later: Timestamp) -> f64 {
    later.saturating_sub(earlier) as f64 / MS_PER_SECOND as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now(), 1000);

        clock.advance(500);
        assert_eq!(clock.now(), 1500);

        clock.set(10);
        assert_eq!(clock.now(), 10);
        assert!(!clock.is_wall_clock());
    }

    #[test]
    fn elapsed_is_saturating() {
        assert_eq!(elapsed_secs(1000, 3500), 2.5);
        assert_eq!(elapsed_secs(3500, 1000), 0.0);
    }

    #[test]
    fn system_time_is_wall_clock() {
        let clock = SystemTime;
        assert!(clock.is_wall_clock());
        assert!(clock.now() > 0);
    }
}
