//! Fixed-window counter for a single key.

use std::time::{Duration, Instant};

/// Per-key state: how many actions were allowed in the current window and
/// when that window ends.
///
/// Counters are not synchronized themselves; the limiter's store guards them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    /// Actions allowed so far in this window
    count: u64,
    /// When the current window ends
    reset_at: Instant,
}

impl WindowCounter {
    /// Open a new window at `now`, counting the action that opened it.
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
        }
    }

    /// Whether the window is still running at `now`.
    pub fn is_active(&self, now: Instant) -> bool {
        self.reset_at > now
    }

    /// Try to count one more action against `limit`.
    ///
    /// Returns `false` without touching the count when the limit is reached.
    pub fn try_increment(&mut self, limit: u64) -> bool {
        if self.count < limit {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Get the current count.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Get the remaining quota under `limit`.
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.count)
    }

    /// Get the instant at which the window ends.
    pub fn reset_at(&self) -> Instant {
        self.reset_at
    }

    /// Get the duration until the window ends.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_counts_first_action() {
        let now = Instant::now();
        let counter = WindowCounter::open(now, Duration::from_secs(1));

        assert_eq!(counter.count(), 1);
        assert_eq!(counter.reset_at(), now + Duration::from_secs(1));
        assert_eq!(counter.remaining(5), 4);
    }

    #[test]
    fn test_increment_stops_at_limit() {
        let mut counter = WindowCounter::open(Instant::now(), Duration::from_secs(1));

        assert!(counter.try_increment(3));
        assert!(counter.try_increment(3));
        assert!(!counter.try_increment(3));
        assert_eq!(counter.count(), 3);
        assert_eq!(counter.remaining(3), 0);
    }

    #[test]
    fn test_window_activity() {
        let now = Instant::now();
        let counter = WindowCounter::open(now, Duration::from_millis(100));

        assert!(counter.is_active(now));
        assert!(counter.is_active(now + Duration::from_millis(99)));
        assert!(!counter.is_active(now + Duration::from_millis(100)));
    }

    #[test]
    fn test_duration_until_reset() {
        let now = Instant::now();
        let counter = WindowCounter::open(now, Duration::from_millis(100));

        assert_eq!(
            counter.duration_until_reset(now + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
        assert_eq!(
            counter.duration_until_reset(now + Duration::from_secs(1)),
            Duration::ZERO
        );
    }
}
