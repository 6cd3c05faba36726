//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::counter::WindowCounter;
use super::policy::Policy;
use super::sweeper::{self, CleanupSweeper, EntryStore};
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the action may proceed
    pub allowed: bool,
    /// The policy's quota per window
    pub limit: u64,
    /// Quota left in the current window after this check
    pub remaining: u64,
    /// Milliseconds until the current window ends
    pub reset_after_ms: u64,
}

impl Decision {
    /// Get the time until the current window ends.
    pub fn reset_after(&self) -> Duration {
        Duration::from_millis(self.reset_after_ms)
    }
}

/// A fixed-window rate limiter for a single policy.
///
/// Each key gets a window that opens on its first allowed action and lasts
/// for the policy's window length. Up to `max_requests` actions are allowed
/// inside a window; further checks are denied without consuming quota or
/// extending the window. Because windows restart rather than slide, a caller
/// can get up to twice the quota through across a window boundary.
///
/// The limiter is thread-safe and can be shared across threads and tasks.
pub struct RateLimiter {
    policy: Policy,
    /// Window state indexed by `prefix:key`
    entries: Arc<EntryStore>,
    clock: Arc<dyn Clock>,
    /// Running cleanup task, if any
    sweeper: Mutex<Option<CleanupSweeper>>,
}

impl RateLimiter {
    /// Create a new rate limiter using the system clock.
    pub fn new(policy: Policy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock::new()))
    }

    /// Create a new rate limiter reading time from `clock`.
    pub fn with_clock(policy: Policy, clock: Arc<dyn Clock>) -> Self {
        debug!(
            policy = %policy.key_prefix(),
            max_requests = policy.max_requests(),
            window = ?policy.window(),
            "Creating rate limiter"
        );

        Self {
            policy,
            entries: Arc::new(EntryStore::new()),
            clock,
            sweeper: Mutex::new(None),
        }
    }

    /// Get the policy this limiter enforces.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Check whether `key` may perform one more action, counting it if so.
    pub fn is_allowed(&self, key: &str) -> bool {
        self.check(key).allowed
    }

    /// Check `key` against the policy and return the full verdict.
    ///
    /// This has the same effect on state as [`is_allowed`](Self::is_allowed):
    /// an expired or missing window is replaced by a fresh one holding this
    /// action, an active window is incremented while under the limit, and a
    /// denied check leaves the window untouched.
    pub fn check(&self, key: &str) -> Decision {
        let now = self.clock.now();
        let limit = self.policy.max_requests();
        let window = self.policy.window();

        trace!(policy = %self.policy.key_prefix(), key = %key, "Checking rate limit");

        // The entry guard holds the shard lock, so the read-check-increment
        // below cannot interleave with another check for the same key.
        let (allowed, counter) = match self.entries.entry(self.policy.full_key(key)) {
            Entry::Occupied(mut occupied) if occupied.get().is_active(now) => {
                let counter = occupied.get_mut();
                let allowed = counter.try_increment(limit);
                (allowed, *counter)
            }
            Entry::Occupied(mut occupied) => {
                let counter = WindowCounter::open(now, window);
                occupied.insert(counter);
                debug!(policy = %self.policy.key_prefix(), key = %key, "Window expired, opening new window");
                (true, counter)
            }
            Entry::Vacant(vacant) => {
                let counter = WindowCounter::open(now, window);
                vacant.insert(counter);
                debug!(policy = %self.policy.key_prefix(), key = %key, "Opening rate limit window");
                (true, counter)
            }
        };

        if !allowed {
            debug!(
                policy = %self.policy.key_prefix(),
                key = %key,
                count = counter.count(),
                limit = limit,
                "Rate limit exceeded"
            );
        }

        Decision {
            allowed,
            limit,
            remaining: counter.remaining(limit),
            reset_after_ms: counter.duration_until_reset(now).as_millis() as u64,
        }
    }

    /// Get the quota left for `key` in its current window.
    ///
    /// Returns the full quota when the key has no active window. Never
    /// modifies state.
    pub fn get_remaining(&self, key: &str) -> u64 {
        let now = self.clock.now();
        let limit = self.policy.max_requests();

        self.entries
            .get(&self.policy.full_key(key))
            .filter(|counter| counter.is_active(now))
            .map(|counter| counter.remaining(limit))
            .unwrap_or(limit)
    }

    /// Get the time until `key`'s current window ends.
    ///
    /// Returns zero when the key has no active window. Never modifies state.
    pub fn get_reset_time(&self, key: &str) -> Duration {
        let now = self.clock.now();

        self.entries
            .get(&self.policy.full_key(key))
            .map(|counter| counter.duration_until_reset(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Drop `key`'s window, restoring its full quota immediately.
    ///
    /// Returns `true` if the key had state.
    pub fn reset(&self, key: &str) -> bool {
        let removed = self.entries.remove(&self.policy.full_key(key)).is_some();
        debug!(policy = %self.policy.key_prefix(), key = %key, removed = removed, "Reset rate limit key");
        removed
    }

    /// Drop every window owned by this limiter.
    pub fn reset_all(&self) {
        self.entries.clear();
        debug!(policy = %self.policy.key_prefix(), "Reset all rate limit keys");
    }

    /// Get the number of stored windows, expired or not.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Run one cleanup pass now, evicting windows that have ended.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep_expired(&self) -> usize {
        sweeper::sweep_expired(&self.entries, self.clock.now())
    }

    /// Start evicting expired windows every `interval` on the current tokio
    /// runtime.
    ///
    /// Starting an already running sweeper is a no-op.
    ///
    /// # Errors
    /// Fails for a zero interval or when no tokio runtime is running.
    pub fn start_cleanup(&self, interval: Duration) -> Result<()> {
        let mut sweeper = self.sweeper.lock();

        if sweeper.as_ref().is_some_and(|s| !s.is_finished()) {
            warn!(policy = %self.policy.key_prefix(), "Cleanup sweeper already running");
            return Ok(());
        }

        *sweeper = Some(CleanupSweeper::spawn(
            Arc::downgrade(&self.entries),
            Arc::clone(&self.clock),
            interval,
            self.policy.key_prefix(),
        )?);

        info!(policy = %self.policy.key_prefix(), interval = ?interval, "Rate limiter cleanup enabled");
        Ok(())
    }

    /// Stop the cleanup task.
    ///
    /// Returns `true` if a sweeper was running.
    pub fn stop_cleanup(&self) -> bool {
        let stopped = match self.sweeper.lock().take() {
            Some(sweeper) => {
                sweeper.stop();
                true
            }
            None => false,
        };

        if stopped {
            info!(policy = %self.policy.key_prefix(), "Rate limiter cleanup stopped");
        }
        stopped
    }

    /// Whether a cleanup task is currently running.
    pub fn is_cleanup_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|s| !s.is_finished())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy)
            .field("entries", &self.entries.len())
            .field("cleanup_running", &self.is_cleanup_running())
            .finish()
    }
}
