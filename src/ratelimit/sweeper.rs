//! Background eviction of expired windows.
//!
//! The sweeper only holds a weak reference to the store it cleans. It exits
//! when told to stop, when its handle is dropped, or once the store itself
//! has been dropped.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::counter::WindowCounter;
use crate::clock::Clock;
use crate::error::{QuotaguardError, Result};

/// Default interval between sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Keyed window state owned by a limiter.
pub(crate) type EntryStore = DashMap<String, WindowCounter>;

/// Remove every counter whose window has ended at `now`.
///
/// Returns the number of removed entries.
pub(crate) fn sweep_expired(entries: &EntryStore, now: std::time::Instant) -> usize {
    let mut removed = 0;
    entries.retain(|_, counter| {
        let keep = counter.is_active(now);
        if !keep {
            removed += 1;
        }
        keep
    });
    removed
}

/// Handle to a running cleanup task.
///
/// Dropping the handle stops the task.
pub struct CleanupSweeper {
    handle: JoinHandle<()>,
    shutdown: Option<oneshot::Sender<()>>,
    interval: Duration,
}

impl CleanupSweeper {
    /// Spawn a sweep task on the current tokio runtime.
    ///
    /// # Errors
    /// Returns `QuotaguardError::Config` for a zero interval and
    /// `QuotaguardError::Runtime` when called outside a tokio runtime.
    pub(crate) fn spawn(
        store: Weak<EntryStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        name: &str,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(QuotaguardError::Config(
                "cleanup interval must be greater than 0".to_string(),
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| QuotaguardError::Runtime(format!("cannot start cleanup sweeper: {e}")))?;

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        debug!(policy = %name, interval = ?interval, "Spawning cleanup sweeper");
        let name = name.to_string();

        let handle = runtime.spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        let Some(entries) = store.upgrade() else {
                            debug!(policy = %name, "Store dropped, cleanup sweeper exiting");
                            break;
                        };

                        let removed = sweep_expired(&entries, clock.now());
                        if removed > 0 {
                            debug!(
                                policy = %name,
                                removed = removed,
                                remaining = entries.len(),
                                "Swept expired rate limit entries"
                            );
                        }
                    }
                }
            }
        });

        Ok(Self {
            handle,
            shutdown: Some(shutdown_tx),
            interval,
        })
    }

    /// Get the sweep interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for CleanupSweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

impl std::fmt::Debug for CleanupSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupSweeper")
            .field("interval", &self.interval)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Instant;

    fn store_with(now: Instant, windows: &[(&str, u64)]) -> EntryStore {
        let store = EntryStore::new();
        for (key, window_ms) in windows {
            store.insert(
                key.to_string(),
                WindowCounter::open(now, Duration::from_millis(*window_ms)),
            );
        }
        store
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let now = Instant::now();
        let store = store_with(now, &[("a", 100), ("b", 100), ("c", 1000)]);

        let removed = sweep_expired(&store, now + Duration::from_millis(100));
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains_key("c"));
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let store = Arc::new(EntryStore::new());
        let err = CleanupSweeper::spawn(
            Arc::downgrade(&store),
            Arc::new(ManualClock::default()),
            DEFAULT_CLEANUP_INTERVAL,
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, QuotaguardError::Runtime(_)));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let store = Arc::new(EntryStore::new());
        let err = CleanupSweeper::spawn(
            Arc::downgrade(&store),
            Arc::new(ManualClock::default()),
            Duration::ZERO,
            "test",
        )
        .unwrap_err();
        assert!(matches!(err, QuotaguardError::Config(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_on_tick() {
        let clock = ManualClock::default();
        let store = Arc::new(store_with(clock.now(), &[("a", 1000), ("b", 1000)]));
        clock.advance(Duration::from_secs(2));

        let sweeper = CleanupSweeper::spawn(
            Arc::downgrade(&store),
            Arc::new(clock.clone()),
            Duration::from_secs(60),
            "test",
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.len(), 2);

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(store.len(), 0);

        sweeper.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_exits_when_store_dropped() {
        let store = Arc::new(EntryStore::new());
        let sweeper = CleanupSweeper::spawn(
            Arc::downgrade(&store),
            Arc::new(ManualClock::default()),
            Duration::from_secs(1),
            "test",
        )
        .unwrap();

        drop(store);
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;

        assert!(sweeper.is_finished());
    }
}
