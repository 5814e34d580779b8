//! Lock-free tailer metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the event tailer, using atomics (no locks on the data
/// path).
#[derive(Debug, Default)]
pub struct OrdererMetrics {
    /// Events accepted into an epoch working set.
    pub observed: AtomicU64,
    /// Malformed events dropped at the observation boundary.
    pub dropped: AtomicU64,
    /// Non-empty epochs flushed into the ordered queue.
    pub epochs_flushed: AtomicU64,
    /// Events replayed from the persisted log during recovery.
    pub replayed: AtomicU64,
}

impl OrdererMetrics {
    /// Records an accepted event.
    pub fn record_observed(&self) {
        self.observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a dropped malformed event.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a flushed (non-empty) epoch.
    pub fn record_epoch_flushed(&self) {
        self.epochs_flushed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records `count` events replayed from the persisted log.
    pub fn record_replayed(&self, count: u64) {
        self.replayed.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> OrdererMetricsSnapshot {
        OrdererMetricsSnapshot {
            observed: self.observed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            epochs_flushed: self.epochs_flushed.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`OrdererMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrdererMetricsSnapshot {
    /// Events accepted into an epoch working set.
    pub observed: u64,
    /// Malformed events dropped at the observation boundary.
    pub dropped: u64,
    /// Non-empty epochs flushed into the ordered queue.
    pub epochs_flushed: u64,
    /// Events replayed during recovery.
    pub replayed: u64,
}
