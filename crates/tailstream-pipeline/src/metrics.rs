//! Lock-free dispatch metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the dispatch/worker stage, using atomics (no locks on
/// the data path).
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Batches handed to workers.
    pub batches: AtomicU64,
    /// Events contained in those batches.
    pub events: AtomicU64,
    /// Enrichment failures (fatal or skipped).
    pub worker_failures: AtomicU64,
}

impl DispatchMetrics {
    /// Records one dispatched batch of `events` events.
    pub fn record_dispatch(&self, events: u64) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(events, Ordering::Relaxed);
    }

    /// Records an enrichment failure.
    pub fn record_worker_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            batches: self.batches.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`DispatchMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchMetricsSnapshot {
    /// Batches handed to workers.
    pub batches: u64,
    /// Events contained in those batches.
    pub events: u64,
    /// Enrichment failures.
    pub worker_failures: u64,
}
