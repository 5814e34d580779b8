//! Epoch-ordered event tailer.
//!
//! The source database delivers events in epoch batches with an explicit
//! "epoch closed" barrier signal but no cross-epoch ordering guarantee.
//! [`EventOrderer`] accumulates events between barriers, sorts each
//! epoch's working set with the deterministic epoch comparator, and
//! drains it into a single-consumer ordered queue, converting an
//! unordered delivery stream into a total order downstream stages can
//! rely on.
//!
//! After an unclean shutdown, [`EventOrderer::recover`] replays the
//! persisted log grouped by epoch identifier, reproducing exactly the
//! order live barrier processing would have produced. Recovery must
//! finish before live observation begins; the pipeline facade sequences
//! this.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{QueueClosed, RecoveryError, StoreError};
use crate::event::{epoch_order, EpochId, MutationEvent, RawMutation};
use crate::metrics::OrdererMetrics;

/// All persisted events of one epoch, as returned by the recovery query.
#[derive(Debug, Clone)]
pub struct EpochBatch {
    /// The epoch identifier (global checkpoint id).
    pub epoch: EpochId,
    /// The epoch's rows, in arbitrary order.
    pub rows: Vec<RawMutation>,
}

/// Recovery surface of the external event-log store.
///
/// On restart the store exposes all not-yet-consumed events grouped by
/// epoch identifier, retrievable in ascending identifier order.
#[async_trait::async_trait]
pub trait EventLogStore: Send + Sync {
    /// Returns all pending epochs in ascending epoch-identifier order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails; recovery aborts.
    async fn pending_by_epoch(&self) -> Result<Vec<EpochBatch>, StoreError>;
}

/// Accumulates raw change events between epoch barriers and drains each
/// closed epoch, sorted, into the ordered consumption queue.
///
/// `observe` is called from the database's event-callback thread;
/// `on_barrier` from wherever the barrier signal is surfaced. The
/// working set is guarded by a single mutex covering both the append
/// and the barrier swap, so events observed after a swap only ever land
/// in the next epoch.
pub struct EventOrderer {
    /// The current epoch's working set. Swapped out wholesale on barrier.
    current: Mutex<Vec<MutationEvent>>,
    /// Producing half of the ordered queue.
    tx: mpsc::Sender<MutationEvent>,
    metrics: Arc<OrdererMetrics>,
}

/// Consuming half of the ordered queue.
///
/// Single consumer by construction: this struct owns the receiver and is
/// handed out exactly once from [`EventOrderer::new`]. Fan-out across
/// workers happens later, at dispatch.
pub struct OrderedEvents {
    rx: mpsc::Receiver<MutationEvent>,
}

impl EventOrderer {
    /// Creates an orderer and the consuming half of its ordered queue.
    ///
    /// The queue is bounded at `queue_capacity`; a full queue blocks the
    /// barrier flush (backpressure) rather than dropping events.
    #[must_use]
    pub fn new(queue_capacity: usize) -> (Self, OrderedEvents) {
        let (tx, rx) = mpsc::channel(queue_capacity);
        (
            Self {
                current: Mutex::new(Vec::new()),
                tx,
                metrics: Arc::new(OrdererMetrics::default()),
            },
            OrderedEvents { rx },
        )
    }

    /// Shared handle to the tailer's counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<OrdererMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Appends one raw row to the current epoch's working set.
    ///
    /// Rows with an unrecognized operation code are logged at error
    /// level, counted, and discarded; they never reach the ordered
    /// queue or a sequence number.
    pub fn observe(&self, raw: RawMutation) {
        match MutationEvent::try_from_raw(raw) {
            Ok(event) => {
                let size = {
                    let mut set = self.current.lock();
                    set.push(event);
                    set.len()
                };
                self.metrics.record_observed();
                tracing::debug!(
                    inode = event.inode_id,
                    op = ?event.op,
                    epoch = event.epoch,
                    working_set = size,
                    "observed mutation"
                );
            }
            Err(e) => {
                self.metrics.record_dropped();
                tracing::error!(error = %e, "dropping malformed mutation");
            }
        }
    }

    /// Closes the current epoch.
    ///
    /// Atomically swaps the working set for a fresh one; if the old set
    /// is non-empty, sorts it with the epoch comparator and drains it
    /// into the ordered queue. An empty epoch produces nothing
    /// downstream.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the consumer went away mid-flush.
    pub async fn on_barrier(&self) -> Result<(), QueueClosed> {
        let closed = {
            let mut set = self.current.lock();
            if set.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *set)
        };
        tracing::trace!(events = closed.len(), "epoch barrier");
        self.flush_epoch(closed).await
    }

    /// Replays all persisted epochs after an unclean shutdown.
    ///
    /// Epochs are replayed in ascending identifier order, each sorted
    /// with the same comparator live processing uses, so the ordered
    /// queue ends up identical to what barrier-by-barrier delivery
    /// would have produced. Returns the number of events replayed.
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError`] if the store query fails, if epochs
    /// come back out of ascending order, or if the consumer went away.
    /// Recovery is all-or-nothing; the caller must not begin live
    /// observation after a failure.
    pub async fn recover(&self, store: &dyn EventLogStore) -> Result<u64, RecoveryError> {
        let epochs = store.pending_by_epoch().await?;
        let mut prev: Option<EpochId> = None;
        let mut replayed: u64 = 0;

        for batch in epochs {
            if let Some(p) = prev {
                if batch.epoch <= p {
                    return Err(RecoveryError::EpochOrder {
                        prev: p,
                        found: batch.epoch,
                    });
                }
            }
            prev = Some(batch.epoch);

            let mut events = Vec::with_capacity(batch.rows.len());
            for raw in batch.rows {
                match MutationEvent::try_from_raw(raw) {
                    Ok(event) => events.push(event),
                    Err(e) => {
                        self.metrics.record_dropped();
                        tracing::error!(
                            epoch = batch.epoch,
                            error = %e,
                            "dropping malformed mutation during replay"
                        );
                    }
                }
            }

            replayed += events.len() as u64;
            tracing::debug!(epoch = batch.epoch, events = events.len(), "replaying epoch");
            self.flush_epoch(events).await?;
        }

        self.metrics.record_replayed(replayed);
        tracing::info!(events = replayed, "recovery replay complete");
        Ok(replayed)
    }

    /// Sorts one closed epoch and drains it into the ordered queue.
    async fn flush_epoch(&self, mut events: Vec<MutationEvent>) -> Result<(), QueueClosed> {
        // Stable sort: comparator ties keep arrival order.
        events.sort_by(epoch_order);
        for event in events {
            self.tx.send(event).await.map_err(|_| QueueClosed)?;
        }
        self.metrics.record_epoch_flushed();
        Ok(())
    }
}

impl OrderedEvents {
    /// Returns the next event in FIFO order, waiting if the queue is
    /// empty. Returns `None` once the orderer has been dropped and the
    /// queue is drained.
    pub async fn consume(&mut self) -> Option<MutationEvent> {
        self.rx.recv().await
    }
}
