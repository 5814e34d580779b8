//! Pipeline configuration.

use std::time::Duration;

/// Policy for a batch that a worker cannot process.
///
/// A sequence gap can never be filled by another worker, so there is no
/// retry-by-reassignment; the only choices are stopping the pipeline or
/// explicitly marking the sequence number as permanently skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Halt the pipeline with a diagnostic (conservative default).
    #[default]
    Fatal,
    /// Mark the sequence number skipped in the reorder buffer and keep
    /// going; the failed batch is lost.
    Skip,
}

/// Configuration for the sequenced fan-out pipeline.
///
/// The worker pool size is not configured here; it is the number of
/// enrichment units handed to [`Pipeline::start`](crate::Pipeline::start)
/// and is fixed for the life of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum events per dispatched batch.
    pub batch_size: usize,

    /// How long the batcher waits after the first event of a batch for
    /// more events before forwarding a partial batch.
    pub batch_window: Duration,

    /// Capacity of the ordered consumption queue (events). A full queue
    /// blocks the barrier flush rather than dropping events.
    pub queue_capacity: usize,

    /// Capacity of each worker's private intake (batches). A full
    /// intake blocks the dispatcher; it never drops.
    pub worker_intake_capacity: usize,

    /// Capacity of the batcher-to-dispatcher queue (batches).
    pub batch_queue_capacity: usize,

    /// What to do when a worker cannot process a batch.
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 5000,
            batch_window: Duration::from_millis(500),
            queue_capacity: 65536,
            worker_intake_capacity: 64,
            batch_queue_capacity: 16,
            failure_policy: FailurePolicy::Fatal,
        }
    }
}

impl PipelineConfig {
    /// Checks the configuration for zero-sized queues or batches.
    ///
    /// # Errors
    ///
    /// Returns a message naming the offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".into());
        }
        if self.worker_intake_capacity == 0 {
            return Err("worker_intake_capacity must be at least 1".into());
        }
        if self.batch_queue_capacity == 0 {
            return Err("batch_queue_capacity must be at least 1".into());
        }
        Ok(())
    }
}
