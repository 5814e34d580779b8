//! Pipeline-level errors.

use tailstream_core::RecoveryError;

/// Errors surfaced by the pipeline facade.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid configuration (empty worker pool, zero-sized queues).
    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    /// Startup recovery replay failed; nothing was started.
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// A worker hit an unrecoverable processing error under
    /// [`FailurePolicy::Fatal`](crate::FailurePolicy::Fatal). The gap
    /// at `seq` cannot be filled, so the pipeline halts.
    #[error("worker {worker} failed on batch {seq}: {message}")]
    Worker {
        /// Index of the failing worker.
        worker: usize,
        /// Sequence number of the batch that failed.
        seq: u64,
        /// The enrichment error.
        message: String,
    },
}
