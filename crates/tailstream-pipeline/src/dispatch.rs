//! Sequence assignment and round-robin dispatch across a fixed worker
//! pool.
//!
//! A single dispatcher task pops micro-batches, tags each with a
//! monotonically increasing sequence number (starting at 1, no gaps, no
//! reuse) and submits it to the next worker in cyclic order. Each worker
//! owns its enrichment unit exclusively and its own bounded intake, so a
//! slow worker backpressures only once its intake fills. The sequence
//! counter and round-robin cursor stay loop-local to the one dispatcher
//! task.

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use tailstream_core::{DownstreamSink, MutationEvent, ReorderBuffer, TaggedResult};

use crate::config::FailurePolicy;
use crate::error::PipelineError;
use crate::metrics::DispatchMetrics;

/// A batch of ordered events tagged with its dispatch sequence number.
///
/// Owned by exactly one worker from assignment to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedBatch {
    /// Sequence number, strictly increasing by 1 per batch from 1.
    pub seq: u64,
    /// The ordered events of this batch.
    pub events: Vec<MutationEvent>,
}

/// External enrichment logic run inside a worker.
///
/// Implementations may take arbitrarily long and may keep per-worker
/// state (a connection, a cache); each worker owns its unit exclusively.
#[async_trait::async_trait]
pub trait Enrichment: Send + 'static {
    /// The enriched payload type handed downstream.
    type Payload: Send + 'static;

    /// Processes one sequenced batch into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError`] if the batch cannot be processed;
    /// what happens next is governed by the configured
    /// [`FailurePolicy`].
    async fn enrich(&mut self, batch: &SequencedBatch) -> Result<Self::Payload, EnrichmentError>;
}

/// A worker could not process a batch.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct EnrichmentError(pub String);

/// Join handle for one worker task.
pub(crate) struct WorkerHandle {
    pub(crate) join: JoinHandle<()>,
}

/// Spawns one worker task owning `enrichment`.
///
/// The worker drains its intake in FIFO order, one batch at a time, and
/// submits each tagged output to the shared reorder buffer. Returns the
/// intake sender (held by the dispatcher only, so worker shutdown
/// cascades from dispatcher exit) and the join handle.
pub(crate) fn spawn_worker<T, S>(
    idx: usize,
    mut enrichment: Box<dyn Enrichment<Payload = T>>,
    reorder: Arc<ReorderBuffer<T, S>>,
    policy: FailurePolicy,
    fatal_tx: mpsc::UnboundedSender<PipelineError>,
    intake_capacity: usize,
    metrics: Arc<DispatchMetrics>,
) -> (mpsc::Sender<SequencedBatch>, WorkerHandle)
where
    T: Send + 'static,
    S: DownstreamSink<T> + 'static,
{
    let (tx, mut rx) = mpsc::channel::<SequencedBatch>(intake_capacity);

    let join = tokio::spawn(async move {
        tracing::debug!(worker = idx, "worker started");
        while let Some(batch) = rx.recv().await {
            let seq = batch.seq;
            match enrichment.enrich(&batch).await {
                Ok(payload) => {
                    reorder.submit(TaggedResult { seq, payload });
                }
                Err(e) => {
                    metrics.record_worker_failure();
                    match policy {
                        FailurePolicy::Skip => {
                            tracing::warn!(
                                worker = idx,
                                seq,
                                error = %e,
                                "enrichment failed, marking sequence skipped"
                            );
                            reorder.skip(seq);
                        }
                        FailurePolicy::Fatal => {
                            tracing::error!(
                                worker = idx,
                                seq,
                                error = %e,
                                "enrichment failed, halting pipeline"
                            );
                            let _ = fatal_tx.send(PipelineError::Worker {
                                worker: idx,
                                seq,
                                message: e.to_string(),
                            });
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!(worker = idx, "worker stopped");
    });

    (tx, WorkerHandle { join })
}

/// Dispatcher task loop.
///
/// Exits when the shutdown signal fires, the batch queue closes, or a
/// worker intake closes (fatal worker exit).
pub(crate) async fn run_dispatcher(
    mut batches: mpsc::Receiver<Vec<MutationEvent>>,
    workers: Vec<mpsc::Sender<SequencedBatch>>,
    metrics: Arc<DispatchMetrics>,
    shutdown: Arc<Notify>,
) {
    debug_assert!(!workers.is_empty());
    let mut seq: u64 = 0;
    let mut cursor: usize = 0;

    loop {
        tokio::select! {
            biased;

            () = shutdown.notified() => {
                tracing::debug!("dispatcher shutdown");
                break;
            }

            batch = batches.recv() => {
                let Some(events) = batch else {
                    tracing::debug!("batch queue closed, dispatcher stopping");
                    break;
                };
                seq += 1;
                let target = cursor;
                cursor = (cursor + 1) % workers.len();
                metrics.record_dispatch(events.len() as u64);
                tracing::trace!(seq, worker = target, events = events.len(), "dispatching batch");
                if workers[target].send(SequencedBatch { seq, events }).await.is_err() {
                    tracing::warn!(seq, worker = target, "worker intake closed, dispatcher stopping");
                    break;
                }
            }
        }
    }
}
