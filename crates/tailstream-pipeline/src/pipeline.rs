//! Pipeline wiring and lifecycle.
//!
//! Assembles the fixed pipeline shape (tail, order, fan out, reorder,
//! release) from the core primitives:
//!
//! ```text
//! event callback ─▶ EventOrderer ─▶ batcher ─▶ dispatcher ─▶ workers
//!                                                              │
//!                         DownstreamSink ◀── ReorderBuffer ◀───┘
//! ```
//!
//! One batcher task, one dispatcher task, `N` worker tasks. Recovery
//! replay, when requested, completes before the pipeline handle is
//! returned, so live observation can never interleave with replayed
//! events.

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use tailstream_core::{DownstreamSink, EventLogStore, EventOrderer, ReorderBuffer};

use crate::batcher::run_batcher;
use crate::config::PipelineConfig;
use crate::dispatch::{run_dispatcher, spawn_worker, Enrichment};
use crate::error::PipelineError;
use crate::metrics::{DispatchMetrics, DispatchMetricsSnapshot};

/// Explicit pipeline lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed; recovery replay may still be running.
    Created,
    /// Live: observing events and dispatching batches.
    Running,
    /// Shut down; all tasks joined.
    Stopped,
}

/// A running pipeline instance.
///
/// Created via [`Pipeline::start`]; the event-callback surface is the
/// [`EventOrderer`] returned by [`Pipeline::orderer`]. Dropping the
/// pipeline without calling [`Pipeline::shutdown`] detaches the tasks;
/// they exit once their channels close.
pub struct Pipeline {
    orderer: Arc<EventOrderer>,
    lifecycle: Lifecycle,
    batcher_shutdown: Arc<Notify>,
    dispatcher_shutdown: Arc<Notify>,
    fatal_rx: mpsc::UnboundedReceiver<PipelineError>,
    metrics: Arc<DispatchMetrics>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Starts the pipeline: spawns the batcher, the dispatcher, and one
    /// worker per enrichment unit, then (if `store` is given) replays
    /// the persisted log before returning.
    ///
    /// The worker pool size is `enrichers.len()` and is fixed for the
    /// life of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for an empty worker pool or
    /// zero-sized queues, and [`PipelineError::Recovery`] if replay
    /// fails; in that case all spawned tasks are torn down and live
    /// observation never begins.
    pub async fn start<T, S>(
        config: PipelineConfig,
        enrichers: Vec<Box<dyn Enrichment<Payload = T>>>,
        sink: S,
        store: Option<&dyn EventLogStore>,
    ) -> Result<Self, PipelineError>
    where
        T: Send + 'static,
        S: DownstreamSink<T> + 'static,
    {
        if enrichers.is_empty() {
            return Err(PipelineError::Config("worker pool is empty".into()));
        }
        config.validate().map_err(PipelineError::Config)?;

        let pool_size = enrichers.len();
        let (orderer, ordered) = EventOrderer::new(config.queue_capacity);
        let orderer = Arc::new(orderer);
        let reorder = Arc::new(ReorderBuffer::new(sink));
        let metrics = Arc::new(DispatchMetrics::default());
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();

        let mut worker_txs = Vec::with_capacity(pool_size);
        let mut tasks = Vec::with_capacity(pool_size + 2);
        for (idx, enrichment) in enrichers.into_iter().enumerate() {
            let (tx, handle) = spawn_worker(
                idx,
                enrichment,
                Arc::clone(&reorder),
                config.failure_policy,
                fatal_tx.clone(),
                config.worker_intake_capacity,
                Arc::clone(&metrics),
            );
            worker_txs.push(tx);
            tasks.push(handle.join);
        }
        // Workers hold the only remaining fatal senders; `fatal_rx`
        // returning `None` therefore means every worker exited cleanly.
        drop(fatal_tx);

        let (batch_tx, batch_rx) = mpsc::channel(config.batch_queue_capacity);
        let dispatcher_shutdown = Arc::new(Notify::new());
        tasks.push(tokio::spawn(run_dispatcher(
            batch_rx,
            worker_txs,
            Arc::clone(&metrics),
            Arc::clone(&dispatcher_shutdown),
        )));

        let batcher_shutdown = Arc::new(Notify::new());
        tasks.push(tokio::spawn(run_batcher(
            ordered,
            batch_tx,
            config.batch_size,
            config.batch_window,
            Arc::clone(&batcher_shutdown),
        )));

        let mut pipeline = Self {
            orderer,
            lifecycle: Lifecycle::Created,
            batcher_shutdown,
            dispatcher_shutdown,
            fatal_rx,
            metrics,
            tasks,
        };

        // Recovery is all-or-nothing and strictly precedes live
        // observation: the orderer is not handed out until replay is
        // done. The consuming tasks are already up, so a replay larger
        // than the queue capacity cannot deadlock.
        if let Some(store) = store {
            if let Err(e) = pipeline.orderer.recover(store).await {
                pipeline.stop_tasks().await;
                pipeline.lifecycle = Lifecycle::Stopped;
                return Err(e.into());
            }
        }

        pipeline.lifecycle = Lifecycle::Running;
        tracing::info!(workers = pool_size, "pipeline started");
        Ok(pipeline)
    }

    /// The event-callback surface: feed `observe` / `on_barrier` from
    /// the database subscription here.
    #[must_use]
    pub fn orderer(&self) -> Arc<EventOrderer> {
        Arc::clone(&self.orderer)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Snapshot of the dispatch counters.
    #[must_use]
    pub fn metrics(&self) -> DispatchMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Waits for a fatal pipeline error.
    ///
    /// Returns `Some` with the first fatal error (a worker failure
    /// under the fatal policy), or `None` once every worker has exited
    /// cleanly.
    pub async fn fault(&mut self) -> Option<PipelineError> {
        self.fatal_rx.recv().await
    }

    /// Stops all tasks and waits for them to finish.
    ///
    /// In-flight batches are drained; a partial micro-batch is
    /// forwarded before the batcher exits. Idempotent.
    pub async fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        self.lifecycle = Lifecycle::Stopped;
        self.stop_tasks().await;
        tracing::info!("pipeline stopped");
    }

    async fn stop_tasks(&mut self) {
        self.batcher_shutdown.notify_one();
        self.dispatcher_shutdown.notify_one();
        // Worker shutdown cascades: the dispatcher owns the only intake
        // senders, so its exit closes every worker's channel.
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "pipeline task join error");
            }
        }
    }
}
