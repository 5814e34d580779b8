//! Channel-backed downstream sink task.
//!
//! Models the batched-publisher boundary: released results queue into an
//! unbounded channel (so the reorder release loop never blocks) and a
//! dedicated task owning the [`BulkPublisher`] drains them, flushing a
//! bulk request when `flush_size` results have accumulated or on the
//! periodic flush tick, whichever comes first. Retry and backoff are the
//! publisher's own business.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tailstream_core::TaggedResult;

/// Default number of buffered results that triggers a bulk flush.
pub const DEFAULT_FLUSH_SIZE: usize = 500;

/// Default periodic flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// The external bulk writer (e.g. a search-index bulk endpoint).
#[async_trait::async_trait]
pub trait BulkPublisher<T>: Send + 'static {
    /// Publishes one bulk of in-order results.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the bulk request fails; the sink task
    /// logs it and moves on (retry behavior is the publisher's own).
    async fn publish(&mut self, results: Vec<TaggedResult<T>>) -> Result<(), PublishError>;
}

/// A bulk publish attempt failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("bulk publish failed: {0}")]
pub struct PublishError(pub String);

/// Handle for a spawned sink task.
///
/// [`SinkTaskHandle::sink`] hands out the fire-and-forget sender that
/// plugs into the reorder buffer as its downstream sink.
pub struct SinkTaskHandle<T> {
    tx: mpsc::UnboundedSender<TaggedResult<T>>,
    join: JoinHandle<()>,
}

impl<T: Send + 'static> SinkTaskHandle<T> {
    /// Spawns a sink task with the default flush size and interval.
    #[must_use]
    pub fn spawn(name: String, publisher: Box<dyn BulkPublisher<T>>) -> Self {
        Self::spawn_with_options(name, publisher, DEFAULT_FLUSH_SIZE, DEFAULT_FLUSH_INTERVAL)
    }

    /// Spawns a sink task with a custom flush size and interval.
    #[must_use]
    pub fn spawn_with_options(
        name: String,
        publisher: Box<dyn BulkPublisher<T>>,
        flush_size: usize,
        flush_interval: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(run_sink_task(name, publisher, rx, flush_size, flush_interval));
        Self { tx, join }
    }

    /// The fire-and-forget sender feeding this task.
    ///
    /// Implements `DownstreamSink<T>`, so it can be handed directly to
    /// the reorder buffer.
    #[must_use]
    pub fn sink(&self) -> mpsc::UnboundedSender<TaggedResult<T>> {
        self.tx.clone()
    }

    /// Closes the intake and waits for the task to flush and exit.
    ///
    /// All other senders obtained via [`SinkTaskHandle::sink`] must be
    /// dropped for the task to observe the close.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "sink task join error");
        }
    }
}

/// Main loop for a sink task. Owns the publisher exclusively.
async fn run_sink_task<T: Send + 'static>(
    name: String,
    mut publisher: Box<dyn BulkPublisher<T>>,
    mut rx: mpsc::UnboundedReceiver<TaggedResult<T>>,
    flush_size: usize,
    flush_interval: Duration,
) {
    let mut buffer: Vec<TaggedResult<T>> = Vec::new();
    let mut flush_timer = tokio::time::interval(flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Skip the first immediate tick.
    flush_timer.tick().await;

    loop {
        tokio::select! {
            result = rx.recv() => {
                let Some(result) = result else {
                    flush(&name, publisher.as_mut(), &mut buffer).await;
                    tracing::debug!(sink = %name, "sink channel closed");
                    break;
                };
                buffer.push(result);
                if buffer.len() >= flush_size {
                    flush(&name, publisher.as_mut(), &mut buffer).await;
                }
            }

            _ = flush_timer.tick() => {
                flush(&name, publisher.as_mut(), &mut buffer).await;
            }
        }
    }
}

/// Publishes the buffered results, if any.
async fn flush<T: Send + 'static>(
    name: &str,
    publisher: &mut dyn BulkPublisher<T>,
    buffer: &mut Vec<TaggedResult<T>>,
) {
    if buffer.is_empty() {
        return;
    }
    let bulk = std::mem::take(buffer);
    let count = bulk.len();
    tracing::debug!(sink = %name, results = count, "publishing bulk");
    if let Err(e) = publisher.publish(bulk).await {
        tracing::warn!(sink = %name, results = count, error = %e, "bulk publish error");
    }
}
