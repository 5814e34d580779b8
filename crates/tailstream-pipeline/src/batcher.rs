//! Micro-batching of the ordered event stream.
//!
//! Sits between the single-consumer ordered queue and the dispatcher:
//! accumulates events into a batch until either `batch_size` events are
//! collected or `batch_window` has elapsed since the batch's first
//! event, then forwards the batch. Idles with zero CPU and never emits
//! empty batches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use tailstream_core::{MutationEvent, OrderedEvents};

/// Batcher task loop. Owns the consuming half of the ordered queue.
///
/// Exits when the shutdown signal fires, the ordered queue closes, or
/// the dispatcher goes away; an in-flight partial batch is forwarded
/// before exiting.
pub(crate) async fn run_batcher(
    mut events: OrderedEvents,
    tx: mpsc::Sender<Vec<MutationEvent>>,
    batch_size: usize,
    batch_window: Duration,
    shutdown: Arc<Notify>,
) {
    loop {
        // Wait for the first event of the next batch (blocks, zero CPU).
        let first = tokio::select! {
            biased;

            () = shutdown.notified() => break,

            event = events.consume() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut batch = Vec::with_capacity(batch_size.min(1024));
        batch.push(first);
        let deadline = Instant::now() + batch_window;
        let mut done = false;

        while batch.len() < batch_size {
            tokio::select! {
                biased;

                () = shutdown.notified() => {
                    done = true;
                    break;
                }

                () = tokio::time::sleep_until(deadline) => break,

                event = events.consume() => match event {
                    Some(event) => batch.push(event),
                    None => {
                        done = true;
                        break;
                    }
                },
            }
        }

        tracing::trace!(events = batch.len(), "forwarding micro-batch");
        if tx.send(batch).await.is_err() {
            tracing::debug!("dispatcher gone, batcher stopping");
            break;
        }
        if done {
            break;
        }
    }
    tracing::debug!("batcher stopped");
}
