//! Downstream sink boundary.

use tokio::sync::mpsc;

use crate::reorder::TaggedResult;

/// Accepts released, in-order results for batched publication.
///
/// `add_data` is fire-and-forget: the sink is assumed non-blocking or
/// internally queued, and the reorder release loop calls it while
/// holding the buffer lock. Batching windows and retry behavior live
/// entirely behind this trait.
pub trait DownstreamSink<T>: Send + Sync {
    /// Hands one released result to the publisher.
    fn add_data(&self, result: TaggedResult<T>);
}

/// An unbounded channel sender is a sink: releases queue into the
/// channel without blocking. Used by the pipeline's sink task and by
/// tests that just collect releases.
impl<T: Send> DownstreamSink<T> for mpsc::UnboundedSender<TaggedResult<T>> {
    fn add_data(&self, result: TaggedResult<T>) {
        let seq = result.seq;
        if self.send(result).is_err() {
            tracing::warn!(seq, "downstream sink receiver dropped, discarding release");
        }
    }
}
