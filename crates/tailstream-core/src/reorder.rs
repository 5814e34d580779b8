//! Strict-order release of out-of-order worker outputs.
//!
//! Workers complete in arbitrary order; [`ReorderBuffer`] withholds each
//! tagged output until every predecessor sequence number has been
//! released, then forwards it to the downstream sink. Insert and the
//! release loop run as one critical section under a single mutex, so
//! concurrent submitters can neither double-release a head nor strand a
//! releasable one.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

use parking_lot::Mutex;

use crate::sink::DownstreamSink;

/// Output produced by a worker: the sequence number of its input batch
/// plus the enriched payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedResult<T> {
    /// Sequence number assigned at dispatch.
    pub seq: u64,
    /// The processed payload.
    pub payload: T,
}

/// Heap entry ordered by sequence number only.
struct Pending<T>(TaggedResult<T>);

impl<T> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.seq == other.0.seq
    }
}

impl<T> Eq for Pending<T> {}

impl<T> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Pending<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.seq.cmp(&other.0.seq)
    }
}

struct State<T> {
    /// Min-heap of results waiting for their predecessors.
    pending: BinaryHeap<Reverse<Pending<T>>>,
    /// Sequence numbers explicitly marked permanently skipped.
    skipped: BTreeSet<u64>,
    /// Highest sequence number released (or skipped) so far.
    last_released: u64,
}

/// Reassembles tagged worker outputs into strict dispatch order before
/// handing them to the downstream sink.
///
/// A result with sequence `n` is released only once `last_released`
/// reaches `n - 1`; a stalled worker therefore blocks all later
/// releases indefinitely. That is the accepted cost of strict-order
/// delivery, not a defect.
pub struct ReorderBuffer<T, S> {
    state: Mutex<State<T>>,
    sink: S,
}

impl<T, S: DownstreamSink<T>> ReorderBuffer<T, S> {
    /// Creates an empty buffer forwarding releases into `sink`.
    #[must_use]
    pub fn new(sink: S) -> Self {
        Self {
            state: Mutex::new(State {
                pending: BinaryHeap::new(),
                skipped: BTreeSet::new(),
                last_released: 0,
            }),
            sink,
        }
    }

    /// Inserts a worker output, then releases every result that is now
    /// in order, stopping at the first gap.
    ///
    /// Safe to call from any number of worker threads concurrently; the
    /// whole insert-and-drain runs under the buffer lock.
    pub fn submit(&self, result: TaggedResult<T>) {
        let mut state = self.state.lock();
        debug_assert!(
            result.seq > state.last_released,
            "sequence {} already released (last_released {})",
            result.seq,
            state.last_released
        );
        state.pending.push(Reverse(Pending(result)));
        self.drain(&mut state);
    }

    /// Marks a sequence number as permanently skipped so later results
    /// can still be released across the gap.
    ///
    /// Used by the worker failure policy that trades completeness for
    /// liveness; the default policy halts the pipeline instead.
    pub fn skip(&self, seq: u64) {
        let mut state = self.state.lock();
        if seq <= state.last_released {
            tracing::warn!(seq, "skip requested for already-released sequence");
            return;
        }
        state.skipped.insert(seq);
        self.drain(&mut state);
    }

    /// The highest sequence number released (or skipped) so far.
    #[must_use]
    pub fn last_released(&self) -> u64 {
        self.state.lock().last_released
    }

    /// Number of results currently held back waiting for predecessors.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Release loop: forward in-order results until the first gap.
    /// Caller holds the state lock.
    fn drain(&self, state: &mut State<T>) {
        loop {
            let next = state.last_released + 1;

            if state.skipped.remove(&next) {
                state.last_released = next;
                tracing::debug!(seq = next, "sequence permanently skipped");
                continue;
            }

            let head_ready = matches!(
                state.pending.peek(),
                Some(Reverse(head)) if head.0.seq == next
            );
            if !head_ready {
                break;
            }
            let Some(Reverse(head)) = state.pending.pop() else {
                break;
            };
            state.last_released = next;
            tracing::debug!(seq = next, "releasing enriched batch downstream");
            self.sink.add_data(head.0);
        }
    }
}
