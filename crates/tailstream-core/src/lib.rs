//! Epoch-ordered CDC tailing and strict-order release primitives.
//!
//! The source database delivers change events in epoch batches delimited
//! by barrier signals, with no ordering guarantee inside an epoch. This
//! crate turns that delivery stream into a total order and keeps that
//! order across a pool of parallel workers:
//!
//! ```text
//! event callback ──▶ EventOrderer ──▶ ordered queue (single consumer)
//!                    (per-epoch sort,                  │
//!                     recovery replay)                 ▼
//!                                          … dispatch / workers …
//!                                                      │
//!                    DownstreamSink ◀── ReorderBuffer ◀┘
//!                                       (in-order release)
//! ```
//!
//! The dispatch and worker stages live in `tailstream-pipeline`; this
//! crate owns the pieces where ordering correctness and concurrency
//! intersect.

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod metrics;
pub mod orderer;
pub mod reorder;
pub mod sink;

pub use error::{QueueClosed, RecoveryError, StoreError};
pub use event::{epoch_order, EpochId, MutationEvent, MutationOp, RawMutation, UnknownOp};
pub use metrics::{OrdererMetrics, OrdererMetricsSnapshot};
pub use orderer::{EpochBatch, EventLogStore, EventOrderer, OrderedEvents};
pub use reorder::{ReorderBuffer, TaggedResult};
pub use sink::DownstreamSink;
