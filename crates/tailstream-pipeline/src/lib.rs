//! Sequenced fan-out CDC pipeline over `tailstream-core`.
//!
//! One fixed pipeline shape, sized for a single producer and a small,
//! static worker pool:
//!
//! ```text
//! ┌────────────────┐   ordered    ┌─────────┐  batches  ┌────────────┐
//! │  EventOrderer  │──── queue ──▶│ batcher │──────────▶│ dispatcher │
//! └────────────────┘              └─────────┘           └─────┬──────┘
//!                                              seq + round-robin
//!                          ┌──────────┐   ┌──────────┐   ┌──────────┐
//!                          │ worker 0 │   │ worker 1 │   │ worker N │
//!                          └────┬─────┘   └────┬─────┘   └────┬─────┘
//!                               └───────┬──────┘──────────────┘
//!                                       ▼  out-of-order completion
//!                               ┌───────────────┐      ┌───────────┐
//!                               │ ReorderBuffer │─────▶│ sink task │
//!                               └───────────────┘      └───────────┘
//! ```
//!
//! The dispatcher tags every batch with a gapless, strictly increasing
//! sequence number and hands it to the next worker in cyclic order;
//! the reorder buffer releases worker outputs downstream in exactly
//! dispatch order regardless of completion skew.

#![warn(missing_docs)]

mod batcher;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sink_task;

pub use config::{FailurePolicy, PipelineConfig};
pub use dispatch::{Enrichment, EnrichmentError, SequencedBatch};
pub use error::PipelineError;
pub use metrics::{DispatchMetrics, DispatchMetricsSnapshot};
pub use pipeline::{Lifecycle, Pipeline};
pub use sink_task::{BulkPublisher, PublishError, SinkTaskHandle};
