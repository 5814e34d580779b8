//! Error types for the core tailing and release primitives.

use crate::event::EpochId;

/// The single-consumer ordered queue hung up (its receiver was dropped).
///
/// Surfaces on the producing side of a barrier flush or recovery replay;
/// the pipeline treats it as shutdown in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ordered event queue closed")]
pub struct QueueClosed;

/// Error from the external event-log store's recovery query.
#[derive(Debug, Clone, thiserror::Error)]
#[error("event log store: {0}")]
pub struct StoreError(pub String);

/// Startup recovery failed.
///
/// Recovery is all-or-nothing: any of these aborts startup before live
/// event observation begins.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The store's recovery query failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Persisted epochs came back out of ascending identifier order.
    #[error("persisted epoch {found} delivered after epoch {prev}")]
    EpochOrder {
        /// The previously replayed epoch.
        prev: EpochId,
        /// The out-of-order epoch that followed it.
        found: EpochId,
    },

    /// The ordered queue's consumer disappeared during replay.
    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),
}
