//! Mutation event model and the per-epoch ordering comparator.

use std::cmp::Ordering;

/// The database's global checkpoint id, used as the epoch identifier.
///
/// Every event belongs to exactly one epoch at the time it is observed;
/// the source closes an epoch with an explicit barrier signal.
pub type EpochId = u64;

/// Operation kind carried by a mutation log row.
///
/// The discriminant order participates in the epoch comparator, so the
/// variant order here is part of the ordering contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MutationOp {
    /// An entity was created.
    Add,
    /// An entity was removed.
    Delete,
    /// An entity was modified in place.
    Update,
}

impl MutationOp {
    /// Parses the untyped operation code delivered on the wire.
    ///
    /// Returns `None` for codes this pipeline does not recognize; such
    /// rows are dropped at the observation boundary.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Add),
            1 => Some(Self::Delete),
            2 => Some(Self::Update),
            _ => None,
        }
    }

    /// The wire code for this operation.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Add => 0,
            Self::Delete => 1,
            Self::Update => 2,
        }
    }
}

/// A change row exactly as delivered by the database callback and by the
/// recovery query, operation still an untyped code.
///
/// Parsing the code is the single point where malformed rows are caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMutation {
    /// Entity identifier (inode id).
    pub inode_id: i64,
    /// Untyped operation code; see [`MutationOp::from_code`].
    pub op_code: i32,
    /// Epoch this row was delivered in.
    pub epoch: EpochId,
    /// Event creation time, millis since the Unix epoch.
    pub created_at_ms: i64,
    /// Arrival time at this process, millis since the Unix epoch.
    pub arrived_at_ms: i64,
}

/// One validated change record.
///
/// Created by the event callback, enqueued into the current epoch's
/// working set, consumed exactly once by the ordered queue, and never
/// mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEvent {
    /// Entity identifier (inode id).
    pub inode_id: i64,
    /// Validated operation kind.
    pub op: MutationOp,
    /// Epoch this event belongs to.
    pub epoch: EpochId,
    /// Event creation time, millis since the Unix epoch.
    pub created_at_ms: i64,
    /// Arrival time at this process, millis since the Unix epoch.
    pub arrived_at_ms: i64,
}

impl MutationEvent {
    /// Validates a raw row into an event.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownOp`] if the row carries an operation code this
    /// pipeline does not recognize.
    pub fn try_from_raw(raw: RawMutation) -> Result<Self, UnknownOp> {
        let op = MutationOp::from_code(raw.op_code).ok_or(UnknownOp {
            code: raw.op_code,
            inode_id: raw.inode_id,
        })?;
        Ok(Self {
            inode_id: raw.inode_id,
            op,
            epoch: raw.epoch,
            created_at_ms: raw.created_at_ms,
            arrived_at_ms: raw.arrived_at_ms,
        })
    }
}

/// A mutation row carried an operation code this pipeline does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation code {code} for inode {inode_id}")]
pub struct UnknownOp {
    /// The unrecognized wire code.
    pub code: i32,
    /// Entity the row referred to, for diagnostics.
    pub inode_id: i64,
}

/// Deterministic total order within one epoch:
/// (entity id, operation kind, creation time).
///
/// Arrival-order ties are preserved by draining through a stable sort,
/// so two rows that compare `Equal` here keep their observation order.
#[must_use]
pub fn epoch_order(a: &MutationEvent, b: &MutationEvent) -> Ordering {
    a.inode_id
        .cmp(&b.inode_id)
        .then_with(|| a.op.cmp(&b.op))
        .then_with(|| a.created_at_ms.cmp(&b.created_at_ms))
}
