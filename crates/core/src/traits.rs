//! Interface-only hooks for the transaction manager (spec §1 Out of scope:
//! "Transaction manager surface API ... the core exposes the row-visibility
//! and undo-log hooks it needs, no more").
//!
//! The engine never implements these traits itself; it only calls through
//! them when a caller supplies an implementation. With no implementation
//! supplied, every shard is read in "read-committed, see everything live"
//! mode, which is the default used by the scenarios in spec §8.

use crate::types::RecId;
use crate::value::Value;

/// Decides whether a given row is visible to the current reader.
///
/// A transaction manager built on top of this engine would implement this
/// to hide rows written by transactions not yet committed, or committed
/// after the reader's snapshot was taken. The engine calls `is_visible`
/// once per candidate row during a scan, after tombstone filtering.
pub trait VisibilityOracle: Send + Sync {
    /// Return `true` if `recid` should be visible to the current scan.
    fn is_visible(&self, recid: RecId) -> bool;
}

/// Records enough information for an external transaction manager to undo
/// a delete or update if its enclosing transaction aborts.
///
/// The shard calls this *before* mutating its own state, so a panic or
/// error partway through logging never leaves the undo log ahead of the
/// data it describes.
pub trait UndoLog: Send + Sync {
    /// About to delete `recid`; `old_row` is the full row content about to
    /// become unreachable.
    fn record_delete(&self, recid: RecId, old_row: &[Value]);

    /// About to insert a brand new row at the recid it will be assigned
    /// once the insert completes (used so an abort can re-tombstone it).
    fn record_insert(&self, recid: RecId);
}

/// A no-op implementation used when no external transaction manager is
/// attached: every row is visible, nothing is undoable.
pub struct AlwaysVisible;

impl VisibilityOracle for AlwaysVisible {
    fn is_visible(&self, _recid: RecId) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_visible_is_always_true() {
        let v = AlwaysVisible;
        assert!(v.is_visible(0));
        assert!(v.is_visible(u64::MAX));
    }
}
