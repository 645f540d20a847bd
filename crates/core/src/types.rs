//! Shared identifiers and enums used across the storage engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A row's logical identifier within a single shard.
///
/// `recid < main_count` means the row lives in the compressed main
/// storage; otherwise it lives at `delta[recid - main_count]` (spec §3
/// "Row ID (recid)").
pub type RecId = u64;

/// Stable shard identity, doubles as the on-disk filename stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(pub Uuid);

impl ShardId {
    /// Mint a fresh shard identity.
    pub fn new() -> Self {
        ShardId(Uuid::new_v4())
    }
}

impl Default for ShardId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical column type, independent of the codec ultimately chosen to
/// store it (spec §3 "Column descriptor").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// Fixed-point decimal: `precision` total digits, `scale` after the point.
    Decimal,
    /// Short string, dictionary-encoding friendly.
    Varchar,
    /// Long-form text, overlay-friendly.
    Text,
    /// Opaque bytes.
    Blob,
    /// Calendar date (days since epoch, stored as Int64).
    Date,
    /// Date and time (millis since epoch, stored as Int64).
    Datetime,
    /// JSON document (stored as Text, parsed lazily by callers).
    Json,
}

/// Persistency mode for a table (spec §3 "Table").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistencyMode {
    /// Log is fsynced on every commit.
    Safe,
    /// Log is written but never fsynced.
    Logged,
    /// No disk involvement at all; shards stay in `Write` state forever.
    Memory,
}

/// A `(column, lower, upper)` range extracted from a predicate, used for
/// partition pruning and indexed iteration (spec §3 "Boundary"). Either
/// bound missing means unbounded on that side; both bounds are inclusive.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// Column the range restricts.
    pub column: String,
    /// Inclusive lower bound, or `None` if unbounded below.
    pub lower: Option<crate::Value>,
    /// Inclusive upper bound, or `None` if unbounded above.
    pub upper: Option<crate::Value>,
}

/// `SharedResource` lifecycle state (spec §3 "Shard", §5 "Shared-resource
/// protocol"). Applies to shards and, conceptually, to any lazily
/// materialized on-disk object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Metadata only; content lives on disk.
    Cold,
    /// Loaded and readable, not writable.
    Shared,
    /// Loaded and writable.
    Write,
}
