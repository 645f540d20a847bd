//! Column and table schema metadata (spec §3 "Column descriptor", "Table").

use crate::types::{LogicalType, PersistencyMode};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A single column's metadata. Lives in the table schema, not in any one
/// shard; every shard's delta/main storage is keyed by column name.
#[derive(Debug, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within a table.
    pub name: String,
    /// Logical type independent of physical codec.
    pub logical_type: LogicalType,
    /// Total digits for `Decimal` columns.
    pub precision: Option<u8>,
    /// Digits after the decimal point for `Decimal` columns.
    pub scale: Option<u8>,
    /// Whether `Null` is a legal value.
    pub nullable: bool,
    /// Value substituted when an insert omits this column.
    pub default: Option<Value>,
    /// Whether this column is filled from the table's auto-increment counter.
    pub auto_increment: bool,
    /// Evictable without data loss (e.g. a materialized secondary index).
    pub temp: bool,
    /// Free-form documentation, not interpreted by the engine.
    pub comment: Option<String>,
    /// Collation name for string comparison (opaque to the core; string
    /// ordering in `Value` is always byte-wise, collation is a hook for
    /// callers that need locale-aware comparisons on top).
    pub collation: Option<String>,
    /// Incremented every time a scan boundary predicate mentions this
    /// column; feeds `ProposeRepartition` (spec §4.E).
    #[serde(skip, default)]
    pub partitioning_score: AtomicU64,
    /// Projection expression for computed columns, opaque to the core
    /// (query planning is out of scope, spec §1).
    pub computor: Option<String>,
}

impl Clone for ColumnDescriptor {
    fn clone(&self) -> Self {
        ColumnDescriptor {
            name: self.name.clone(),
            logical_type: self.logical_type,
            precision: self.precision,
            scale: self.scale,
            nullable: self.nullable,
            default: self.default.clone(),
            auto_increment: self.auto_increment,
            temp: self.temp,
            comment: self.comment.clone(),
            collation: self.collation.clone(),
            partitioning_score: AtomicU64::new(self.partitioning_score.load(Ordering::Relaxed)),
            computor: self.computor.clone(),
        }
    }
}

impl ColumnDescriptor {
    /// Construct a plain, nullable, non-computed column.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        ColumnDescriptor {
            name: name.into(),
            logical_type,
            precision: None,
            scale: None,
            nullable: true,
            default: None,
            auto_increment: false,
            temp: false,
            comment: None,
            collation: None,
            partitioning_score: AtomicU64::new(0),
            computor: None,
        }
    }

    /// Record that a scan boundary mentioned this column.
    pub fn bump_partitioning_score(&self) {
        self.partitioning_score.fetch_add(1, Ordering::Relaxed);
    }

    /// Current partitioning score, used by `ProposeRepartition`.
    pub fn partitioning_score(&self) -> u64 {
        self.partitioning_score.load(Ordering::Relaxed)
    }
}

/// A unique-key constraint: an id plus an ordered list of column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueKey {
    /// Stable identifier, independent of column order.
    pub id: u32,
    /// Ordered column list; order matters for composite-key hashing.
    pub columns: Vec<String>,
}

/// A foreign-key constraint. Enforcement is reserved (spec §7
/// `ConstraintViolation`); this core only carries the metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Local columns participating in the key.
    pub columns: Vec<String>,
    /// Referenced table name.
    pub ref_table: String,
    /// Referenced columns, same order as `columns`.
    pub ref_columns: Vec<String>,
}

/// Table-level schema metadata, independent of shard placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Ordered column list.
    pub columns: Vec<ColumnDescriptorSnapshot>,
    /// Unique-key constraints.
    pub unique_keys: Vec<UniqueKey>,
    /// Foreign-key constraints.
    pub foreign_keys: Vec<ForeignKey>,
    /// Durability mode for this table.
    pub persistency: PersistencyMode,
}

/// Serializable snapshot of a `ColumnDescriptor` (the live descriptor
/// holds an `AtomicU64` that does not round-trip through serde).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptorSnapshot {
    pub name: String,
    pub logical_type: LogicalType,
    pub precision: Option<u8>,
    pub scale: Option<u8>,
    pub nullable: bool,
    pub default: Option<Value>,
    pub auto_increment: bool,
    pub temp: bool,
    pub comment: Option<String>,
    pub collation: Option<String>,
    pub computor: Option<String>,
}

impl From<&ColumnDescriptor> for ColumnDescriptorSnapshot {
    fn from(c: &ColumnDescriptor) -> Self {
        ColumnDescriptorSnapshot {
            name: c.name.clone(),
            logical_type: c.logical_type,
            precision: c.precision,
            scale: c.scale,
            nullable: c.nullable,
            default: c.default.clone(),
            auto_increment: c.auto_increment,
            temp: c.temp,
            comment: c.comment.clone(),
            collation: c.collation.clone(),
            computor: c.computor.clone(),
        }
    }
}

impl From<&ColumnDescriptorSnapshot> for ColumnDescriptor {
    fn from(s: &ColumnDescriptorSnapshot) -> Self {
        ColumnDescriptor {
            name: s.name.clone(),
            logical_type: s.logical_type,
            precision: s.precision,
            scale: s.scale,
            nullable: s.nullable,
            default: s.default.clone(),
            auto_increment: s.auto_increment,
            temp: s.temp,
            comment: s.comment.clone(),
            collation: s.collation.clone(),
            partitioning_score: AtomicU64::new(0),
            computor: s.computor.clone(),
        }
    }
}
