//! Embeddable façade for the columnar table store.
//!
//! This crate is deliberately thin. It re-exports the engine's
//! `Database`/`Table` surface unchanged and adds exactly two things a
//! direct embedder needs and the lower crates don't provide on their own:
//!
//! - [`query`]: the `Predicate`/`Projection` callable shapes and a `Query`
//!   builder, so a caller driving `Table::scan_with_boundaries` doesn't
//!   have to thread five parameters by hand.
//! - the process-wide [`registry`]/[`settings`] singletons (spec §9
//!   "Process-wide state": `databases` registry, `settings`, `GlobalCache`),
//!   lazily initialized so an embedding process gets exactly one
//!   `DatabaseRegistry` no matter how many call sites open a database.
//!
//! Everything else — SQL parsing, query planning, expression evaluation,
//! network protocols, auth — is out of scope (spec §1) and lives, if it
//! exists at all, in a layer above this crate. A query planner links
//! against `Database`, `Table`, `Predicate`, `Projection`, and `Boundary`
//! and supplies compiled callables; it never needs anything else from here.
//!
//! ## Quick start
//!
//! ```no_run
//! use columnstore_api::{open_database, Settings};
//! use columnstore_core::{ColumnDescriptor, LogicalType, PersistencyMode};
//! use std::path::Path;
//!
//! let settings = Settings::default();
//! let db = open_database(Path::new("/tmp/mydb"), "main", &settings)?;
//! let table = db.create_table(
//!     "events",
//!     vec![ColumnDescriptor::new("id", LogicalType::Int)],
//!     PersistencyMode::Safe,
//! )?;
//! # Ok::<(), columnstore_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod query;

pub use columnstore_core::{
    Boundary, ColumnDescriptor, ColumnDescriptorSnapshot, Error, ForeignKey, LogicalType,
    PersistencyMode, RecId, Result, ShardId, TableSchema, UniqueKey, Value,
};
pub use columnstore_engine::{
    compute_index, BackgroundScheduler, CacheManager, CacheStats, Database, DatabaseRegistry,
    EvictableType, ItemId, OnCollision, Settings, Shard, ShardDimension, Table,
};
pub use query::{Predicate, Projection, Query};

use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;

static REGISTRY: OnceCell<DatabaseRegistry> = OnceCell::new();

/// The process-wide open-database registry (spec §9 "Process-wide state").
///
/// Lazily initialized on first use. Every call after the first shares the
/// same registry, so two call sites opening the same `basepath/name` pair
/// are handed the same in-memory `Database` rather than racing to load its
/// schema twice.
pub fn registry() -> &'static DatabaseRegistry {
    REGISTRY.get_or_init(DatabaseRegistry::new)
}

/// Open (or attach to the already-open handle for) the database rooted at
/// `basepath/name`, via the process-wide registry.
pub fn open_database(basepath: &Path, name: &str, settings: &Settings) -> Result<Arc<Database>> {
    registry().open(basepath, name, settings)
}

/// `UnloadDatabases` (spec §9 "torn down by an `UnloadDatabases` sequence
/// that rebuilds with `all=false` ... and persists `settings.json`"):
/// flush every still-open database's deltas and schema. Call this before
/// process exit.
pub fn unload_all() -> Result<()> {
    registry().unload_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use columnstore_core::{ColumnDescriptor, LogicalType, PersistencyMode, Value};

    #[test]
    fn open_database_shares_one_instance_across_call_sites() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let a = open_database(dir.path(), "db1", &settings).unwrap();
        let b = open_database(dir.path(), "db1", &settings).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn create_table_and_insert_round_trips_through_the_facade() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();
        let db = open_database(dir.path(), "db2", &settings).unwrap();
        let table = db
            .create_table("events", vec![ColumnDescriptor::new("id", LogicalType::Int)], PersistencyMode::Memory)
            .unwrap();
        let recids = table.insert(vec!["id".into()], vec![vec![Value::Int64(1)]], OnCollision::Fail).unwrap();
        assert_eq!(recids, vec![0]);
        assert_eq!(table.row_count(), 1);
    }
}
