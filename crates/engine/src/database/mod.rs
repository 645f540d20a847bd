//! Database: a named collection of tables with a schema file, a shared
//! persistence backend, and its own cache manager (spec §3 "Lifecycles",
//! §6 on-disk layout, §9 process-wide state).

mod registry;
mod settings;

pub use registry::DatabaseRegistry;
pub use settings::Settings;

use crate::background::{BackgroundScheduler, TaskPriority};
use crate::cache::CacheManager;
use crate::table::Table;
use columnstore_core::schema::{ColumnDescriptor, ColumnDescriptorSnapshot, TableSchema};
use columnstore_core::{Error, PersistencyMode, Result, ShardId};
use columnstore_durability::{Backend, FilesystemBackend};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// A single database: its tables, schema lock, persistence backend, and
/// cache manager.
pub struct Database {
    name: String,
    tables: DashMap<String, Arc<Table>>,
    schema_lock: Mutex<()>,
    backend: Arc<dyn Backend>,
    cache: Arc<CacheManager>,
    /// Drives asynchronous disk cleanup of shards retired by a rebuild or
    /// repartition (spec §3 "old one finalized asynchronously").
    background: BackgroundScheduler,
}

impl Database {
    /// Open (creating if absent) the database at `basepath/name`, loading
    /// its schema and reconstructing every table's column/key metadata.
    /// Shards themselves are loaded lazily on first access (spec §5
    /// "Cold → Shared/Write on first access").
    pub fn open(basepath: &Path, name: &str, settings: &Settings) -> Result<Arc<Self>> {
        let backend: Arc<dyn Backend> = Arc::new(
            FilesystemBackend::open(basepath, name).map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?,
        );

        // A conservative, host-independent fallback; the actual resolved
        // byte budgets are a thin layer above `Settings` that a process
        // entry point supplies with the real RAM total (spec §6 "Settings
        // (JSON)" leaves RAM detection to the embedding process).
        const ASSUMED_RAM_BYTES: u64 = 8 * 1024 * 1024 * 1024;
        let cache = Arc::new(CacheManager::new(
            settings.memory_budget_bytes(ASSUMED_RAM_BYTES),
            settings.persisted_budget_bytes(ASSUMED_RAM_BYTES),
        ));

        let db = Arc::new(Database {
            name: name.to_string(),
            tables: DashMap::new(),
            schema_lock: Mutex::new(()),
            backend,
            cache,
            background: BackgroundScheduler::new(1, 4096),
        });
        db.load_schema()?;
        Ok(db)
    }

    /// Schedule a retired shard's column files for asynchronous removal
    /// (spec §3 "old one finalized asynchronously"). Its log has already
    /// been closed and removed synchronously by `Shard::rebuild`.
    fn finalize_shard_columns(&self, old_id: ShardId, old_columns: Vec<String>) {
        let backend = Arc::clone(&self.backend);
        let name = self.name.clone();
        let submitted = self.background.submit(TaskPriority::Low, move || {
            for col in &old_columns {
                if let Err(e) = backend.remove_column(old_id, col) {
                    warn!(database = %name, shard = %old_id, column = %col, error = %e, "failed to finalize retired shard column");
                }
            }
        });
        if submitted.is_err() {
            warn!(database = %self.name, shard = %old_id, "background finalization queue full, retired shard columns left on disk");
        }
    }

    fn load_schema(&self) -> Result<()> {
        let bytes = match self.backend.read_schema() {
            Ok(bytes) => bytes,
            Err(_) => return Ok(()), // fresh database, nothing to load
        };
        let schemas: Vec<TableSchema> =
            serde_json::from_slice(&bytes).map_err(|e| Error::CorruptData(e.to_string()))?;
        for schema in schemas {
            let columns: Vec<ColumnDescriptor> = schema.columns.iter().map(ColumnDescriptor::from).collect();
            let table = Table::new(schema.name.clone(), columns, schema.persistency);
            for uk in schema.unique_keys {
                table.add_unique_key(uk);
            }
            for fk in schema.foreign_keys {
                table.add_foreign_key(fk);
            }
            self.tables.insert(schema.name.clone(), Arc::new(table));
        }
        Ok(())
    }

    fn save_schema(&self) -> Result<()> {
        let schemas: Vec<TableSchema> = self
            .tables
            .iter()
            .map(|entry| {
                let table = entry.value();
                TableSchema {
                    name: table.name().to_string(),
                    columns: table.columns().iter().map(ColumnDescriptorSnapshot::from).collect(),
                    unique_keys: table.unique_keys(),
                    foreign_keys: table.foreign_keys(),
                    persistency: table.persistency(),
                }
            })
            .collect();
        let bytes = serde_json::to_vec_pretty(&schemas).map_err(|e| Error::Internal(e.to_string()))?;
        self.backend.write_schema(&bytes).map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))
    }

    /// This database's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `CreateColumn`/DDL guard: schema-lock-protected table creation
    /// (spec §5 lock order, level 4 "Database schema-lock").
    pub fn create_table(&self, name: &str, columns: Vec<ColumnDescriptor>, persistency: PersistencyMode) -> Result<Arc<Table>> {
        let _guard = self.schema_lock.lock();
        if self.tables.contains_key(name) {
            return Err(Error::AlreadyExists(format!("table {name}")));
        }
        let table = Arc::new(Table::new(name, columns, persistency));
        self.tables.insert(name.to_string(), Arc::clone(&table));
        self.save_schema()?;
        Ok(table)
    }

    /// Look up an already-created table.
    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Drop a table and its schema entry. Callers are responsible for
    /// removing the table's on-disk shard/column files via the backend;
    /// that cleanup mirrors `DropColumn`'s file removal but at table
    /// granularity (spec §4.F "Temp-keytable cleanup" describes the same
    /// pattern for `.`-prefixed tables).
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let _guard = self.schema_lock.lock();
        self.tables
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("table {name}")))?;
        self.save_schema()
    }

    /// Every table name currently registered.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|e| e.key().clone()).collect()
    }

    /// The shared cache manager for this database's shards and indexes.
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// The persistence backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// `UnloadDatabases`'s per-database half (spec §9): `rebuild(all=false)`
    /// across every table, then persist the schema.
    pub fn shutdown(&self) -> Result<()> {
        for entry in self.tables.iter() {
            entry.value().rebuild_all(self.backend.as_ref(), false, |old_id, old_columns| {
                self.finalize_shard_columns(old_id, old_columns);
            })?;
        }
        self.save_schema()?;
        self.background.drain();
        self.background.shutdown();
        self.cache.shutdown();
        info!(database = %self.name, "database shut down");
        Ok(())
    }

    /// `ProposeRepartition` + `Repartition` (spec §4.E) for one table,
    /// finalizing any retired shards asynchronously.
    pub fn repartition_table(&self, name: &str, max_dimensions: usize) -> Result<bool> {
        let table = self.table(name).ok_or_else(|| Error::NotFound(format!("table {name}")))?;
        table.propose_and_repartition(self.backend.as_ref(), max_dimensions, |old_id, old_columns| {
            self.finalize_shard_columns(old_id, old_columns);
        })
    }
}
