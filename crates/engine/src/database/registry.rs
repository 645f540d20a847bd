//! Process-wide open-database registry (spec §9 "Process-wide state:
//! `databases` registry"): a `DashMap<PathBuf, Weak<Database>>` keyed
//! by canonicalized base path, so a database closed everywhere else is
//! dropped rather than kept alive by the registry itself.

use super::Database;
use super::settings::Settings;
use columnstore_core::{Error, Result};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::info;

/// Tracks every currently-open `Database` by its canonicalized base path.
pub struct DatabaseRegistry {
    open: DashMap<PathBuf, Weak<Database>>,
}

impl Default for DatabaseRegistry {
    fn default() -> Self {
        DatabaseRegistry { open: DashMap::new() }
    }
}

impl DatabaseRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or return the already-open handle for) the database rooted
    /// at `basepath/name`.
    pub fn open(&self, basepath: &Path, name: &str, settings: &Settings) -> Result<Arc<Database>> {
        let canonical = Self::canonical_key(basepath, name)?;

        if let Some(existing) = self.open.get(&canonical) {
            if let Some(db) = existing.upgrade() {
                return Ok(db);
            }
        }

        let db = Database::open(basepath, name, settings)?;
        self.open.insert(canonical, Arc::downgrade(&db));
        info!(database = %name, "database opened");
        Ok(db)
    }

    fn canonical_key(basepath: &Path, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(basepath).map_err(Error::Io)?;
        let canonical_base = basepath.canonicalize().map_err(Error::Io)?;
        Ok(canonical_base.join(name))
    }

    /// `UnloadDatabases` (spec §9): rebuild every still-open database with
    /// `all=false` (flush deltas, not a forced full rebuild), then persist
    /// its schema. Databases already dropped by every other owner are
    /// skipped and pruned from the registry.
    pub fn unload_all(&self) -> Result<()> {
        let mut stale = Vec::new();
        for entry in self.open.iter() {
            match entry.value().upgrade() {
                Some(db) => db.shutdown()?,
                None => stale.push(entry.key().clone()),
            }
        }
        for key in stale {
            self.open.remove(&key);
        }
        Ok(())
    }

    /// Count of databases with at least one live reference.
    pub fn live_count(&self) -> usize {
        self.open.iter().filter(|e| e.value().strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_twice_returns_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DatabaseRegistry::new();
        let settings = Settings::default();
        let a = registry.open(dir.path(), "db1", &settings).unwrap();
        let b = registry.open(dir.path(), "db1", &settings).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn reopening_after_drop_creates_a_fresh_instance() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DatabaseRegistry::new();
        let settings = Settings::default();
        {
            let a = registry.open(dir.path(), "db1", &settings).unwrap();
            drop(a);
        }
        assert_eq!(registry.live_count(), 0);
        let b = registry.open(dir.path(), "db1", &settings).unwrap();
        assert_eq!(registry.live_count(), 1);
        drop(b);
    }
}
