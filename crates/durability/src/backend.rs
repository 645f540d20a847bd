//! The persistence backend contract (spec §4.G): one implementation per
//! storage substrate. A local filesystem implementation is mandatory;
//! object-store/RADOS backends are out of scope here but would implement
//! the same trait (spec §1 "alternative persistence backends ... only
//! the backend interface contract is given").

use crate::format::LogEntry;
use crate::log::{replay, Logfile};
use crate::DurabilityError;
use columnstore_core::{PersistencyMode, ShardId};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Column names at or above this length are hashed into the filename
/// (spec §6: "Column-name longer than 63 bytes").
const MAX_INLINE_COLUMN_NAME: usize = 63;

/// Stable on-disk/on-wire name for a column within a shard: the column
/// name itself, or the first 8 bytes of its SHA-256 (hex) if the name is
/// too long for a filesystem component.
pub fn column_file_stem(col: &str) -> String {
    if col.len() <= MAX_INLINE_COLUMN_NAME {
        return col.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(col.as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// The storage contract every backend implements (spec §4.G).
pub trait Backend: Send + Sync {
    /// Read the database's schema file, falling back to the previous
    /// revision if the primary is empty or missing (spec §6
    /// `schema.json.old`).
    fn read_schema(&self) -> Result<Vec<u8>, DurabilityError>;
    /// Atomically replace the schema file, keeping one backup revision.
    fn write_schema(&self, bytes: &[u8]) -> Result<(), DurabilityError>;

    /// Read a column file's raw bytes (magic byte + codec payload).
    fn read_column(&self, shard: ShardId, col: &str) -> Result<Vec<u8>, DurabilityError>;
    /// Write a column file, replacing any existing content.
    fn write_column(&self, shard: ShardId, col: &str, bytes: &[u8]) -> Result<(), DurabilityError>;
    /// Remove a column file (spec §4.D `DropColumn`).
    fn remove_column(&self, shard: ShardId, col: &str) -> Result<(), DurabilityError>;

    /// Read and decompress a blob by its hex content hash.
    fn read_blob(&self, hash_hex: &str) -> Result<Vec<u8>, DurabilityError>;
    /// Compress and write a blob; idempotent for an already-present hash.
    fn write_blob(&self, hash_hex: &str, content: &[u8]) -> Result<(), DurabilityError>;
    /// Remove a blob.
    fn delete_blob(&self, hash_hex: &str) -> Result<(), DurabilityError>;

    /// Open (creating if necessary) a shard's append-only log for
    /// writing.
    fn open_log(&self, shard: ShardId, mode: PersistencyMode) -> Result<Logfile, DurabilityError>;
    /// Replay a shard's log in write order.
    fn replay_log(&self, shard: ShardId) -> Result<Vec<LogEntry>, DurabilityError>;
    /// Delete a shard's log file (spec §4.C rebuild step 5: "close and
    /// remove the old log").
    fn remove_log(&self, shard: ShardId) -> Result<(), DurabilityError>;

    /// Delete every on-disk artifact for this database.
    fn remove(&self) -> Result<(), DurabilityError>;
}

/// The mandatory local-filesystem backend (spec §6 on-disk layout).
pub struct FilesystemBackend {
    db_root: PathBuf,
}

impl FilesystemBackend {
    /// Open (creating directories as needed) the backend rooted at
    /// `<basepath>/<db>`.
    pub fn open(basepath: &Path, db_name: &str) -> Result<Self, DurabilityError> {
        let db_root = basepath.join(db_name);
        fs::create_dir_all(&db_root)?;
        fs::create_dir_all(db_root.join("blob"))?;
        Ok(FilesystemBackend { db_root })
    }

    fn schema_path(&self) -> PathBuf {
        self.db_root.join("schema.json")
    }

    fn schema_backup_path(&self) -> PathBuf {
        self.db_root.join("schema.json.old")
    }

    fn column_path(&self, shard: ShardId, col: &str) -> PathBuf {
        self.db_root.join(format!("{}-{}", shard.0, column_file_stem(col)))
    }

    fn log_path(&self, shard: ShardId) -> PathBuf {
        self.db_root.join(format!("{}.log", shard.0))
    }

    fn blob_root(&self) -> PathBuf {
        self.db_root.join("blob")
    }
}

impl Backend for FilesystemBackend {
    fn read_schema(&self) -> Result<Vec<u8>, DurabilityError> {
        let primary = fs::read(self.schema_path());
        match primary {
            Ok(bytes) if !bytes.is_empty() => Ok(bytes),
            _ => fs::read(self.schema_backup_path())
                .map_err(|_| DurabilityError::NotFound("schema.json".into())),
        }
    }

    fn write_schema(&self, bytes: &[u8]) -> Result<(), DurabilityError> {
        let tmp = self.db_root.join("schema.json.tmp");
        fs::write(&tmp, bytes)?;
        if self.schema_path().exists() {
            fs::rename(self.schema_path(), self.schema_backup_path())?;
        }
        fs::rename(&tmp, self.schema_path())?;
        Ok(())
    }

    fn read_column(&self, shard: ShardId, col: &str) -> Result<Vec<u8>, DurabilityError> {
        fs::read(self.column_path(shard, col))
            .map_err(|_| DurabilityError::NotFound(format!("column {col} of shard {}", shard.0)))
    }

    fn write_column(&self, shard: ShardId, col: &str, bytes: &[u8]) -> Result<(), DurabilityError> {
        fs::write(self.column_path(shard, col), bytes)?;
        Ok(())
    }

    fn remove_column(&self, shard: ShardId, col: &str) -> Result<(), DurabilityError> {
        match fs::remove_file(self.column_path(shard, col)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_blob(&self, hash_hex: &str) -> Result<Vec<u8>, DurabilityError> {
        crate::blob::read_blob(&self.blob_root(), hash_hex)
    }

    fn write_blob(&self, hash_hex: &str, content: &[u8]) -> Result<(), DurabilityError> {
        crate::blob::write_blob(&self.blob_root(), hash_hex, content)
    }

    fn delete_blob(&self, hash_hex: &str) -> Result<(), DurabilityError> {
        crate::blob::delete_blob(&self.blob_root(), hash_hex)
    }

    fn open_log(&self, shard: ShardId, mode: PersistencyMode) -> Result<Logfile, DurabilityError> {
        Logfile::open(&self.log_path(shard), mode)
    }

    fn replay_log(&self, shard: ShardId) -> Result<Vec<LogEntry>, DurabilityError> {
        replay(&self.log_path(shard))
    }

    fn remove_log(&self, shard: ShardId) -> Result<(), DurabilityError> {
        match fs::remove_file(self.log_path(shard)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self) -> Result<(), DurabilityError> {
        match fs::remove_dir_all(&self.db_root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use columnstore_core::Value;

    #[test]
    fn long_column_names_are_hashed() {
        let long = "c".repeat(100);
        let stem = column_file_stem(&long);
        assert_eq!(stem.len(), 16);
        assert_ne!(stem, long);
    }

    #[test]
    fn short_column_names_pass_through() {
        assert_eq!(column_file_stem("age"), "age");
    }

    #[test]
    fn schema_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path(), "db1").unwrap();
        backend.write_schema(b"{\"name\":\"db1\"}").unwrap();
        assert_eq!(backend.read_schema().unwrap(), b"{\"name\":\"db1\"}");
    }

    #[test]
    fn schema_falls_back_to_backup_when_primary_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path(), "db1").unwrap();
        backend.write_schema(b"{\"v\":1}").unwrap();
        backend.write_schema(b"").unwrap();
        assert_eq!(backend.read_schema().unwrap(), b"{\"v\":1}");
    }

    #[test]
    fn column_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path(), "db1").unwrap();
        let shard = ShardId::new();
        backend.write_column(shard, "age", b"\x0ehello").unwrap();
        assert_eq!(backend.read_column(shard, "age").unwrap(), b"\x0ehello");
        backend.remove_column(shard, "age").unwrap();
        assert!(backend.read_column(shard, "age").is_err());
    }

    #[test]
    fn log_open_write_replay_remove() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::open(dir.path(), "db1").unwrap();
        let shard = ShardId::new();
        {
            let mut log = backend.open_log(shard, PersistencyMode::Logged).unwrap();
            log.write(&LogEntry::Insert {
                cols: vec!["a".into()],
                rows: vec![vec![Value::Int64(1)]],
            })
            .unwrap();
        }
        let entries = backend.replay_log(shard).unwrap();
        assert_eq!(entries.len(), 1);
        backend.remove_log(shard).unwrap();
        assert!(backend.replay_log(shard).unwrap().is_empty());
    }
}
