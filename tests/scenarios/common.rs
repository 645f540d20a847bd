use columnstore_durability::{Backend, FilesystemBackend};
use tempfile::TempDir;

/// A throwaway filesystem backend rooted in a fresh temp directory, for
/// tests that exercise `Shard::rebuild` (which always writes column files
/// and opens a log, regardless of the table's persistency mode).
pub fn temp_backend() -> (TempDir, Box<dyn Backend>) {
    let dir = tempfile::tempdir().unwrap();
    let backend = FilesystemBackend::open(dir.path(), "scenarios").unwrap();
    (dir, Box::new(backend))
}
