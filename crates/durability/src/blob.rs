//! Content-addressed blob storage (spec §4.G, §6): gzip-compressed,
//! partitioned into a two-level directory tree by the first two hex
//! bytes of the SHA-256 hash (`blob/<aa>/<bb>/<hash>`).

use crate::DurabilityError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Path on disk for the blob identified by `hash_hex` (lowercase hex
/// SHA-256), under `blob_root`.
pub fn blob_path(blob_root: &Path, hash_hex: &str) -> PathBuf {
    let aa = &hash_hex[0..2];
    let bb = &hash_hex[2..4];
    blob_root.join(aa).join(bb).join(hash_hex)
}

/// Write `content`, gzip-compressed, at its content-addressed path.
/// Idempotent: writing the same hash twice is a no-op after the first.
pub fn write_blob(blob_root: &Path, hash_hex: &str, content: &[u8]) -> Result<(), DurabilityError> {
    let path = blob_path(blob_root, hash_hex);
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(content)?;
    let compressed = encoder.finish()?;
    fs::write(path, compressed)?;
    Ok(())
}

/// Read and decompress a blob previously written by [`write_blob`].
pub fn read_blob(blob_root: &Path, hash_hex: &str) -> Result<Vec<u8>, DurabilityError> {
    let path = blob_path(blob_root, hash_hex);
    let compressed = fs::read(&path)
        .map_err(|e| DurabilityError::NotFound(format!("blob {hash_hex}: {e}")))?;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Remove a blob. Not an error if it is already absent.
pub fn delete_blob(blob_root: &Path, hash_hex: &str) -> Result<(), DurabilityError> {
    let path = blob_path(blob_root, hash_hex);
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_compressed_content() {
        let dir = tempfile::tempdir().unwrap();
        let hash = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd";
        write_blob(dir.path(), hash, b"hello world").unwrap();
        let back = read_blob(dir.path(), hash).unwrap();
        assert_eq!(back, b"hello world");
    }

    #[test]
    fn partitions_by_hash_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let hash = "aabbccdd00112233445566778899aabbccddeeff00112233445566778899aa";
        write_blob(dir.path(), hash, b"x").unwrap();
        assert!(dir.path().join("aa").join("bb").join(hash).exists());
    }

    #[test]
    fn delete_of_missing_blob_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        assert!(delete_blob(dir.path(), "ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00ff00").is_ok());
    }
}
