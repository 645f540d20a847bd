//! Persistence for a single database: per-shard logs, a content-addressed
//! blob store, and a pluggable filesystem backend (spec §4.G, §6).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod blob;
pub mod error;
pub mod format;
pub mod log;

pub use backend::{column_file_stem, Backend, FilesystemBackend};
pub use blob::{blob_path, delete_blob, read_blob, write_blob};
pub use error::DurabilityError;
pub use format::LogEntry;
pub use log::{replay, Logfile};
