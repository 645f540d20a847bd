//! Durability-layer error type.

use thiserror::Error;

/// Errors surfaced by the log, blob store, and persistence backend.
#[derive(Debug, Error)]
pub enum DurabilityError {
    /// Underlying filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A requested artifact (column, schema, blob) does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A log line or schema file could not be parsed.
    #[error("corrupt durable data: {0}")]
    Corrupt(String),
}

impl From<DurabilityError> for columnstore_core::Error {
    fn from(e: DurabilityError) -> Self {
        match e {
            DurabilityError::Io(io) => columnstore_core::Error::Io(io),
            DurabilityError::NotFound(s) => columnstore_core::Error::NotFound(s),
            DurabilityError::Corrupt(s) => columnstore_core::Error::CorruptData(s),
        }
    }
}
