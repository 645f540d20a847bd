//! Unified error type for the storage engine.
//!
//! Mirrors spec §7's error-kind list. Every public operation returns
//! `Result<T, Error>`; there is no panic=success path outside of invariant
//! violations, which surface as `Error::Internal`.

use crate::value::Value;
use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds, named after spec §7 "Error kinds".
#[derive(Debug, Error)]
pub enum Error {
    /// Database/table/column/shard missing.
    #[error("not found: {0}")]
    NotFound(String),

    /// DDL conflict; suppressible by callers via `if_not_exists`.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Unique constraint violated. Carries the offending key and value so
    /// the caller's `on_collision` handler (or the caller itself) can act.
    #[error("unique violation on key {key:?}: value {value:?} already present")]
    UniqueViolation {
        /// Column names making up the violated key.
        key: Vec<String>,
        /// The value tuple that collided.
        value: Vec<Value>,
    },

    /// Foreign key, nullability, or type constraint violated.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Backend read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Codec header/payload inconsistent.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// ACID-mode commit validation failed (optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invariant broken; always a bug, never a user-input condition.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors a caller may reasonably retry (spec §7 "Conflict").
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }

    /// True for the unique-violation case, used to route to `on_collision`.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::UniqueViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_retryable_is_false() {
        let e = Error::UniqueViolation {
            key: vec!["id".into()],
            value: vec![Value::Int64(1)],
        };
        assert!(!e.is_retryable());
        assert!(e.is_unique_violation());
    }

    #[test]
    fn conflict_is_retryable() {
        let e = Error::Conflict("stale snapshot".into());
        assert!(e.is_retryable());
    }

    #[test]
    fn display_messages_are_human_readable() {
        assert!(Error::NotFound("table x".into()).to_string().contains("not found"));
        assert!(Error::Internal("oops".into()).to_string().contains("oops"));
    }
}
