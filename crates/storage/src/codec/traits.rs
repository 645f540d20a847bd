//! Shared error type and per-thread cursor trait for column codecs.

use columnstore_core::Value;

/// Errors surfaced while decoding a column file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The magic byte did not match any known codec.
    #[error("unknown codec magic: {0}")]
    UnknownMagic(u8),
    /// The payload following a valid magic byte was malformed.
    #[error("malformed codec payload: {0}")]
    Malformed(String),
}

/// A per-thread cursor over a column's decoded values.
///
/// Sequential codecs (Seq, Enum) hold decode state here (last chunk
/// index, last run index) to give O(1) amortized sequential access;
/// random access still goes through `ColumnStorage::get`.
pub trait CachedReader {
    /// Read the value at `i`, using and updating cached cursor state.
    fn read(&mut self, i: usize) -> Value;
}

/// A reader with no cached state, used by codecs whose `get()` is already
/// O(1) or O(log n) without amortization (Int, Float, Decimal, ...).
pub struct DirectReader<'a> {
    storage: &'a super::ColumnStorage,
}

impl<'a> DirectReader<'a> {
    /// Wrap a column for direct (non-cached) sequential reads.
    pub fn new(storage: &'a super::ColumnStorage) -> Self {
        DirectReader { storage }
    }
}

impl<'a> CachedReader for DirectReader<'a> {
    fn read(&mut self, i: usize) -> Value {
        self.storage.get(i)
    }
}
