//! The tagged value type shared by every column codec, index, and scan.
//!
//! `Value` is intentionally small: columns store their own specialized
//! representations (packed ints, rANS streams, ...) and only materialize a
//! `Value` at `get()` / scan-projection boundaries.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// A stable reference to row content that lives in the blob store rather
/// than inline in a column, addressed by its SHA-256 content hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LazyString {
    /// SHA-256 of the referenced content.
    pub sha256: [u8; 32],
    /// Length of the referenced content in bytes (not the hash length).
    pub len: u64,
}

impl LazyString {
    /// Build a reference from raw content.
    pub fn from_content(content: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(content);
        let digest = hasher.finalize();
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&digest);
        LazyString {
            sha256,
            len: content.len() as u64,
        }
    }

    /// Lowercase hex encoding of the content hash, used for blob filenames.
    pub fn hex(&self) -> String {
        self.sha256.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl PartialEq for LazyString {
    fn eq(&self, other: &Self) -> bool {
        self.sha256 == other.sha256 && self.len == other.len
    }
}
impl Eq for LazyString {}

impl PartialOrd for LazyString {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for LazyString {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sha256.cmp(&other.sha256).then(self.len.cmp(&other.len))
    }
}

/// A row reference into another table, used by foreign-key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef(pub u64);

/// The tagged value type. See spec §3 "Value" for the total order and
/// equality contract implemented below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value. Sorts before every other kind.
    Null,
    /// Boolean, sorts between Null and the numeric kinds.
    Bool(bool),
    /// 64-bit signed integer, a member of the "Numeric" order group.
    Int64(i64),
    /// 64-bit float, a member of the "Numeric" order group.
    Float64(f64),
    /// UTF-8 string, compared by byte sequence.
    String(String),
    /// Content-addressed string stored out of line.
    LazyString(LazyString),
    /// Reference to a row in another table.
    TableRef(TableRef),
}

/// Rank of a value's kind in the total order Null < Bool < Numeric < String.
///
/// `LazyString` and `TableRef` are not named in spec §3's order sentence;
/// we place them after `String`, each ordered by its own content, so that
/// every `Value` pair remains totally ordered for index keys (see
/// DESIGN.md "Open question: ordering of LazyString/TableRef").
fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int64(_) | Value::Float64(_) => 2,
        Value::String(_) => 3,
        Value::LazyString(_) => 4,
        Value::TableRef(_) => 5,
    }
}

impl Value {
    /// Promote numeric kinds to `f64` for cross-type comparison.
    fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// True if this value is the numeric NaN sentinel, which numeric codecs
    /// read back as `Null` (spec §4.A).
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Float64(f) if f.is_nan())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Float64(a), Value::Float64(b)) => a.to_bits() == b.to_bits(),
            (Value::Int64(a), Value::Float64(b)) | (Value::Float64(b), Value::Int64(a)) => {
                (*a as f64).to_bits() == b.to_bits()
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::LazyString(a), Value::LazyString(b)) => a == b,
            (Value::TableRef(a), Value::TableRef(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        kind_rank(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int64(i) => (*i as f64).to_bits().hash(state),
            Value::Float64(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::LazyString(l) => l.sha256.hash(state),
            Value::TableRef(t) => t.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    /// Total order per spec §3/§4.A: `Null < Bool < Numeric < String`;
    /// numerics compare cross-type via float promotion; strings compare by
    /// byte sequence.
    fn cmp(&self, other: &Self) -> Ordering {
        let (ra, rb) = (kind_rank(self), kind_rank(other));
        if ra != rb {
            return ra.cmp(&rb);
        }
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Value::LazyString(a), Value::LazyString(b)) => a.cmp(b),
            (Value::TableRef(a), Value::TableRef(b)) => a.cmp(b),
            _ => {
                let (a, b) = (self.as_numeric().unwrap(), other.as_numeric().unwrap());
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
        }
    }
}
