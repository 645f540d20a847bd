//! Column storage codecs (spec §4.B).
//!
//! Every codec goes through the same five-phase lifecycle:
//! `prepare → scan·n → propose_compression → init → build·n → finish`.
//! `finish()` makes a codec immutable; `get()` and `cached_reader()` are
//! the only operations available afterwards.
//!
//! Codecs are modeled as a closed tagged variant (`ColumnStorage`) rather
//! than trait objects, per design note "Polymorphism without runtime
//! reflection": `propose_compression` and the pipeline calls dispatch on
//! the tag, and serialization reads one magic byte to pick the variant.

pub mod blob_overlay;
pub mod decimal;
pub mod r#enum;
pub mod float;
pub mod int;
pub mod pipeline;
pub mod reference;
pub mod seq;
pub mod sparse;
pub mod stats;
pub mod string_dict;
pub mod string_nodict;
pub mod storage;
pub mod traits;

pub use pipeline::build_column;
pub use storage::ColumnStorage;
pub use traits::{CachedReader, CodecError};

/// On-disk magic tags (spec §6). Fixed allocation: a new codec must pick
/// an unused value and old ones are never reused.
pub mod magic {
    /// `StorageSCMER` — the Reference codec (boxed values + statistics).
    pub const REFERENCE: u8 = 10;
    /// `StorageSeq` — arithmetic-run codec.
    pub const SEQ: u8 = 11;
    /// `StorageFloat` — raw float codec.
    pub const FLOAT: u8 = 12;
    /// `StorageString` — explicit values + offsets (no dictionary).
    pub const STRING_NODICT: u8 = 13;
    /// `StorageInt` — bit-packed integer residuals.
    pub const INT: u8 = 14;
    /// `StoragePrefix` — dictionary-encoded strings.
    pub const STRING_DICT: u8 = 15;
    /// `StorageSparse` — null-mask + dense base codec.
    pub const SPARSE: u8 = 16;
    /// `StorageDecimal` — fixed-point `m · 10^s`.
    pub const DECIMAL: u8 = 17;
    /// `OverlayBlob` — content-hash sentinel over a base codec.
    pub const BLOB_OVERLAY: u8 = 31;
    /// `StorageEnum` — rANS entropy-coded byte stream.
    pub const ENUM: u8 = 40;
}
