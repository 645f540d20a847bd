//! The closed tagged-variant column codec (spec §4.B, design note
//! "Polymorphism without runtime reflection"). Every concrete codec lives
//! behind this one enum instead of a trait object; dispatch is a single
//! `match` per operation and the magic byte on disk maps 1:1 to a variant.

use super::blob_overlay::BlobOverlayColumn;
use super::decimal::DecimalColumn;
use super::float::FloatColumn;
use super::int::IntColumn;
use super::r#enum::EnumColumn;
use super::reference::ReferenceColumn;
use super::seq::SeqColumn;
use super::sparse::SparseColumn;
use super::string_dict::StringDictColumn;
use super::string_nodict::StringNoDictColumn;
use super::magic;
use super::traits::{CachedReader, CodecError, DirectReader};
use columnstore_core::Value;

/// A column's storage, one variant per codec named in spec §4.B.
#[derive(Debug)]
pub enum ColumnStorage {
    Reference(ReferenceColumn),
    Int(IntColumn),
    Float(FloatColumn),
    Decimal(DecimalColumn),
    StringDict(StringDictColumn),
    StringNoDict(StringNoDictColumn),
    Seq(SeqColumn),
    Sparse(SparseColumn),
    Enum(EnumColumn),
    BlobOverlay(Box<BlobOverlayColumn>),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            ColumnStorage::Reference($c) => $body,
            ColumnStorage::Int($c) => $body,
            ColumnStorage::Float($c) => $body,
            ColumnStorage::Decimal($c) => $body,
            ColumnStorage::StringDict($c) => $body,
            ColumnStorage::StringNoDict($c) => $body,
            ColumnStorage::Seq($c) => $body,
            ColumnStorage::Sparse($c) => $body,
            ColumnStorage::Enum($c) => $body,
            ColumnStorage::BlobOverlay($c) => $body,
        }
    };
}

impl ColumnStorage {
    /// A fresh Reference column: the pipeline's universal starting point.
    pub fn new_reference() -> Self {
        ColumnStorage::Reference(ReferenceColumn::new())
    }
    pub fn new_int() -> Self {
        ColumnStorage::Int(IntColumn::new())
    }
    pub fn new_float() -> Self {
        ColumnStorage::Float(FloatColumn::new())
    }
    pub fn new_decimal() -> Self {
        ColumnStorage::Decimal(DecimalColumn::new())
    }
    pub fn new_string_dict() -> Self {
        ColumnStorage::StringDict(StringDictColumn::new())
    }
    pub fn new_string_nodict() -> Self {
        ColumnStorage::StringNoDict(StringNoDictColumn::new())
    }
    pub fn new_seq() -> Self {
        ColumnStorage::Seq(SeqColumn::new())
    }
    pub fn new_sparse() -> Self {
        ColumnStorage::Sparse(SparseColumn::new())
    }
    pub fn new_enum() -> Self {
        ColumnStorage::Enum(EnumColumn::new())
    }
    pub fn new_blob_overlay(base: ColumnStorage) -> Self {
        ColumnStorage::BlobOverlay(Box::new(BlobOverlayColumn::new(base)))
    }

    pub fn prepare(&mut self) {
        dispatch!(self, c => c.prepare())
    }

    pub fn scan(&mut self, i: usize, v: &Value) {
        dispatch!(self, c => c.scan(i, v))
    }

    /// Ask this codec what it would specialize into next, or `None` if it
    /// is already terminal. Only `Reference` ever returns `Some`; every
    /// other codec is the end of its own chain (spec §4.B: chains are
    /// bounded to at most 3 hops, and no codec proposes itself).
    pub fn propose_compression(&self, n: usize) -> Option<ColumnStorage> {
        dispatch!(self, c => c.propose_compression(n))
    }

    pub fn init(&mut self, n: usize) {
        dispatch!(self, c => c.init(n))
    }

    pub fn build(&mut self, i: usize, v: &Value) {
        dispatch!(self, c => c.build(i, v))
    }

    pub fn finish(&mut self) {
        dispatch!(self, c => c.finish())
    }

    pub fn get(&self, i: usize) -> Value {
        dispatch!(self, c => c.get(i))
    }

    pub fn len(&self) -> usize {
        dispatch!(self, c => c.len())
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, c => c.is_empty())
    }

    pub fn compute_size(&self) -> usize {
        dispatch!(self, c => c.compute_size())
    }

    /// The on-disk magic byte identifying this variant (spec §6).
    pub fn magic(&self) -> u8 {
        match self {
            ColumnStorage::Reference(_) => magic::REFERENCE,
            ColumnStorage::Seq(_) => magic::SEQ,
            ColumnStorage::Float(_) => magic::FLOAT,
            ColumnStorage::StringNoDict(_) => magic::STRING_NODICT,
            ColumnStorage::Int(_) => magic::INT,
            ColumnStorage::StringDict(_) => magic::STRING_DICT,
            ColumnStorage::Sparse(_) => magic::SPARSE,
            ColumnStorage::Decimal(_) => magic::DECIMAL,
            ColumnStorage::BlobOverlay(_) => magic::BLOB_OVERLAY,
            ColumnStorage::Enum(_) => magic::ENUM,
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        dispatch!(self, c => c.serialize())
    }

    /// Rebuild a codec from its magic byte and serialized payload.
    pub fn deserialize(magic: u8, bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(match magic {
            m if m == magic::REFERENCE => ColumnStorage::Reference(ReferenceColumn::deserialize(bytes)?),
            m if m == magic::SEQ => ColumnStorage::Seq(SeqColumn::deserialize(bytes)?),
            m if m == magic::FLOAT => ColumnStorage::Float(FloatColumn::deserialize(bytes)?),
            m if m == magic::STRING_NODICT => {
                ColumnStorage::StringNoDict(StringNoDictColumn::deserialize(bytes)?)
            }
            m if m == magic::INT => ColumnStorage::Int(IntColumn::deserialize(bytes)?),
            m if m == magic::STRING_DICT => {
                ColumnStorage::StringDict(StringDictColumn::deserialize(bytes)?)
            }
            m if m == magic::SPARSE => ColumnStorage::Sparse(SparseColumn::deserialize(bytes)?),
            m if m == magic::DECIMAL => ColumnStorage::Decimal(DecimalColumn::deserialize(bytes)?),
            m if m == magic::BLOB_OVERLAY => {
                ColumnStorage::BlobOverlay(Box::new(BlobOverlayColumn::deserialize(bytes)?))
            }
            m if m == magic::ENUM => ColumnStorage::Enum(EnumColumn::deserialize(bytes)?),
            other => return Err(CodecError::UnknownMagic(other)),
        })
    }

    /// A cursor giving amortized O(1) sequential access. `Seq` and `Enum`
    /// cache run/chunk state; everything else reads straight through
    /// `get()`.
    pub fn cached_reader(&self) -> Box<dyn CachedReader + '_> {
        match self {
            ColumnStorage::Enum(c) => Box::new(c.cached_reader()),
            ColumnStorage::Seq(c) => Box::new(c.cached_reader()),
            _ => Box::new(DirectReader::new(self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_round_trips_through_deserialize() {
        let mut c = ColumnStorage::new_int();
        c.prepare();
        let values = vec![Value::Int64(1), Value::Int64(2), Value::Null];
        for (i, v) in values.iter().enumerate() {
            c.scan(i, v);
        }
        c.init(values.len());
        for (i, v) in values.iter().enumerate() {
            c.build(i, v);
        }
        c.finish();
        let bytes = c.serialize();
        let c2 = ColumnStorage::deserialize(c.magic(), &bytes).unwrap();
        for i in 0..values.len() {
            assert_eq!(c.get(i), c2.get(i));
        }
    }

    #[test]
    fn unknown_magic_is_an_error() {
        assert!(matches!(
            ColumnStorage::deserialize(200, &[]),
            Err(CodecError::UnknownMagic(200))
        ));
    }
}
