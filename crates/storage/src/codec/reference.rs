//! The Reference codec: boxed values plus the statistics oracle that
//! drives every other codec's selection (spec §4.B "run Reference codec
//! first").

use super::stats::{
    ColumnStats, ENUM_DISTINCT_LIMIT, DICT_DISTINCT_LIMIT, BLOB_OVERLAY_THRESHOLD,
    SPARSE_NULL_RATIO,
};
use super::storage::ColumnStorage;
use columnstore_core::Value;

/// Stores every value boxed, no compression. Doubles as the statistics
/// pass for every specialization.
#[derive(Debug, Default)]
pub struct ReferenceColumn {
    pub(crate) stats: ColumnStats,
    pub(crate) values: Vec<Value>,
}

impl ReferenceColumn {
    /// A fresh, empty Reference column.
    pub fn new() -> Self {
        ReferenceColumn {
            stats: ColumnStats::new(),
            values: Vec::new(),
        }
    }

    pub fn prepare(&mut self) {
        self.stats = ColumnStats::new();
    }

    pub fn scan(&mut self, _i: usize, v: &Value) {
        self.stats.observe(v);
    }

    /// Decide the next codec in the pipeline, if any. Returns `None` only
    /// when called on anything other than the Reference codec itself
    /// (concrete specializations are always terminal).
    pub fn propose_compression(&self, _n: usize) -> Option<ColumnStorage> {
        let s = &self.stats;
        let has_null = s.null_count > 0;
        let enum_symbols = s.distinct_count() + if has_null { 1 } else { 0 };

        if s.count > 0 && enum_symbols <= ENUM_DISTINCT_LIMIT {
            return Some(ColumnStorage::new_enum());
        }

        if s.null_ratio() >= SPARSE_NULL_RATIO {
            return Some(ColumnStorage::new_sparse());
        }

        if s.all_string {
            let base = if s.distinct_count() <= DICT_DISTINCT_LIMIT {
                ColumnStorage::new_string_dict()
            } else {
                ColumnStorage::new_string_nodict()
            };
            if s.max_string_len >= BLOB_OVERLAY_THRESHOLD {
                return Some(ColumnStorage::new_blob_overlay(base));
            }
            return Some(base);
        }

        if s.all_int {
            if super::seq::worth_seq_encoding(&s.int_values) {
                return Some(ColumnStorage::new_seq());
            }
            return Some(ColumnStorage::new_int());
        }

        if s.all_numeric {
            if s.decimal_eligible() {
                return Some(ColumnStorage::new_decimal());
            }
            return Some(ColumnStorage::new_float());
        }

        // Mixed, non-uniform kinds: fall back to a no-dictionary string
        // encoding of each value's debug form. Not reached by any codec
        // selection table row; kept so the pipeline always terminates.
        Some(ColumnStorage::new_string_nodict())
    }

    pub fn init(&mut self, n: usize) {
        self.values = Vec::with_capacity(n);
    }

    pub fn build(&mut self, i: usize, v: &Value) {
        if self.values.len() <= i {
            self.values.resize(i + 1, Value::Null);
        }
        self.values[i] = v.clone();
    }

    pub fn finish(&mut self) {}

    pub fn get(&self, i: usize) -> Value {
        self.values.get(i).cloned().unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn compute_size(&self) -> usize {
        self.values.iter().map(value_heap_size).sum::<usize>() + self.values.len() * 16
    }

    pub fn serialize(&self) -> Vec<u8> {
        serde_json::to_vec(&self.values).expect("Value is always JSON-serializable")
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        let values: Vec<Value> = serde_json::from_slice(bytes)
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        Ok(ReferenceColumn {
            stats: ColumnStats::new(),
            values,
        })
    }
}

fn value_heap_size(v: &Value) -> usize {
    match v {
        Value::String(s) => s.len(),
        Value::LazyString(_) => 40,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposes_enum_for_low_cardinality_bools() {
        let mut r = ReferenceColumn::new();
        r.prepare();
        for i in 0..1000 {
            r.scan(i, &Value::Bool(i % 100 == 0));
        }
        let proposal = r.propose_compression(1000);
        assert!(matches!(proposal, Some(ColumnStorage::Enum(_))));
    }

    #[test]
    fn proposes_int_for_plain_integers() {
        let mut r = ReferenceColumn::new();
        r.prepare();
        // Quadratic, not arithmetic: stride changes every step, so this
        // isn't worth Seq-encoding and Int is the terminal choice.
        for i in 0..100i64 {
            r.scan(i as usize, &Value::Int64(i * i));
        }
        let proposal = r.propose_compression(100);
        assert!(matches!(proposal, Some(ColumnStorage::Int(_))));
    }
}
