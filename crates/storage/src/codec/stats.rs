//! Statistics gathered by the Reference codec during its scan pass.
//!
//! The Reference codec is the oracle (spec §4.B): it observes every value
//! once before proposing, so every specialization receives a validated
//! input. `ColumnStats` is what it accumulates and what `propose` reads.

use columnstore_core::Value;
use rustc_hash::FxHashMap;

/// Maximum distinct strings tracked before giving up on dictionary
/// encoding (spec: "≤ ~256 distinct strings").
pub const DICT_DISTINCT_LIMIT: usize = 256;
/// Null ratio above which Sparse is proposed (spec: "≥ ~13% nulls").
pub const SPARSE_NULL_RATIO: f64 = 0.13;
/// Distinct-symbol ceiling for Enum (spec: "≤ 8 distinct symbols").
pub const ENUM_DISTINCT_LIMIT: usize = 8;
/// String length at/above which Blob-overlay replaces the value with a
/// content-hash sentinel (spec: "strings ≥ 256 bytes").
pub const BLOB_OVERLAY_THRESHOLD: usize = 256;
/// Largest decimal scale considered before giving up on exact
/// fixed-point representation.
pub const MAX_DECIMAL_SCALE: u32 = 8;

/// Column-wide statistics collected while scanning.
#[derive(Debug, Default)]
pub struct ColumnStats {
    /// Total rows observed.
    pub count: usize,
    /// Rows observed as `Value::Null`.
    pub null_count: usize,
    /// True if every non-null value is `Int64`.
    pub all_int: bool,
    /// True if every non-null value is `Int64` or `Float64`.
    pub all_numeric: bool,
    /// True if any non-null numeric value is a float (so not a plain int
    /// column).
    pub any_float: bool,
    /// True if any float is NaN or cannot be represented as `m · 10^s`
    /// with a bounded scale.
    pub any_non_decimal_float: bool,
    /// Smallest decimal scale that represents every numeric value
    /// exactly, or `None` if no bounded scale works.
    pub common_decimal_scale: Option<u32>,
    /// Minimum integer value observed (for Int codec offset/bit-width).
    pub int_min: i64,
    /// Maximum integer value observed.
    pub int_max: i64,
    /// True if every non-null value is a `String`.
    pub all_string: bool,
    /// Distinct non-null values observed, capped at `ENUM_DISTINCT_LIMIT
    /// + 1` (anything past the cap is still counted towards
    /// `distinct_count` but the set itself is dropped once useless).
    pub distinct_values: FxHashMap<ValueKey, u64>,
    /// Longest string length observed, for blob-overlay eligibility.
    pub max_string_len: usize,
    /// Whether the non-null Int64 sequence forms few-enough runs to be
    /// worth Seq-encoding (computed lazily by `seq::detect_runs`).
    pub int_values: Vec<Option<i64>>,
}

/// A hashable, totally-ordered stand-in for `Value` used as a distinct-set
/// key (floats are compared by bit pattern, matching `Value`'s `Eq`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    FloatBits(u64),
    Str(String),
    Other,
}

impl From<&Value> for ValueKey {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int64(i) => ValueKey::Int(*i),
            Value::Float64(f) => ValueKey::FloatBits(f.to_bits()),
            Value::String(s) => ValueKey::Str(s.clone()),
            _ => ValueKey::Other,
        }
    }
}

impl ColumnStats {
    /// Start a fresh accumulator; `all_int`/`all_numeric`/`all_string`
    /// start optimistic and are cleared on the first counterexample.
    pub fn new() -> Self {
        ColumnStats {
            all_int: true,
            all_numeric: true,
            all_string: true,
            int_min: i64::MAX,
            int_max: i64::MIN,
            ..Default::default()
        }
    }

    /// Feed one observed value into the accumulator.
    pub fn observe(&mut self, v: &Value) {
        self.count += 1;
        match v {
            Value::Null => {
                self.null_count += 1;
                self.int_values.push(None);
            }
            Value::Int64(i) => {
                self.all_string = false;
                self.int_min = self.int_min.min(*i);
                self.int_max = self.int_max.max(*i);
                self.int_values.push(Some(*i));
                self.update_decimal_scale(*i as f64, 0);
            }
            Value::Float64(f) => {
                self.all_int = false;
                self.all_string = false;
                self.int_values.push(None);
                if f.is_nan() {
                    self.any_non_decimal_float = true;
                } else {
                    self.any_float = true;
                    self.update_decimal_scale_from_float(*f);
                }
            }
            Value::String(_) => {
                self.all_int = false;
                self.all_numeric = false;
                if let Value::String(s) = v {
                    self.max_string_len = self.max_string_len.max(s.len());
                }
                self.int_values.push(None);
            }
            _ => {
                self.all_int = false;
                self.all_numeric = false;
                self.all_string = false;
                self.int_values.push(None);
            }
        }
        if self.distinct_values.len() <= ENUM_DISTINCT_LIMIT.max(DICT_DISTINCT_LIMIT) {
            *self.distinct_values.entry(ValueKey::from(v)).or_insert(0) += 1;
        }
    }

    fn update_decimal_scale(&mut self, _value: f64, scale: u32) {
        self.common_decimal_scale = Some(match self.common_decimal_scale {
            Some(s) => s.max(scale),
            None => scale,
        });
    }

    fn update_decimal_scale_from_float(&mut self, f: f64) {
        match required_scale(f) {
            Some(scale) => self.update_decimal_scale(f, scale),
            None => {
                self.any_non_decimal_float = true;
                self.common_decimal_scale = None;
            }
        }
    }

    /// Fraction of observed rows that were `Null`.
    pub fn null_ratio(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.null_count as f64 / self.count as f64
        }
    }

    /// Number of distinct non-null values observed (saturating at the cap
    /// tracked by `distinct_values`).
    pub fn distinct_count(&self) -> usize {
        self.distinct_values
            .keys()
            .filter(|k| **k != ValueKey::Null)
            .count()
    }

    /// True if Decimal is eligible: a common bounded scale exists and at
    /// least one value actually needs fractional precision (otherwise a
    /// plain Int/Seq encoding is preferred).
    pub fn decimal_eligible(&self) -> bool {
        self.all_numeric
            && !self.any_non_decimal_float
            && self.any_float
            && self.common_decimal_scale.map(|s| s > 0).unwrap_or(false)
    }
}

/// Smallest scale `s <= MAX_DECIMAL_SCALE` such that `f * 10^s` is
/// (within float rounding) an integer, or `None` if no such scale exists.
pub fn required_scale(f: f64) -> Option<u32> {
    for s in 0..=MAX_DECIMAL_SCALE {
        let scaled = f * 10f64.powi(s as i32);
        if (scaled - scaled.round()).abs() < 1e-6 {
            return Some(s);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_int_flag_cleared_by_float() {
        let mut s = ColumnStats::new();
        s.observe(&Value::Int64(1));
        assert!(s.all_int);
        s.observe(&Value::Float64(1.5));
        assert!(!s.all_int);
    }

    #[test]
    fn null_ratio_computed() {
        let mut s = ColumnStats::new();
        s.observe(&Value::Null);
        s.observe(&Value::Int64(1));
        assert!((s.null_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn decimal_scale_detected() {
        assert_eq!(required_scale(1.25), Some(2));
        assert_eq!(required_scale(3.0), Some(0));
        assert_eq!(required_scale(std::f64::consts::PI), None);
    }
}
