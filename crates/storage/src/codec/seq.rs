//! Arithmetic-run codec (spec §4.B "Seq codec detail").
//!
//! Detects maximal runs of integers that either increase by a constant
//! stride or are all null, and stores three parallel inner Int columns:
//! run-start-recid, start-value (nullable, `Null` marks a null run), and
//! stride.

use super::int::IntColumn;
use super::traits::CachedReader;
use columnstore_core::Value;

#[derive(Debug, Clone)]
pub(crate) struct Run {
    pub start_recid: usize,
    pub start_value: Option<i64>,
    pub stride: i64,
}

/// Detect maximal runs. A run ends when the next value breaks stride or
/// crosses the null/non-null boundary (spec §4.B).
pub(crate) fn detect_runs(values: &[Option<i64>]) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < values.len() {
        match values[i] {
            None => {
                let start = i;
                while i < values.len() && values[i].is_none() {
                    i += 1;
                }
                runs.push(Run {
                    start_recid: start,
                    start_value: None,
                    stride: 0,
                });
            }
            Some(v0) => {
                let start = i;
                if i + 1 < values.len() {
                    if let Some(v1) = values[i + 1] {
                        let stride = v1 - v0;
                        let mut j = i + 1;
                        let mut prev = v1;
                        while j + 1 < values.len() {
                            if let Some(next) = values[j + 1] {
                                if next - prev == stride {
                                    prev = next;
                                    j += 1;
                                    continue;
                                }
                            }
                            break;
                        }
                        i = j + 1;
                        runs.push(Run {
                            start_recid: start,
                            start_value: Some(v0),
                            stride,
                        });
                        continue;
                    }
                }
                i += 1;
                runs.push(Run {
                    start_recid: start,
                    start_value: Some(v0),
                    stride: 0,
                });
            }
        }
    }
    runs
}

/// Heuristic: worth Seq-encoding when the run count is meaningfully
/// smaller than the row count (at least 2x run-length compression on
/// average).
pub fn worth_seq_encoding(values: &[Option<i64>]) -> bool {
    if values.len() < 4 {
        return false;
    }
    let runs = detect_runs(values);
    runs.len() * 2 <= values.len()
}

#[derive(Debug, Default)]
pub struct SeqColumn {
    starts: IntColumn,
    values: IntColumn,
    strides: IntColumn,
    len: usize,
    scan_values: Vec<Option<i64>>,
}

impl SeqColumn {
    pub fn new() -> Self {
        SeqColumn::default()
    }

    pub fn prepare(&mut self) {
        self.scan_values.clear();
    }

    pub fn scan(&mut self, _i: usize, v: &Value) {
        self.scan_values.push(match v {
            Value::Int64(x) => Some(*x),
            _ => None,
        });
    }

    pub fn propose_compression(&self, _n: usize) -> Option<super::storage::ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.len = n;
        let runs = detect_runs(&self.scan_values);

        let start_vals: Vec<Value> = runs.iter().map(|r| Value::Int64(r.start_recid as i64)).collect();
        let value_vals: Vec<Value> = runs
            .iter()
            .map(|r| r.start_value.map(Value::Int64).unwrap_or(Value::Null))
            .collect();
        let stride_vals: Vec<Value> = runs.iter().map(|r| Value::Int64(r.stride)).collect();

        self.starts = build_int_column(&start_vals);
        self.values = build_int_column(&value_vals);
        self.strides = build_int_column(&stride_vals);
    }

    pub fn build(&mut self, _i: usize, _v: &Value) {
        // Fully determined by `init` from the scan pass; build is a no-op.
    }

    pub fn finish(&mut self) {}

    fn run_index_for(&self, i: usize) -> usize {
        // Binary search for the last run whose start_recid <= i.
        let n_runs = self.starts.len();
        let mut lo = 0usize;
        let mut hi = n_runs;
        while lo < hi {
            let mid = (lo + hi) / 2;
            let start = match self.starts.get(mid) {
                Value::Int64(s) => s as usize,
                _ => 0,
            };
            if start <= i {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo.saturating_sub(1)
    }

    pub fn get(&self, i: usize) -> Value {
        let r = self.run_index_for(i);
        self.value_at_run(r, i)
    }

    /// `true` if run `r` covers recid `i`, i.e. `i` falls in
    /// `[start_recid(r), start_recid(r + 1))` (or `[start_recid(r), len)`
    /// for the last run). Used by [`SeqCachedReader`] to skip the binary
    /// search on repeat hits against the same run.
    fn run_covers(&self, r: usize, i: usize) -> bool {
        let start = match self.starts.get(r) {
            Value::Int64(s) => s as usize,
            _ => return false,
        };
        if i < start {
            return false;
        }
        let end = if r + 1 < self.starts.len() {
            match self.starts.get(r + 1) {
                Value::Int64(s) => s as usize,
                _ => self.len,
            }
        } else {
            self.len
        };
        i < end
    }

    fn value_at_run(&self, r: usize, i: usize) -> Value {
        let start_recid = match self.starts.get(r) {
            Value::Int64(s) => s as usize,
            _ => 0,
        };
        match self.values.get(r) {
            Value::Null => Value::Null,
            Value::Int64(start_value) => {
                let stride = match self.strides.get(r) {
                    Value::Int64(s) => s,
                    _ => 0,
                };
                Value::Int64(start_value + (i - start_recid) as i64 * stride)
            }
            _ => Value::Null,
        }
    }

    /// A cursor that remembers the last resolved run and skips the binary
    /// search in `run_index_for` when the next read falls in the same run
    /// (spec §4.B "Seq codec detail": a one-slot cache for sequential
    /// access), mirroring [`EnumColumn::cached_reader`](super::enum::EnumColumn::cached_reader).
    pub fn cached_reader(&self) -> SeqCachedReader<'_> {
        SeqCachedReader { column: self, cached_run: None }
    }

    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn compute_size(&self) -> usize {
        self.starts.compute_size() + self.values.compute_size() + self.strides.compute_size() + 8
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        use byteorder::{LittleEndian, WriteBytesExt};
        out.write_u32::<LittleEndian>(self.len as u32).unwrap();
        for part in [self.starts.serialize(), self.values.serialize(), self.strides.serialize()] {
            out.write_u32::<LittleEndian>(part.len() as u32).unwrap();
            out.extend_from_slice(&part);
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let mut cur = std::io::Cursor::new(bytes);
        let len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let mut parts = Vec::new();
        for _ in 0..3 {
            let plen = cur
                .read_u32::<LittleEndian>()
                .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
            let pos = cur.position() as usize;
            parts.push(IntColumn::deserialize(&bytes[pos..pos + plen])?);
            cur.set_position((pos + plen) as u64);
        }
        let mut it = parts.into_iter();
        Ok(SeqColumn {
            starts: it.next().unwrap(),
            values: it.next().unwrap(),
            strides: it.next().unwrap(),
            len,
            scan_values: Vec::new(),
        })
    }
}

/// Cursor over a [`SeqColumn`] that keeps the most recently resolved run
/// index around so consecutive reads within one run skip the binary
/// search entirely.
pub struct SeqCachedReader<'a> {
    column: &'a SeqColumn,
    cached_run: Option<usize>,
}

impl<'a> CachedReader for SeqCachedReader<'a> {
    fn read(&mut self, i: usize) -> Value {
        let r = match self.cached_run {
            Some(r) if self.column.run_covers(r, i) => r,
            _ => {
                let r = self.column.run_index_for(i);
                self.cached_run = Some(r);
                r
            }
        };
        self.column.value_at_run(r, i)
    }
}

fn build_int_column(values: &[Value]) -> IntColumn {
    let mut c = IntColumn::new();
    c.prepare();
    for (i, v) in values.iter().enumerate() {
        c.scan(i, v);
    }
    c.init(values.len());
    for (i, v) in values.iter().enumerate() {
        c.build(i, v);
    }
    c.finish();
    c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[Value]) -> SeqColumn {
        let mut c = SeqColumn::new();
        c.prepare();
        for (i, v) in values.iter().enumerate() {
            c.scan(i, v);
        }
        c.init(values.len());
        for (i, v) in values.iter().enumerate() {
            c.build(i, v);
        }
        c.finish();
        c
    }

    #[test]
    fn detects_three_runs_with_null_gap() {
        let values: Vec<Option<i64>> = vec![
            Some(1),
            Some(2),
            Some(3),
            Some(4),
            None,
            None,
            Some(10),
            Some(20),
            Some(30),
        ];
        let runs = detect_runs(&values);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].start_value, Some(1));
        assert_eq!(runs[0].stride, 1);
        assert_eq!(runs[1].start_value, None);
        assert_eq!(runs[2].start_value, Some(10));
        assert_eq!(runs[2].stride, 10);
    }

    #[test]
    fn round_trips_mixed_nulls() {
        let values: Vec<Value> = vec![1, 2, 3, 4]
            .into_iter()
            .map(Value::Int64)
            .chain([Value::Null, Value::Null])
            .chain([10, 20, 30].into_iter().map(Value::Int64))
            .collect();
        let c = build(&values);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(&c.get(i), v, "mismatch at {i}");
        }
    }

    #[test]
    fn serialize_round_trip() {
        let values: Vec<Value> = (0..20).map(|i| Value::Int64(i * 2)).collect();
        let c = build(&values);
        let bytes = c.serialize();
        let c2 = SeqColumn::deserialize(&bytes).unwrap();
        for i in 0..values.len() {
            assert_eq!(c.get(i), c2.get(i));
        }
    }

    #[test]
    fn cached_reader_matches_direct_get_in_and_out_of_run_order() {
        let values: Vec<Value> = vec![1, 2, 3, 4]
            .into_iter()
            .map(Value::Int64)
            .chain([Value::Null, Value::Null])
            .chain([10, 20, 30].into_iter().map(Value::Int64))
            .collect();
        let c = build(&values);
        let mut reader = c.cached_reader();
        // sequential forward pass within and across runs
        for i in 0..values.len() {
            assert_eq!(reader.read(i), c.get(i), "forward mismatch at {i}");
        }
        // repeat reads inside the same run should hit the cached run
        assert_eq!(reader.read(7), c.get(7));
        assert_eq!(reader.read(8), c.get(8));
        // jump backwards across a run boundary forces a re-resolve
        assert_eq!(reader.read(0), c.get(0));
        assert_eq!(reader.read(4), c.get(4));
    }
}
