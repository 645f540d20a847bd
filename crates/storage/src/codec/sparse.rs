//! Sparse-null codec (spec §4.B: "≥ ~13% nulls; null-mask + dense base
//! for non-nulls"). Wraps whatever codec the pipeline would have chosen
//! for the column's non-null values.

use super::storage::ColumnStorage;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use columnstore_core::Value;

#[derive(Debug, Default)]
pub struct SparseColumn {
    nulls: Vec<bool>,
    row_to_base: Vec<u32>,
    base: Option<Box<ColumnStorage>>,
    scan_values: Vec<Value>,
}

impl SparseColumn {
    pub fn new() -> Self {
        SparseColumn::default()
    }

    pub fn prepare(&mut self) {
        self.scan_values.clear();
    }

    pub fn scan(&mut self, _i: usize, v: &Value) {
        self.scan_values.push(v.clone());
    }

    pub fn propose_compression(&self, _n: usize) -> Option<ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.nulls = self.scan_values.iter().map(|v| matches!(v, Value::Null)).collect();
        let non_null: Vec<Value> = self
            .scan_values
            .iter()
            .filter(|v| !matches!(v, Value::Null))
            .cloned()
            .collect();
        self.row_to_base = Vec::with_capacity(n);
        let mut next_base = 0u32;
        for is_null in &self.nulls {
            if *is_null {
                self.row_to_base.push(u32::MAX);
            } else {
                self.row_to_base.push(next_base);
                next_base += 1;
            }
        }
        self.base = Some(Box::new(super::pipeline::build_column(&non_null)));
    }

    pub fn build(&mut self, _i: usize, _v: &Value) {
        // Fully determined during `init` from the scan pass.
    }

    pub fn finish(&mut self) {}

    pub fn get(&self, i: usize) -> Value {
        if self.nulls[i] {
            return Value::Null;
        }
        let base_idx = self.row_to_base[i] as usize;
        self.base.as_ref().unwrap().get(base_idx)
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    pub fn compute_size(&self) -> usize {
        let base_size = self.base.as_ref().map(|b| b.compute_size()).unwrap_or(0);
        base_size + self.nulls.len() + self.row_to_base.len() * 4
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(self.nulls.len() as u32).unwrap();
        for chunk in self.nulls.chunks(8) {
            let mut byte = 0u8;
            for (i, &b) in chunk.iter().enumerate() {
                if b {
                    byte |= 1 << i;
                }
            }
            out.push(byte);
        }
        let base = self.base.as_ref().unwrap();
        out.write_u8(base.magic()).unwrap();
        let body = base.serialize();
        out.write_u32::<LittleEndian>(body.len() as u32).unwrap();
        out.extend_from_slice(&body);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        let mut cur = std::io::Cursor::new(bytes);
        let n = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let mask_bytes_len = (n + 7) / 8;
        let pos = cur.position() as usize;
        let mask_bytes = &bytes[pos..pos + mask_bytes_len];
        let mut nulls = Vec::with_capacity(n);
        for i in 0..n {
            let byte = mask_bytes.get(i / 8).copied().unwrap_or(0);
            nulls.push((byte >> (i % 8)) & 1 != 0);
        }
        cur.set_position((pos + mask_bytes_len) as u64);
        let magic = cur
            .read_u8()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        let body_len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let body_pos = cur.position() as usize;
        let base = ColumnStorage::deserialize(magic, &bytes[body_pos..body_pos + body_len])?;

        let mut row_to_base = Vec::with_capacity(n);
        let mut next_base = 0u32;
        for is_null in &nulls {
            if *is_null {
                row_to_base.push(u32::MAX);
            } else {
                row_to_base.push(next_base);
                next_base += 1;
            }
        }

        Ok(SparseColumn {
            nulls,
            row_to_base,
            base: Some(Box::new(base)),
            scan_values: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[Value]) -> SparseColumn {
        let mut c = SparseColumn::new();
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
    fn round_trips_with_many_nulls() {
        let mut values = vec![Value::Null; 20];
        values.extend((0..80).map(|i| Value::Int64(i)));
        let c = build(&values);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(&c.get(i), v, "mismatch at {i}");
        }
    }
}
