//! Fixed-point decimal codec (spec §4.B "Decimal").
//!
//! Values are stored as `mantissa * 10^-scale` with one scale shared by
//! the whole column; a separate null bitmap covers the nullable case
//! since floats can't carry both a payload bit and a NaN sentinel safely
//! once multiplied into an integer mantissa.

use super::stats::required_scale;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use columnstore_core::Value;

#[derive(Debug, Default)]
pub struct DecimalColumn {
    scale: u32,
    mantissas: Vec<i64>,
    nulls: Vec<bool>,
    scan_scale: u32,
}

impl DecimalColumn {
    pub fn new() -> Self {
        DecimalColumn::default()
    }

    pub fn prepare(&mut self) {
        self.scan_scale = 0;
    }

    pub fn scan(&mut self, _i: usize, v: &Value) {
        let f = match v {
            Value::Int64(x) => *x as f64,
            Value::Float64(f) => *f,
            _ => return,
        };
        if let Some(s) = required_scale(f) {
            self.scan_scale = self.scan_scale.max(s);
        }
    }

    pub fn propose_compression(&self, _n: usize) -> Option<super::storage::ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.scale = self.scan_scale;
        self.mantissas = vec![0; n];
        self.nulls = vec![true; n];
    }

    pub fn build(&mut self, i: usize, v: &Value) {
        let f = match v {
            Value::Int64(x) => Some(*x as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        };
        match f {
            Some(f) => {
                self.nulls[i] = false;
                self.mantissas[i] = (f * 10f64.powi(self.scale as i32)).round() as i64;
            }
            None => {
                self.nulls[i] = true;
            }
        }
    }

    pub fn finish(&mut self) {}

    pub fn get(&self, i: usize) -> Value {
        if self.nulls[i] {
            Value::Null
        } else {
            Value::Float64(self.mantissas[i] as f64 / 10f64.powi(self.scale as i32))
        }
    }

    pub fn len(&self) -> usize {
        self.mantissas.len()
    }
    pub fn is_empty(&self) -> bool {
        self.mantissas.is_empty()
    }

    pub fn compute_size(&self) -> usize {
        self.mantissas.len() * 8 + (self.nulls.len() + 7) / 8
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(self.scale).unwrap();
        out.write_u32::<LittleEndian>(self.mantissas.len() as u32).unwrap();
        for &m in &self.mantissas {
            out.write_i64::<LittleEndian>(m).unwrap();
        }
        for chunk in self.nulls.chunks(8) {
            let mut byte = 0u8;
            for (i, &b) in chunk.iter().enumerate() {
                if b {
                    byte |= 1 << i;
                }
            }
            out.push(byte);
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        let mut cur = std::io::Cursor::new(bytes);
        let scale = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        let n = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let mut mantissas = Vec::with_capacity(n);
        for _ in 0..n {
            mantissas.push(
                cur.read_i64::<LittleEndian>()
                    .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?,
            );
        }
        let start = cur.position() as usize;
        let mask_bytes = &bytes[start..];
        let mut nulls = Vec::with_capacity(n);
        for i in 0..n {
            let byte = mask_bytes.get(i / 8).copied().unwrap_or(0);
            nulls.push((byte >> (i % 8)) & 1 != 0);
        }
        Ok(DecimalColumn {
            scale,
            mantissas,
            nulls,
            scan_scale: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[Value]) -> DecimalColumn {
        let mut c = DecimalColumn::new();
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
    fn round_trips_common_scale() {
        let values = vec![Value::Float64(1.25), Value::Float64(3.0), Value::Null];
        let c = build(&values);
        assert_eq!(c.get(0), Value::Float64(1.25));
        assert_eq!(c.get(1), Value::Float64(3.0));
        assert_eq!(c.get(2), Value::Null);
    }

    #[test]
    fn serialize_round_trip() {
        let values = vec![Value::Float64(0.125), Value::Int64(4)];
        let c = build(&values);
        let bytes = c.serialize();
        let c2 = DecimalColumn::deserialize(&bytes).unwrap();
        assert_eq!(c.get(0), c2.get(0));
        assert_eq!(c.get(1), c2.get(1));
    }
}
