//! Raw float codec (spec §4.B "Any NaN/non-decimal float").
//!
//! Values are stored as plain `f64`s. `Null` is stored as a canonical NaN
//! bit pattern and read back as `Null`, matching spec §4.A's rule that
//! NaN is treated as Null on read for numeric codecs.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use columnstore_core::Value;

const NULL_BITS: u64 = 0x7ff8_0000_0000_0001;

#[derive(Debug, Default)]
pub struct FloatColumn {
    data: Vec<f64>,
}

impl FloatColumn {
    pub fn new() -> Self {
        FloatColumn::default()
    }

    pub fn prepare(&mut self) {}
    pub fn scan(&mut self, _i: usize, _v: &Value) {}
    pub fn propose_compression(&self, _n: usize) -> Option<super::storage::ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.data = vec![f64::from_bits(NULL_BITS); n];
    }

    pub fn build(&mut self, i: usize, v: &Value) {
        self.data[i] = match v {
            Value::Float64(f) => *f,
            Value::Int64(x) => *x as f64,
            _ => f64::from_bits(NULL_BITS),
        };
    }

    pub fn finish(&mut self) {}

    pub fn get(&self, i: usize) -> Value {
        let f = self.data[i];
        if f.is_nan() {
            Value::Null
        } else {
            Value::Float64(f)
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn compute_size(&self) -> usize {
        self.data.len() * 8
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * 8 + 4);
        out.write_u32::<LittleEndian>(self.data.len() as u32).unwrap();
        for f in &self.data {
            out.write_f64::<LittleEndian>(*f).unwrap();
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        let mut cur = std::io::Cursor::new(bytes);
        let n = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let mut data = Vec::with_capacity(n);
        for _ in 0..n {
            data.push(
                cur.read_f64::<LittleEndian>()
                    .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?,
            );
        }
        Ok(FloatColumn { data })
    }
}
