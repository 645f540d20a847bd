//! Bit-packed integer codec (spec §4.B "Int codec detail").
//!
//! Stores `(v - offset)` residuals in a dense bit-packed array using the
//! minimum width that covers the observed range, plus one extra code for
//! `Null` when the column has any.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use columnstore_core::Value;
use std::io::Cursor;

#[derive(Debug, Default)]
pub struct IntColumn {
    offset: i64,
    bits: u8,
    has_null: bool,
    null_code: u64,
    len: usize,
    packed: Vec<u8>,
    // scan-phase accumulator
    scan_min: i64,
    scan_max: i64,
    scan_has_null: bool,
    scan_count: usize,
}

impl IntColumn {
    pub fn new() -> Self {
        IntColumn {
            scan_min: i64::MAX,
            scan_max: i64::MIN,
            ..Default::default()
        }
    }

    pub fn prepare(&mut self) {
        self.scan_min = i64::MAX;
        self.scan_max = i64::MIN;
        self.scan_has_null = false;
        self.scan_count = 0;
    }

    pub fn scan(&mut self, _i: usize, v: &Value) {
        self.scan_count += 1;
        match v {
            Value::Int64(x) => {
                self.scan_min = self.scan_min.min(*x);
                self.scan_max = self.scan_max.max(*x);
            }
            Value::Null => self.scan_has_null = true,
            _ => {}
        }
    }

    pub fn propose_compression(&self, _n: usize) -> Option<super::storage::ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.len = n;
        self.has_null = self.scan_has_null;
        if self.scan_count == 0 || self.scan_min > self.scan_max {
            // all-null column
            self.offset = 0;
            self.bits = 1;
            self.null_code = 0;
        } else {
            self.offset = self.scan_min;
            let span = (self.scan_max - self.scan_min) as u64 + 1 + if self.has_null { 1 } else { 0 };
            self.bits = bits_for(span);
            self.null_code = (self.scan_max - self.scan_min) as u64 + 1;
        }
        let total_bits = self.bits as usize * n;
        self.packed = vec![0u8; (total_bits + 7) / 8];
    }

    pub fn build(&mut self, i: usize, v: &Value) {
        let code = match v {
            Value::Int64(x) => (*x - self.offset) as u64,
            _ => self.null_code,
        };
        write_bits(&mut self.packed, i, self.bits, code);
    }

    pub fn finish(&mut self) {}

    pub fn get(&self, i: usize) -> Value {
        let code = read_bits(&self.packed, i, self.bits);
        if self.has_null && code == self.null_code {
            Value::Null
        } else {
            Value::Int64(code as i64 + self.offset)
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn compute_size(&self) -> usize {
        self.packed.len() + 24
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.packed.len() + 32);
        out.write_i64::<LittleEndian>(self.offset).unwrap();
        out.write_u8(self.bits).unwrap();
        out.write_u8(self.has_null as u8).unwrap();
        out.write_u64::<LittleEndian>(self.null_code).unwrap();
        out.write_u32::<LittleEndian>(self.len as u32).unwrap();
        out.extend_from_slice(&self.packed);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        let mut cur = Cursor::new(bytes);
        let offset = cur
            .read_i64::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        let bits = cur
            .read_u8()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        let has_null = cur
            .read_u8()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?
            != 0;
        let null_code = cur
            .read_u64::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        let len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let start = cur.position() as usize;
        let packed = bytes[start..].to_vec();
        Ok(IntColumn {
            offset,
            bits,
            has_null,
            null_code,
            len,
            packed,
            scan_min: i64::MAX,
            scan_max: i64::MIN,
            scan_has_null: false,
            scan_count: 0,
        })
    }
}

/// Minimum bit width to represent `span` distinct codes (`0..span`).
pub(crate) fn bits_for(span: u64) -> u8 {
    if span <= 1 {
        return 1;
    }
    64 - (span - 1).leading_zeros() as u8
}

pub(crate) fn write_bits(packed: &mut [u8], i: usize, bits: u8, value: u64) {
    let bit_pos = i * bits as usize;
    for b in 0..bits {
        let bit = (value >> b) & 1;
        let pos = bit_pos + b as usize;
        let byte = pos / 8;
        let shift = pos % 8;
        packed[byte] |= (bit as u8) << shift;
    }
}

pub(crate) fn read_bits(packed: &[u8], i: usize, bits: u8) -> u64 {
    let bit_pos = i * bits as usize;
    let mut value = 0u64;
    for b in 0..bits {
        let pos = bit_pos + b as usize;
        let byte = pos / 8;
        let shift = pos % 8;
        let bit = (packed[byte] >> shift) & 1;
        value |= (bit as u64) << b;
    }
    value
}
