//! No-dictionary string codec (spec §4.B "Otherwise": explicit values and
//! offsets). Used when a string column has too many distinct values for
//! dictionary encoding to help.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use columnstore_core::Value;

#[derive(Debug, Default)]
pub struct StringNoDictColumn {
    data: Vec<u8>,
    offsets: Vec<u32>,
    nulls: Vec<bool>,
}

impl StringNoDictColumn {
    pub fn new() -> Self {
        StringNoDictColumn::default()
    }

    pub fn prepare(&mut self) {}
    pub fn scan(&mut self, _i: usize, _v: &Value) {}
    pub fn propose_compression(&self, _n: usize) -> Option<super::storage::ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.data = Vec::new();
        self.offsets = Vec::with_capacity(n + 1);
        self.offsets.push(0);
        self.nulls = Vec::with_capacity(n);
    }

    pub fn build(&mut self, _i: usize, v: &Value) {
        match v {
            Value::String(s) => {
                self.data.extend_from_slice(s.as_bytes());
                self.nulls.push(false);
            }
            _ => {
                self.nulls.push(true);
            }
        }
        self.offsets.push(self.data.len() as u32);
    }

    pub fn finish(&mut self) {}

    pub fn get(&self, i: usize) -> Value {
        if self.nulls[i] {
            return Value::Null;
        }
        let start = self.offsets[i] as usize;
        let end = self.offsets[i + 1] as usize;
        Value::String(String::from_utf8_lossy(&self.data[start..end]).into_owned())
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    pub fn compute_size(&self) -> usize {
        self.data.len() + self.offsets.len() * 4 + self.nulls.len()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(self.nulls.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(self.data.len() as u32).unwrap();
        out.extend_from_slice(&self.data);
        for &o in &self.offsets {
            out.write_u32::<LittleEndian>(o).unwrap();
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
        let n = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let data_len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let pos = cur.position() as usize;
        let data = bytes[pos..pos + data_len].to_vec();
        cur.set_position((pos + data_len) as u64);
        let mut offsets = Vec::with_capacity(n + 1);
        for _ in 0..=n {
            offsets.push(
                cur.read_u32::<LittleEndian>()
                    .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?,
            );
        }
        let mask_start = cur.position() as usize;
        let mask_bytes = &bytes[mask_start..];
        let mut nulls = Vec::with_capacity(n);
        for i in 0..n {
            let byte = mask_bytes.get(i / 8).copied().unwrap_or(0);
            nulls.push((byte >> (i % 8)) & 1 != 0);
        }
        Ok(StringNoDictColumn { data, offsets, nulls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_strings_and_nulls() {
        let values = vec![
            Value::String("hello".into()),
            Value::Null,
            Value::String("".into()),
            Value::String("world".into()),
        ];
        let mut c = StringNoDictColumn::new();
        c.init(values.len());
        for (i, v) in values.iter().enumerate() {
            c.build(i, v);
        }
        for (i, v) in values.iter().enumerate() {
            assert_eq!(&c.get(i), v);
        }
        let bytes = c.serialize();
        let c2 = StringNoDictColumn::deserialize(&bytes).unwrap();
        for i in 0..values.len() {
            assert_eq!(c.get(i), c2.get(i));
        }
    }
}
