//! Dictionary string codec (spec §4.B: "≤ ~256 distinct strings OR high
//! repetition"). Stores a small dictionary plus one packed code per row.

use super::int::{bits_for, read_bits, write_bits};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use columnstore_core::Value;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct StringDictColumn {
    dict: Vec<String>,
    bits: u8,
    null_code: u64,
    codes: Vec<u8>,
    len: usize,
    scan_dict: FxHashMap<String, u32>,
}

impl StringDictColumn {
    pub fn new() -> Self {
        StringDictColumn::default()
    }

    pub fn prepare(&mut self) {
        self.scan_dict.clear();
    }

    pub fn scan(&mut self, _i: usize, v: &Value) {
        if let Value::String(s) = v {
            if !self.scan_dict.contains_key(s) {
                let next = self.scan_dict.len() as u32;
                self.scan_dict.insert(s.clone(), next);
            }
        }
    }

    pub fn propose_compression(&self, _n: usize) -> Option<super::storage::ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.len = n;
        let mut entries: Vec<(String, u32)> =
            self.scan_dict.iter().map(|(k, v)| (k.clone(), *v)).collect();
        entries.sort_by_key(|(_, idx)| *idx);
        self.dict = entries.into_iter().map(|(s, _)| s).collect();
        self.null_code = self.dict.len() as u64;
        let span = self.null_code + 1;
        self.bits = bits_for(span);
        let total_bits = self.bits as usize * n;
        self.codes = vec![0u8; (total_bits + 7) / 8];
    }

    pub fn build(&mut self, i: usize, v: &Value) {
        let code = match v {
            Value::String(s) => *self.scan_dict.get(s).expect("scanned value missing from dict") as u64,
            _ => self.null_code,
        };
        write_bits(&mut self.codes, i, self.bits, code);
    }

    pub fn finish(&mut self) {}

    pub fn get(&self, i: usize) -> Value {
        let code = read_bits(&self.codes, i, self.bits);
        if code == self.null_code {
            Value::Null
        } else {
            Value::String(self.dict[code as usize].clone())
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn compute_size(&self) -> usize {
        self.dict.iter().map(|s| s.len()).sum::<usize>() + self.codes.len() + 16
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_u32::<LittleEndian>(self.len as u32).unwrap();
        out.write_u8(self.bits).unwrap();
        out.write_u64::<LittleEndian>(self.null_code).unwrap();
        out.write_u32::<LittleEndian>(self.dict.len() as u32).unwrap();
        for s in &self.dict {
            out.write_u32::<LittleEndian>(s.len() as u32).unwrap();
            out.extend_from_slice(s.as_bytes());
        }
        out.extend_from_slice(&self.codes);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        let mut cur = std::io::Cursor::new(bytes);
        let len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let bits = cur
            .read_u8()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        let null_code = cur
            .read_u64::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
        let dict_len = cur
            .read_u32::<LittleEndian>()
            .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
        let mut dict = Vec::with_capacity(dict_len);
        for _ in 0..dict_len {
            let slen = cur
                .read_u32::<LittleEndian>()
                .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))? as usize;
            let pos = cur.position() as usize;
            dict.push(String::from_utf8_lossy(&bytes[pos..pos + slen]).into_owned());
            cur.set_position((pos + slen) as u64);
        }
        let start = cur.position() as usize;
        let codes = bytes[start..].to_vec();
        Ok(StringDictColumn {
            dict,
            bits,
            null_code,
            codes,
            len,
            scan_dict: FxHashMap::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[Value]) -> StringDictColumn {
        let mut c = StringDictColumn::new();
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
    fn round_trips_repeated_values() {
        let values = vec![
            Value::String("a".into()),
            Value::String("b".into()),
            Value::Null,
            Value::String("a".into()),
        ];
        let c = build(&values);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(&c.get(i), v);
        }
        assert_eq!(c.dict.len(), 2);
    }

    #[test]
    fn serialize_round_trip() {
        let values = vec![Value::String("x".into()), Value::String("y".into())];
        let c = build(&values);
        let bytes = c.serialize();
        let c2 = StringDictColumn::deserialize(&bytes).unwrap();
        for i in 0..values.len() {
            assert_eq!(c.get(i), c2.get(i));
        }
    }
}
