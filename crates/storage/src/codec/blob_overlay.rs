//! Content-hash overlay for large strings (spec §4.B "Blob-overlay":
//! strings ≥ 256 bytes are replaced by a content-hash sentinel, stored
//! once in a deduped, gzip-compressed blob table, and reattached to a
//! base codec's output on read).

use super::storage::ColumnStorage;
use columnstore_core::{LazyString, Value};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rustc_hash::FxHashMap;
use std::io::{Read, Write};

#[derive(Debug)]
pub struct BlobOverlayColumn {
    base: Box<ColumnStorage>,
    blob_order: Vec<[u8; 32]>,
    blobs: FxHashMap<[u8; 32], Vec<u8>>,
    scan_values: Vec<Value>,
}

impl BlobOverlayColumn {
    pub fn new(base: ColumnStorage) -> Self {
        BlobOverlayColumn {
            base: Box::new(base),
            blob_order: Vec::new(),
            blobs: FxHashMap::default(),
            scan_values: Vec::new(),
        }
    }

    pub fn prepare(&mut self) {
        self.scan_values.clear();
        self.base.prepare();
    }

    pub fn scan(&mut self, i: usize, v: &Value) {
        self.scan_values.push(v.clone());
        self.base.scan(i, &overlay_value(v));
    }

    pub fn propose_compression(&self, _n: usize) -> Option<ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        for v in &self.scan_values {
            if let Value::String(s) = v {
                if s.len() >= super::stats::BLOB_OVERLAY_THRESHOLD {
                    self.insert_blob(s.as_bytes());
                }
            }
        }
        self.base.init(n);
    }

    pub fn build(&mut self, i: usize, v: &Value) {
        self.base.build(i, &overlay_value(v));
    }

    pub fn finish(&mut self) {
        self.base.finish();
    }

    fn insert_blob(&mut self, bytes: &[u8]) {
        let ls = LazyString::from_content(bytes);
        let hash = ls.sha256;
        if let std::collections::hash_map::Entry::Vacant(e) = self.blobs.entry(hash) {
            e.insert(bytes.to_vec());
            self.blob_order.push(hash);
        }
    }

    pub fn get(&self, i: usize) -> Value {
        match self.base.get(i) {
            Value::LazyString(ls) => {
                let bytes = self.blobs.get(&ls.sha256).expect("blob present for overlaid row");
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
            other => other,
        }
    }

    pub fn len(&self) -> usize {
        self.base.len()
    }
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    pub fn compute_size(&self) -> usize {
        self.base.compute_size() + self.blobs.values().map(|b| b.len()).sum::<usize>()
    }

    pub fn serialize(&self) -> Vec<u8> {
        use byteorder::{LittleEndian, WriteBytesExt};
        let mut out = Vec::new();
        out.write_u8(self.base.magic()).unwrap();
        let base_bytes = self.base.serialize();
        out.write_u32::<LittleEndian>(base_bytes.len() as u32).unwrap();
        out.extend_from_slice(&base_bytes);

        out.write_u32::<LittleEndian>(self.blob_order.len() as u32).unwrap();
        for hash in &self.blob_order {
            let raw = &self.blobs[hash];
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(raw).expect("gzip encode of in-memory buffer cannot fail");
            let compressed = encoder.finish().expect("gzip finish of in-memory buffer cannot fail");
            out.extend_from_slice(hash);
            out.write_u32::<LittleEndian>(compressed.len() as u32).unwrap();
            out.extend_from_slice(&compressed);
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let err = |e: std::io::Error| super::traits::CodecError::Malformed(e.to_string());
        let mut cur = std::io::Cursor::new(bytes);
        let base_magic = cur.read_u8().map_err(err)?;
        let base_len = cur.read_u32::<LittleEndian>().map_err(err)? as usize;
        let pos = cur.position() as usize;
        let base = ColumnStorage::deserialize(base_magic, &bytes[pos..pos + base_len])?;
        cur.set_position((pos + base_len) as u64);

        let blob_count = cur.read_u32::<LittleEndian>().map_err(err)? as usize;
        let mut blobs = FxHashMap::default();
        let mut blob_order = Vec::with_capacity(blob_count);
        for _ in 0..blob_count {
            let mut hash = [0u8; 32];
            let pos = cur.position() as usize;
            hash.copy_from_slice(&bytes[pos..pos + 32]);
            cur.set_position((pos + 32) as u64);
            let clen = cur.read_u32::<LittleEndian>().map_err(err)? as usize;
            let cpos = cur.position() as usize;
            let mut decoder = GzDecoder::new(&bytes[cpos..cpos + clen]);
            let mut raw = Vec::new();
            decoder.read_to_end(&mut raw).map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
            cur.set_position((cpos + clen) as u64);
            blob_order.push(hash);
            blobs.insert(hash, raw);
        }

        Ok(BlobOverlayColumn {
            base: Box::new(base),
            blob_order,
            blobs,
            scan_values: Vec::new(),
        })
    }
}

fn overlay_value(v: &Value) -> Value {
    match v {
        Value::String(s) if s.len() >= super::stats::BLOB_OVERLAY_THRESHOLD => {
            Value::LazyString(LazyString::from_content(s.as_bytes()))
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[Value]) -> BlobOverlayColumn {
        let base = ColumnStorage::new_string_nodict();
        let mut c = BlobOverlayColumn::new(base);
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
    fn large_strings_round_trip_through_blob_table() {
        let big = "x".repeat(500);
        let values = vec![
            Value::String(big.clone()),
            Value::String("small".into()),
            Value::String(big.clone()),
        ];
        let c = build(&values);
        assert_eq!(c.get(0), Value::String(big.clone()));
        assert_eq!(c.get(1), Value::String("small".into()));
        assert_eq!(c.get(2), Value::String(big));
        assert_eq!(c.blob_order.len(), 1, "identical blobs must dedupe");
    }

    #[test]
    fn serialize_round_trip() {
        let big = "y".repeat(300);
        let values = vec![Value::String(big.clone()), Value::Null];
        let c = build(&values);
        let bytes = c.serialize();
        let c2 = BlobOverlayColumn::deserialize(&bytes).unwrap();
        assert_eq!(c.get(0), c2.get(0));
        assert_eq!(c.get(1), c2.get(1));
    }
}
