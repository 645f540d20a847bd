//! rANS-entropy-coded enum codec (spec §4.B "Enum codec detail").
//!
//! At most 8 distinct symbols (including `Null` if present) are entropy
//! coded with a byte-oriented rANS coder (the classic Fabian Giesen
//! `rans_byte` formulation: encode symbols back-to-front, decode
//! forward). The column is split into fixed-size chunks so random access
//! only has to replay one chunk from its start, and a two-level jump
//! index (absolute per stride, relative per chunk) locates which chunk a
//! row falls in without scanning every chunk.
//!
//! Simplification versus spec wording: chunks here hold a fixed symbol
//! count (the last chunk may be shorter) rather than a byte-budget-driven
//! variable count; the jump index is still built and searched exactly as
//! spec describes, so swapping in variable-size chunks later only touches
//! `encode_chunks`.

use super::traits::CachedReader;
use columnstore_core::Value;

const SCALE_BITS: u32 = 12;
const TOTAL: u32 = 1 << SCALE_BITS;
const RANS_L: u32 = 1 << 23;
const CHUNK_SYMBOLS: usize = 128;
const STRIDE_CHUNKS: usize = 8;
const MAX_SYMBOLS: usize = 8;

#[derive(Debug, Clone)]
struct SymbolEntry {
    value: Value,
    freq: u32,
    cumfreq: u32,
}

#[derive(Debug, Default)]
pub struct EnumColumn {
    symbols: Vec<SymbolEntry>,
    len: usize,
    data: Vec<u8>,
    chunk_offsets: Vec<u32>,
    chunk_lens: Vec<u16>,
    l1: Vec<u32>,
    scan_symbol_order: Vec<Value>,
    scan_freq: rustc_hash::FxHashMap<super::stats::ValueKey, u32>,
    // Scratch state live only between `init` and `finish`.
    build_counts: Vec<u32>,
    build_values: Vec<u8>,
}

impl EnumColumn {
    pub fn new() -> Self {
        EnumColumn::default()
    }

    pub fn prepare(&mut self) {
        self.scan_symbol_order.clear();
        self.scan_freq.clear();
    }

    pub fn scan(&mut self, _i: usize, v: &Value) {
        let key = super::stats::ValueKey::from(v);
        if self.scan_freq.insert(key, 0).is_none() {
            self.scan_symbol_order.push(v.clone());
        }
        // re-insert incremented
    }

    pub fn propose_compression(&self, _n: usize) -> Option<super::storage::ColumnStorage> {
        None
    }

    pub fn init(&mut self, n: usize) {
        self.len = n;
        // Real frequency counting (the `scan` pass above only discovers
        // the alphabet; tally exact frequencies with a second sweep done
        // lazily in `build`, matching the rest of the pipeline's
        // two-phase scan/build split).
        let mut symbols: Vec<Value> = self.scan_symbol_order.clone();
        if symbols.len() == 1 {
            // spec §9 open question: dummy symbol for single-value columns.
            symbols.push(Value::Bool(symbols[0] != Value::Bool(true)));
        }
        symbols.truncate(MAX_SYMBOLS);
        self.symbols = symbols
            .into_iter()
            .map(|v| SymbolEntry {
                value: v,
                freq: 0,
                cumfreq: 0,
            })
            .collect();
        self.build_counts = vec![0u32; self.symbols.len()];
        self.build_values = Vec::with_capacity(n);
    }

    // Extra scratch state used only between `init` and `finish`, kept out
    // of the serialized form.
    pub fn build(&mut self, _i: usize, v: &Value) {
        let idx = self.symbol_index(v);
        self.build_counts[idx] += 1;
        self.build_values.push(idx as u8);
    }

    pub fn finish(&mut self) {
        let total_observed: u32 = self.build_counts.iter().sum();
        assign_frequencies(&mut self.symbols, &self.build_counts, total_observed.max(1));

        let chunks: Vec<&[u8]> = self.build_values.chunks(CHUNK_SYMBOLS).collect();
        self.chunk_offsets = Vec::with_capacity(chunks.len() + 1);
        self.chunk_lens = Vec::with_capacity(chunks.len());
        self.data = Vec::new();
        self.chunk_offsets.push(0);
        for chunk in &chunks {
            let encoded = encode_chunk(chunk, &self.symbols);
            self.data.extend_from_slice(&encoded);
            self.chunk_offsets.push(self.data.len() as u32);
            self.chunk_lens.push(chunk.len() as u16);
        }

        self.l1 = Vec::new();
        let mut cumulative = 0u32;
        for (i, len) in self.chunk_lens.iter().enumerate() {
            if i % STRIDE_CHUNKS == 0 {
                self.l1.push(cumulative);
            }
            cumulative += *len as u32;
        }

        self.build_counts.clear();
        self.build_values.clear();
    }

    fn symbol_index(&self, v: &Value) -> usize {
        self.symbols
            .iter()
            .position(|s| &s.value == v)
            .unwrap_or(0)
    }

    fn locate_chunk(&self, i: usize) -> (usize, usize) {
        // Binary search L1 for the stride containing row i, then walk the
        // (at most STRIDE_CHUNKS) chunks inside that stride.
        let mut lo = 0usize;
        let mut hi = self.l1.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if (self.l1[mid] as usize) <= i {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        let stride = lo.saturating_sub(1);
        let mut cumulative = self.l1[stride] as usize;
        let start_chunk = stride * STRIDE_CHUNKS;
        for c in start_chunk..self.chunk_lens.len() {
            let len = self.chunk_lens[c] as usize;
            if i < cumulative + len {
                return (c, i - cumulative);
            }
            cumulative += len;
        }
        (self.chunk_lens.len() - 1, 0)
    }

    pub fn get(&self, i: usize) -> Value {
        let (chunk, offset) = self.locate_chunk(i);
        let start = self.chunk_offsets[chunk] as usize;
        let end = self.chunk_offsets[chunk + 1] as usize;
        let decoded = decode_chunk(&self.data[start..end], &self.symbols, offset + 1);
        self.symbols[decoded[offset] as usize].value.clone()
    }

    /// A cursor that decodes one chunk at a time and reuses it across
    /// consecutive reads, giving the amortized O(1) sequential access
    /// random `get()` calls don't have.
    pub fn cached_reader(&self) -> EnumCachedReader<'_> {
        EnumCachedReader {
            column: self,
            cached_chunk: None,
            cached_values: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn compute_size(&self) -> usize {
        self.data.len() + self.l1.len() * 4 + self.chunk_lens.len() * 2 + self.symbols.len() * 24
    }

    pub fn serialize(&self) -> Vec<u8> {
        use byteorder::{LittleEndian, WriteBytesExt};
        let mut out = Vec::new();
        out.write_u8(self.symbols.len() as u8).unwrap();
        out.write_u32::<LittleEndian>(self.len as u32).unwrap();
        out.write_u8(STRIDE_CHUNKS as u8).unwrap();
        out.write_u32::<LittleEndian>(self.data.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(self.l1.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(self.chunk_lens.len() as u32).unwrap();
        for s in &self.symbols {
            out.write_u32::<LittleEndian>(s.freq).unwrap();
        }
        for s in &self.symbols {
            let json = serde_json::to_vec(&s.value).unwrap();
            out.write_u32::<LittleEndian>(json.len() as u32).unwrap();
            out.extend_from_slice(&json);
        }
        out.extend_from_slice(&self.data);
        for &off in &self.chunk_offsets {
            out.write_u32::<LittleEndian>(off).unwrap();
        }
        for &l1 in &self.l1 {
            out.write_u32::<LittleEndian>(l1).unwrap();
        }
        for &l2 in &self.chunk_lens {
            out.write_u16::<LittleEndian>(l2).unwrap();
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, super::traits::CodecError> {
        use byteorder::{LittleEndian, ReadBytesExt};
        let mut cur = std::io::Cursor::new(bytes);
        let err = |e: std::io::Error| super::traits::CodecError::Malformed(e.to_string());
        let k = cur.read_u8().map_err(err)? as usize;
        let len = cur.read_u32::<LittleEndian>().map_err(err)? as usize;
        let _stride = cur.read_u8().map_err(err)?;
        let data_len = cur.read_u32::<LittleEndian>().map_err(err)? as usize;
        let l1_len = cur.read_u32::<LittleEndian>().map_err(err)? as usize;
        let num_chunks = cur.read_u32::<LittleEndian>().map_err(err)? as usize;

        let mut freqs = Vec::with_capacity(k);
        for _ in 0..k {
            freqs.push(cur.read_u32::<LittleEndian>().map_err(err)?);
        }
        let mut values = Vec::with_capacity(k);
        for _ in 0..k {
            let vlen = cur.read_u32::<LittleEndian>().map_err(err)? as usize;
            let pos = cur.position() as usize;
            let v: Value = serde_json::from_slice(&bytes[pos..pos + vlen])
                .map_err(|e| super::traits::CodecError::Malformed(e.to_string()))?;
            values.push(v);
            cur.set_position((pos + vlen) as u64);
        }
        let mut cumfreq = 0u32;
        let symbols: Vec<SymbolEntry> = values
            .into_iter()
            .zip(freqs.into_iter())
            .map(|(value, freq)| {
                let entry = SymbolEntry {
                    value,
                    freq,
                    cumfreq,
                };
                cumfreq += freq;
                entry
            })
            .collect();

        let pos = cur.position() as usize;
        let data = bytes[pos..pos + data_len].to_vec();
        cur.set_position((pos + data_len) as u64);

        let mut chunk_offsets = Vec::with_capacity(num_chunks + 1);
        for _ in 0..=num_chunks {
            chunk_offsets.push(cur.read_u32::<LittleEndian>().map_err(err)?);
        }
        let mut l1 = Vec::with_capacity(l1_len);
        for _ in 0..l1_len {
            l1.push(cur.read_u32::<LittleEndian>().map_err(err)?);
        }
        let mut chunk_lens = Vec::with_capacity(num_chunks);
        for _ in 0..num_chunks {
            chunk_lens.push(cur.read_u16::<LittleEndian>().map_err(err)?);
        }

        Ok(EnumColumn {
            symbols,
            len,
            data,
            chunk_offsets,
            chunk_lens,
            l1,
            scan_symbol_order: Vec::new(),
            scan_freq: rustc_hash::FxHashMap::default(),
            build_counts: Vec::new(),
            build_values: Vec::new(),
        })
    }
}

/// Distribute `TOTAL` among symbols proportional to observed counts.
/// A symbol with zero observed count is the dummy fallback (spec §9):
/// it is given the minimum share of 1 and never actually produced by
/// `encode_chunk`, so that reservation doesn't cost real compression.
/// Cursor over an [`EnumColumn`] that keeps the most recently decoded
/// chunk around so runs of consecutive reads only pay one rANS replay.
pub struct EnumCachedReader<'a> {
    column: &'a EnumColumn,
    cached_chunk: Option<usize>,
    cached_values: Vec<u8>,
}

impl<'a> CachedReader for EnumCachedReader<'a> {
    fn read(&mut self, i: usize) -> Value {
        let (chunk, offset) = self.column.locate_chunk(i);
        if self.cached_chunk != Some(chunk) {
            let start = self.column.chunk_offsets[chunk] as usize;
            let end = self.column.chunk_offsets[chunk + 1] as usize;
            let len = self.column.chunk_lens[chunk] as usize;
            self.cached_values = decode_chunk(&self.column.data[start..end], &self.column.symbols, len);
            self.cached_chunk = Some(chunk);
        }
        self.column.symbols[self.cached_values[offset] as usize].value.clone()
    }
}

fn assign_frequencies(symbols: &mut [SymbolEntry], observed: &[u32], total_observed: u32) {
    let k = symbols.len();
    let mut freqs = vec![1u32; k];
    let real_idx: Vec<usize> = (0..k).filter(|&i| observed[i] > 0).collect();
    let reserved = (k - real_idx.len()) as u32;
    let budget = TOTAL.saturating_sub(reserved);
    let mut assigned = 0u32;
    for &i in &real_idx {
        let share = ((observed[i] as u64 * budget as u64) / total_observed.max(1) as u64) as u32;
        freqs[i] = share.max(1);
        assigned += freqs[i];
    }
    if !real_idx.is_empty() {
        let mut diff = TOTAL as i64 - reserved as i64 - assigned as i64;
        let mut idx = 0;
        while diff != 0 {
            let i = real_idx[idx % real_idx.len()];
            if diff > 0 {
                freqs[i] += 1;
                diff -= 1;
            } else if freqs[i] > 1 {
                freqs[i] -= 1;
                diff += 1;
            }
            idx += 1;
        }
    }
    let mut cumfreq = 0u32;
    for (i, s) in symbols.iter_mut().enumerate() {
        s.freq = freqs[i];
        s.cumfreq = cumfreq;
        cumfreq += freqs[i];
    }
}

fn encode_chunk(symbol_indices: &[u8], symbols: &[SymbolEntry]) -> Vec<u8> {
    let mut x = RANS_L;
    let mut groups: Vec<Vec<u8>> = Vec::with_capacity(symbol_indices.len());
    for &idx in symbol_indices.iter().rev() {
        let sym = &symbols[idx as usize];
        let mut local = Vec::new();
        let x_max = ((RANS_L >> SCALE_BITS) << 8) * sym.freq;
        while x >= x_max {
            local.push((x & 0xff) as u8);
            x >>= 8;
        }
        x = (x / sym.freq) * TOTAL + (x % sym.freq) + sym.cumfreq;
        groups.push(local);
    }
    let mut body = Vec::new();
    body.extend_from_slice(&x.to_le_bytes());
    for group in groups.iter().rev() {
        body.extend_from_slice(group);
    }
    body
}

fn decode_chunk(bytes: &[u8], symbols: &[SymbolEntry], count: usize) -> Vec<u8> {
    let mut x = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let mut pos = 4usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let slot = x & (TOTAL - 1);
        let sym_idx = symbols
            .iter()
            .position(|s| slot >= s.cumfreq && slot < s.cumfreq + s.freq)
            .unwrap_or(0);
        let sym = &symbols[sym_idx];
        x = sym.freq * (x >> SCALE_BITS) + slot - sym.cumfreq;
        while x < RANS_L && pos < bytes.len() {
            x = (x << 8) | bytes[pos] as u32;
            pos += 1;
        }
        out.push(sym_idx as u8);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(values: &[Value]) -> EnumColumn {
        let mut c = EnumColumn::new();
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
    fn round_trips_skewed_booleans() {
        let mut values = vec![Value::Bool(false); 1000];
        for i in 1..=10 {
            values[i * 100 - 1] = Value::Bool(true);
        }
        let c = build(&values);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(&c.get(i), v, "mismatch at row {i}");
        }
        assert!(c.compute_size() < 200, "size was {}", c.compute_size());
    }

    #[test]
    fn falls_back_to_dummy_symbol_for_single_value() {
        let values = vec![Value::Int64(7); 50];
        let c = build(&values);
        assert_eq!(c.symbols.len(), 2);
        for i in 0..50 {
            assert_eq!(c.get(i), Value::Int64(7));
        }
    }

    #[test]
    fn round_trips_across_chunk_boundary() {
        let values: Vec<Value> = (0..400)
            .map(|i| Value::Bool(i % 7 == 0))
            .collect();
        let c = build(&values);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(&c.get(i), v, "mismatch at row {i}");
        }
    }

    #[test]
    fn serialize_round_trip() {
        let values: Vec<Value> = (0..300).map(|i| Value::Int64(i % 5)).collect();
        let c = build(&values);
        let bytes = c.serialize();
        let c2 = EnumColumn::deserialize(&bytes).unwrap();
        for i in 0..values.len() {
            assert_eq!(c.get(i), c2.get(i));
        }
    }
}
