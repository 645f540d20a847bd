//! A shard: compressed main storage plus a write-optimized delta (spec
//! §3 "Shard", §4.C). Main is replaced wholesale on rebuild; delta grows
//! by simple appends guarded by a single RW-lock.

use columnstore_concurrency::ShardRwLock;
use columnstore_core::{Error, RecId, Result, ShardId, Value};
use columnstore_durability::{Backend, LogEntry, Logfile};
use columnstore_storage::{build_column, ColumnStorage};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A tombstone bitmap addressed `[0, main_count + delta_len)` (spec §3).
#[derive(Debug, Default)]
pub struct Tombstones {
    bits: Vec<bool>,
}

impl Tombstones {
    fn ensure_len(&mut self, n: usize) {
        if self.bits.len() < n {
            self.bits.resize(n, false);
        }
    }

    /// Mark `recid` deleted. Monotone: never clears a bit except via the
    /// not-yet-committed update revert path (spec §4.C invariants).
    pub fn set(&mut self, recid: RecId) {
        let i = recid as usize;
        self.ensure_len(i + 1);
        self.bits[i] = true;
    }

    /// Revert a tombstone set during an update whose unique check failed.
    pub fn clear(&mut self, recid: RecId) {
        if let Some(b) = self.bits.get_mut(recid as usize) {
            *b = false;
        }
    }

    /// Whether `recid` is tombstoned.
    pub fn is_set(&self, recid: RecId) -> bool {
        self.bits.get(recid as usize).copied().unwrap_or(false)
    }

    /// Count of set tombstones.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    fn snapshot(&self) -> Vec<bool> {
        self.bits.clone()
    }
}

/// The write-optimized row-append area (spec §3 "delta"). Rows share a
/// widening layout: a new column enlarges every existing row by one
/// null-filled slot (spec §4.C invariant: "Delta row width never
/// shrinks").
#[derive(Debug, Default)]
pub struct Delta {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Delta {
    /// Number of rows currently appended.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows have been appended.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column order shared by every delta row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Widen every existing row by one null slot for a newly seen column.
    pub fn widen(&mut self, col: &str) {
        if self.columns.iter().any(|c| c == col) {
            return;
        }
        self.columns.push(col.to_string());
        for row in &mut self.rows {
            row.push(Value::Null);
        }
    }

    /// Append one row, already laid out in `self.columns` order.
    pub fn push(&mut self, row: Vec<Value>) -> usize {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
        self.rows.len() - 1
    }

    /// Read column `col` at delta-relative index `i`.
    pub fn get(&self, i: usize, col: &str) -> Value {
        let pos = self.columns.iter().position(|c| c == col);
        match pos {
            Some(p) => self.rows[i].get(p).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    /// The full row at delta-relative index `i`, in `self.columns` order.
    pub fn row(&self, i: usize) -> &[Value] {
        &self.rows[i]
    }
}

/// Lazily-maintained 1–3 column unique-key point-lookup cache (spec §4.C
/// "Unique enforcement"). Invalidated wholesale on every shard
/// replacement by simply constructing a fresh, empty instance.
#[derive(Debug, Default)]
pub struct UniqueIndex {
    by_key: FxHashMap<Vec<Value>, RecId>,
}

impl UniqueIndex {
    /// Look up a recid by composite key value, if probed before.
    pub fn get(&self, key: &[Value]) -> Option<RecId> {
        self.by_key.get(key).copied()
    }

    /// Record a successful insert/update under this key.
    pub fn insert(&mut self, key: Vec<Value>, recid: RecId) {
        self.by_key.insert(key, recid);
    }

    /// Remove a key (e.g. on delete, or on revert of a failed update).
    pub fn remove(&mut self, key: &[Value]) {
        self.by_key.remove(key);
    }
}

/// Main (compressed) storage: a row count plus one codec per column.
/// Wrapped in its own lock (rather than frozen at construction) because a
/// rebuild's successor is installed as `next` — and so must already be
/// reachable by forwarded concurrent writes — before its main columns
/// exist; `rebuild` fills this in place once the codec pipeline and
/// on-disk write have completed (spec §4.C step 2-3).
struct MainState {
    count: usize,
    columns: FxHashMap<String, ColumnStorage>,
}

/// Main (compressed) storage plus delta, tombstones, and per-shard
/// indexes (spec §3 "Shard").
pub struct Shard {
    id: ShardId,
    main: ShardRwLock<MainState>,
    mutable: ShardRwLock<MutableState>,
    /// Forwarding pointer installed at the start of a rebuild; writes to
    /// this shard are also pushed (idempotently) to `next` until the swap
    /// completes (spec §4.C step 2, §5 "Ordering guarantees").
    next: parking_lot::RwLock<Option<Arc<Shard>>>,
    auto_increment: AtomicU64,
}

struct MutableState {
    delta: Delta,
    tombstones: Tombstones,
    unique: FxHashMap<Vec<u32>, UniqueIndex>,
}

impl Shard {
    /// A brand-new, empty shard (a fresh free shard, or the successor of
    /// a rebuild before its main columns are populated).
    pub fn new_empty() -> Self {
        Shard {
            id: ShardId::new(),
            main: ShardRwLock::new(MainState { count: 0, columns: FxHashMap::default() }),
            mutable: ShardRwLock::new(MutableState {
                delta: Delta::default(),
                tombstones: Tombstones::default(),
                unique: FxHashMap::default(),
            }),
            next: parking_lot::RwLock::new(None),
            auto_increment: AtomicU64::new(1),
        }
    }

    /// Construct a shard with a new identity and an already-encoded main
    /// (no delta, no tombstones): the shape a repartition or rebuild
    /// target starts from once its columns have been streamed through the
    /// codec pipeline and persisted (spec §4.E `Repartition` step 2).
    pub fn from_main(main_count: usize, main: FxHashMap<String, ColumnStorage>) -> Self {
        Shard {
            id: ShardId::new(),
            main: ShardRwLock::new(MainState { count: main_count, columns: main }),
            mutable: ShardRwLock::new(MutableState {
                delta: Delta::default(),
                tombstones: Tombstones::default(),
                unique: FxHashMap::default(),
            }),
            next: parking_lot::RwLock::new(None),
            auto_increment: AtomicU64::new(1),
        }
    }

    /// Stable shard identity (spec §3 "UUID (stable identity + filenames)").
    pub fn id(&self) -> ShardId {
        self.id
    }

    /// Rows materialized in compressed main storage.
    pub fn main_count(&self) -> usize {
        self.main.read().count
    }

    /// `Count()` = main_count + delta_len − tombstones (spec §4.C).
    pub fn count(&self) -> usize {
        let main_count = self.main.read().count;
        let guard = self.mutable.read();
        main_count + guard.delta.len() - guard.tombstones.count()
    }

    /// Next auto-increment value for this shard's owning table counter is
    /// tracked at the table level; shards only expose this for tests and
    /// single-shard tables using their own counter.
    pub fn next_auto_increment(&self) -> u64 {
        self.auto_increment.fetch_add(1, Ordering::Relaxed)
    }

    /// Read column `col` at `recid`, routing transparently to main or
    /// delta (spec §4.C `ColumnReader`, §3 "Row ID (recid)").
    pub fn column_reader(&self, col: &str, recid: RecId) -> Value {
        let main = self.main.read();
        if (recid as usize) < main.count {
            main.columns.get(col).map(|c| c.get(recid as usize)).unwrap_or(Value::Null)
        } else {
            let delta_idx = recid as usize - main.count;
            drop(main);
            let guard = self.mutable.read();
            guard.delta.get(delta_idx, col)
        }
    }

    /// Whether `recid` is currently tombstoned.
    pub fn is_tombstoned(&self, recid: RecId) -> bool {
        self.mutable.read().tombstones.is_set(recid)
    }

    /// Append one batch of rows to delta (spec §4.C `Insert`). `cols` and
    /// `rows` must be row-major with `rows[i].len() == cols.len()`.
    /// Returns the assigned recids. Also forwards the same batch to
    /// `next`, if a rebuild has installed one (spec §5 forwarding).
    pub fn insert(
        &self,
        cols: &[String],
        rows: Vec<Vec<Value>>,
        log: Option<&mut Logfile>,
    ) -> Result<Vec<RecId>> {
        let main_count = self.main_count();
        let recids = {
            let mut guard = self.mutable.write();
            for c in cols {
                guard.delta.widen(c);
            }
            let mut assigned = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut laid_out = vec![Value::Null; guard.delta.columns().len()];
                for (c, v) in cols.iter().zip(row.iter()) {
                    let pos = guard.delta.columns().iter().position(|x| x == c).unwrap();
                    laid_out[pos] = v.clone();
                }
                let i = guard.delta.push(laid_out);
                assigned.push((main_count + i) as RecId);
            }
            assigned
        };

        if let Some(log) = log {
            log.write(&LogEntry::Insert {
                cols: cols.to_vec(),
                rows: rows.clone(),
            })
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        }

        if let Some(next) = self.next.read().as_ref() {
            next.insert(cols, rows, None)?;
        }

        Ok(recids)
    }

    /// Tombstone a row and log the delete (spec §4.C `Delete`).
    pub fn delete(&self, recid: RecId, log: Option<&mut Logfile>) -> Result<()> {
        {
            let mut guard = self.mutable.write();
            guard.tombstones.set(recid);
        }
        if let Some(log) = log {
            log.write(&LogEntry::Delete { recid })
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        }
        if let Some(next) = self.next.read().as_ref() {
            next.delete(recid, None)?;
        }
        Ok(())
    }

    /// Snapshot `delta_len` and a frozen copy of tombstones for a scan
    /// (spec §5 "A scan's delta-visibility is captured as a single
    /// `delta_len` snapshot at scan start").
    pub fn scan_snapshot(&self) -> (usize, Vec<bool>) {
        let guard = self.mutable.read();
        (guard.delta.len(), guard.tombstones.snapshot())
    }

    /// Iterate every live (non-tombstoned) recid visible as of `snapshot`,
    /// yielding `(recid, predicate)` to the caller's closure (spec §4.C
    /// `Scan`). `predicate` decides inclusion; `project` decides the
    /// output. This is the engine's fallback full scan used when no
    /// index/boundary applies.
    pub fn scan<P, Proj, R>(
        &self,
        snapshot: &(usize, Vec<bool>),
        mut predicate: P,
        mut project: Proj,
    ) -> Vec<R>
    where
        P: FnMut(RecId) -> bool,
        Proj: FnMut(RecId) -> R,
    {
        let (delta_len, tombstones) = snapshot;
        let total = self.main_count() + delta_len;
        let mut out = Vec::new();
        for recid in 0..total as RecId {
            if tombstones.get(recid as usize).copied().unwrap_or(false) {
                continue;
            }
            if predicate(recid) {
                out.push(project(recid));
            }
        }
        out
    }

    /// Run `f` with read access to one main column's codec, for the
    /// table's column readers, rebuild's source iteration, and
    /// repartition's per-column streaming. Scoped to a closure rather than
    /// returning a reference because main is now behind its own lock (see
    /// `MainState`).
    pub fn with_main_column<R>(&self, col: &str, f: impl FnOnce(Option<&ColumnStorage>) -> R) -> R {
        let guard = self.main.read();
        f(guard.columns.get(col))
    }

    /// Names of every main column.
    pub fn main_column_names(&self) -> Vec<String> {
        self.main.read().columns.keys().cloned().collect()
    }

    /// 1–3 column unique-key lookup, lazily populated on first probe
    /// (spec §4.C "Unique enforcement").
    pub fn unique_lookup(&self, key_cols: &[u32], key: &[Value]) -> Option<RecId> {
        self.mutable
            .read()
            .unique
            .get(key_cols)
            .and_then(|idx| idx.get(key))
    }

    /// Record a unique key → recid mapping once validated by the caller.
    pub fn unique_record(&self, key_cols: Vec<u32>, key: Vec<Value>, recid: RecId) {
        self.mutable
            .write()
            .unique
            .entry(key_cols)
            .or_default()
            .insert(key, recid);
    }

    /// Install the forwarding pointer to a rebuild successor (spec §4.C
    /// step 2). Idempotent: if already installed, the existing successor
    /// is returned instead.
    pub fn install_next(&self, successor: Arc<Shard>) -> Arc<Shard> {
        let mut guard = self.next.write();
        if let Some(existing) = guard.as_ref() {
            return Arc::clone(existing);
        }
        *guard = Some(Arc::clone(&successor));
        successor
    }

    /// The rebuild successor, if a rebuild is in flight or complete.
    pub fn next(&self) -> Option<Arc<Shard>> {
        self.next.read().clone()
    }

    /// Populate main storage in place once a rebuild's codec pipeline and
    /// on-disk write have finished. Leaves `mutable` (delta/tombstones)
    /// untouched: this shard may already be somebody's `next`, and any
    /// concurrent insert forwarded to it mid-rebuild landed in that delta
    /// and must survive (spec §5 "no row is lost").
    fn install_main(&self, count: usize, columns: FxHashMap<String, ColumnStorage>) {
        let mut guard = self.main.write();
        guard.count = count;
        guard.columns = columns;
    }

    /// Run the rebuild algorithm (spec §4.C "Rebuild algorithm"),
    /// producing a successor shard with a new UUID whose main holds every
    /// surviving row (main ⧵ tombstones ∪ first `L` delta rows) re-encoded
    /// through the codec pipeline, and whose log starts fresh.
    ///
    /// `all_columns` is the table's full column list (including columns
    /// not yet present in this shard's main or delta, which rebuild
    /// fills with nulls).
    pub fn rebuild(self: &Arc<Self>, backend: &dyn Backend, all_columns: &[String]) -> Result<Arc<Shard>> {
        if let Some(existing) = self.next() {
            return Ok(existing);
        }

        // Install the successor as `next` before doing any other work, so
        // every insert/delete concurrent with the rest of this function is
        // forwarded into its delta rather than lost (spec §4.C step 2, §5
        // "rebuild publishes `next` before processing"). Its main is filled
        // in place via `install_main` at the end, which is why `rebuild`
        // returns this same `Arc` rather than a second, disconnected shard.
        let successor = self.install_next(Arc::new(Shard::new_empty()));
        successor.auto_increment.store(self.auto_increment.load(Ordering::Relaxed), Ordering::Relaxed);

        let main_count = self.main.read().count;
        let (delta_len, tombstones) = {
            let guard = self.mutable.read();
            (guard.delta.len(), guard.tombstones.snapshot())
        };

        info!(shard = %self.id, delta_len, "rebuilding shard");

        let mut live_main: Vec<usize> = (0..main_count)
            .filter(|&i| !tombstones.get(i).copied().unwrap_or(false))
            .collect();
        let live_delta: Vec<usize> = (0..delta_len)
            .filter(|&i| !tombstones.get(main_count + i).copied().unwrap_or(false))
            .collect();
        live_main.sort_unstable();

        let new_main_count = live_main.len() + live_delta.len();
        let mut new_main = FxHashMap::default();

        let delta_snapshot = {
            let guard = self.mutable.read();
            live_delta
                .iter()
                .map(|&i| guard.delta.row(i).to_vec())
                .collect::<Vec<_>>()
        };
        let delta_cols = self.mutable.read().delta.columns().to_vec();

        for col in all_columns {
            let mut values = Vec::with_capacity(new_main_count);
            self.with_main_column(col, |codec| {
                if let Some(codec) = codec {
                    for &i in &live_main {
                        values.push(codec.get(i));
                    }
                } else {
                    values.extend(std::iter::repeat(Value::Null).take(live_main.len()));
                }
            });
            let pos = delta_cols.iter().position(|c| c == col);
            for row in &delta_snapshot {
                values.push(pos.map(|p| row[p].clone()).unwrap_or(Value::Null));
            }
            debug!(column = %col, rows = values.len(), "rebuilding column");
            new_main.insert(col.clone(), build_column(&values));
        }

        for col in all_columns {
            let bytes = {
                let c = new_main.get(col).unwrap();
                let mut out = vec![c.magic()];
                out.extend(c.serialize());
                out
            };
            backend.write_column(successor.id, col, &bytes)?;
        }

        successor.install_main(new_main_count, new_main);

        backend.remove_log(self.id)?;
        backend.open_log(successor.id, columnstore_core::PersistencyMode::Logged)?;

        Ok(successor)
    }

    /// Load a shard's main columns and replay its log, producing a
    /// `Shared`-state shard (spec §5 `GetRead`).
    pub fn load(id: ShardId, columns: &[String], backend: &dyn Backend) -> Result<Shard> {
        let mut main = FxHashMap::default();
        let mut main_count = None;
        for col in columns {
            match backend.read_column(id, col) {
                Ok(bytes) if !bytes.is_empty() => {
                    let storage = ColumnStorage::deserialize(bytes[0], &bytes[1..])
                        .map_err(|e| Error::CorruptData(e.to_string()))?;
                    main_count.get_or_insert(storage.len());
                    main.insert(col.clone(), storage);
                }
                _ => {}
            }
        }
        let shard = Shard {
            id,
            main: ShardRwLock::new(MainState { count: main_count.unwrap_or(0), columns: main }),
            mutable: ShardRwLock::new(MutableState {
                delta: Delta::default(),
                tombstones: Tombstones::default(),
                unique: FxHashMap::default(),
            }),
            next: parking_lot::RwLock::new(None),
            auto_increment: AtomicU64::new(1),
        };

        for entry in backend.replay_log(id)? {
            match entry {
                LogEntry::Insert { cols, rows } => {
                    shard.insert(&cols, rows, None)?;
                }
                LogEntry::Delete { recid } => {
                    shard.delete(recid, None)?;
                }
            }
        }
        Ok(shard)
    }
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("id", &self.id)
            .field("main_count", &self.main_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_count_reflects_delta() {
        let shard = Shard::new_empty();
        let recids = shard
            .insert(&["a".into()], vec![vec![Value::Int64(1)], vec![Value::Int64(2)]], None)
            .unwrap();
        assert_eq!(recids, vec![0, 1]);
        assert_eq!(shard.count(), 2);
    }

    #[test]
    fn delete_reduces_count_but_not_delta_len() {
        let shard = Shard::new_empty();
        shard.insert(&["a".into()], vec![vec![Value::Int64(1)], vec![Value::Int64(2)]], None).unwrap();
        shard.delete(0, None).unwrap();
        assert_eq!(shard.count(), 1);
        assert!(shard.is_tombstoned(0));
    }

    #[test]
    fn column_reader_routes_to_delta_when_beyond_main() {
        let shard = Shard::new_empty();
        shard.insert(&["a".into()], vec![vec![Value::Int64(42)]], None).unwrap();
        assert_eq!(shard.column_reader("a", 0), Value::Int64(42));
    }

    #[test]
    fn widening_delta_nulls_existing_rows() {
        let shard = Shard::new_empty();
        shard.insert(&["a".into()], vec![vec![Value::Int64(1)]], None).unwrap();
        shard.insert(&["a".into(), "b".into()], vec![vec![Value::Int64(2), Value::Int64(9)]], None).unwrap();
        assert_eq!(shard.column_reader("b", 0), Value::Null);
        assert_eq!(shard.column_reader("b", 1), Value::Int64(9));
    }

    #[test]
    fn scan_snapshot_excludes_concurrent_inserts() {
        let shard = Shard::new_empty();
        shard.insert(&["a".into()], vec![vec![Value::Int64(1)]], None).unwrap();
        let snap = shard.scan_snapshot();
        shard.insert(&["a".into()], vec![vec![Value::Int64(2)]], None).unwrap();
        let rows = shard.scan(&snap, |_| true, |r| r);
        assert_eq!(rows, vec![0]);
    }
}
