//! Multi-dimensional pivot-based partitioning (spec §4.E).

use columnstore_core::Value;

/// One dimension of a partitioned table's shard grid: a column, its part
/// count, and the sorted, strictly-increasing, de-duplicated pivots that
/// separate its parts (spec §3 "Partitioning dimensions", §4.E
/// "ShardDimension").
#[derive(Debug, Clone)]
pub struct ShardDimension {
    /// Column this dimension bisects on.
    pub column: String,
    /// Sorted pivots of length `num_parts - 1` (after de-duplication,
    /// `num_parts` may be smaller than originally requested).
    pub pivots: Vec<Value>,
}

impl ShardDimension {
    /// Effective number of parts after pivot de-duplication.
    pub fn num_parts(&self) -> usize {
        self.pivots.len() + 1
    }

    /// `bisect(pivots, value)`: the index of the part `value` falls into.
    pub fn index_of(&self, value: &Value) -> usize {
        match self.pivots.binary_search(value) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }

    /// Inclusive `[lo, hi]` part-index range that could hold a value in
    /// `[lower, upper]` (either end unbounded when `None`); used to prune
    /// shards for a boundary-restricted scan (spec §4.D "boundary-pruned",
    /// §8 property 8 — the range must never exclude a matching part).
    pub fn range_of(&self, lower: Option<&Value>, upper: Option<&Value>) -> (usize, usize) {
        let lo = lower.map(|v| self.index_of(v)).unwrap_or(0);
        let hi = upper.map(|v| self.index_of(v)).unwrap_or(self.num_parts() - 1);
        (lo, hi)
    }

    /// Choose pivots from pre-sorted samples: pivot `i` is
    /// `samples_sorted[floor(i * n / num_parts)]`, duplicates discarded
    /// (spec §4.E "Pivots are chosen from samples").
    pub fn from_samples(column: String, mut samples: Vec<Value>, num_parts: usize) -> Self {
        samples.sort();
        let n = samples.len();
        let mut pivots = Vec::new();
        if num_parts > 1 && n > 0 {
            for i in 1..num_parts {
                let idx = (i * n) / num_parts;
                let idx = idx.min(n - 1);
                let candidate = samples[idx].clone();
                if pivots.last() != Some(&candidate) {
                    pivots.push(candidate);
                }
            }
        }
        ShardDimension { column, pivots }
    }
}

/// Sample a column's main storage: first row, last row, and every 101st
/// row (spec §4.E "Samples are chosen from ... every 101st row").
pub fn sample_column(values: &[Value]) -> Vec<Value> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut out = vec![values[0].clone()];
    let mut i = 100;
    while i < values.len() {
        out.push(values[i].clone());
        i += 101;
    }
    let last = values.len() - 1;
    if last != 0 {
        out.push(values[last].clone());
    }
    out
}

/// `compute_index(dims, row)` = Σ_i idx_i · Π_{j>i} nparts_j (spec §3
/// "Shard index").
pub fn compute_index(dims: &[ShardDimension], row: &[Value]) -> usize {
    let mut index = 0usize;
    for (i, dim) in dims.iter().enumerate() {
        let idx_i = dim.index_of(&row[i]);
        let trailing: usize = dims[i + 1..].iter().map(|d| d.num_parts()).product();
        index += idx_i * trailing;
    }
    index
}

/// Total shard count for a dimension set: Π num_parts.
pub fn total_shards(dims: &[ShardDimension]) -> usize {
    dims.iter().map(|d| d.num_parts()).product::<usize>().max(1)
}

/// `ProposeRepartition` (spec §4.E): given per-column `(name, score)`
/// pairs sorted by score descending, a row count, and a target shard
/// size, propose a dimension set whose sizes are close to the desired
/// total `D = ceil(row_count / shard_size) + 1`.
///
/// Dimensions collapsing to `num_parts <= 1` are dropped. Returns an
/// empty vec if no column has a nonzero score.
pub fn propose_dimensions(
    scored_columns: &[(String, u64)],
    row_count: usize,
    shard_size: usize,
    max_dimensions: usize,
    sample_fn: impl Fn(&str) -> Vec<Value>,
) -> Vec<ShardDimension> {
    let candidates: Vec<&(String, u64)> = scored_columns
        .iter()
        .filter(|(_, score)| *score > 0)
        .take(max_dimensions)
        .collect();
    if candidates.is_empty() {
        return Vec::new();
    }

    let desired_total = (row_count as f64 / shard_size as f64).ceil() as usize + 1;

    // 30 iterations of geometric search for a scale factor s such that
    // Π floor(score_i * s) ≈ desired_total (spec §4.E).
    let mut lo = 0.0f64;
    let mut hi = 1.0f64;
    let estimate = |s: f64| -> usize {
        candidates
            .iter()
            .map(|(_, score)| ((*score as f64) * s).floor().max(1.0) as usize)
            .product::<usize>()
            .max(1)
    };
    while estimate(hi) < desired_total {
        hi *= 2.0;
        if hi > 1e12 {
            break;
        }
    }
    let mut s = hi;
    for _ in 0..30 {
        let mid = (lo + hi) / 2.0;
        if estimate(mid) < desired_total {
            lo = mid;
        } else {
            hi = mid;
        }
        s = mid;
    }

    let mut dims = Vec::new();
    for (col, score) in &candidates {
        let parts = ((*score as f64) * s).floor().max(1.0) as usize;
        if parts <= 1 {
            continue;
        }
        let samples = sample_fn(col);
        let dim = ShardDimension::from_samples(col.clone(), samples, parts);
        if dim.num_parts() > 1 {
            dims.push(dim);
        }
    }
    dims
}

/// Whether the dimension set should change (spec §4.E "Should-change"):
/// the column set differs, or the estimated shard count deviates more
/// than 50% from the current count.
pub fn should_repartition(current: &[ShardDimension], proposed: &[ShardDimension]) -> bool {
    let current_cols: Vec<&str> = current.iter().map(|d| d.column.as_str()).collect();
    let proposed_cols: Vec<&str> = proposed.iter().map(|d| d.column.as_str()).collect();
    if current_cols != proposed_cols {
        return true;
    }
    let current_total = total_shards(current) as f64;
    let proposed_total = total_shards(proposed) as f64;
    if current_total == 0.0 {
        return proposed_total > 0.0;
    }
    ((proposed_total - current_total).abs() / current_total) > 0.5
}
