//! Opaque predicate/projection callables and a small scan-request builder.
//!
//! SQL parsing, query planning, and expression evaluation are explicitly
//! out of scope for the core (spec §1): "the core receives already-compiled
//! predicates and projection callables as opaque functions." This module
//! names the shape those callables take — `Predicate`, `Projection` — and
//! bundles them with the boundaries/limit/offset `Table::scan_with_boundaries`
//! needs into a `Query`, so a query planner has one call to make per scan
//! instead of threading five parameters through.

use columnstore_core::{Boundary, RecId, Result};
use columnstore_engine::{Shard, Table};

/// An already-compiled row filter: true admits the row, false skips it.
/// Evaluated once per candidate recid during a scan (spec §4.C `Scan`,
/// §4.D `Scan(predicate, ...)`).
pub type Predicate<'a> = dyn Fn(RecId, &Shard) -> bool + Sync + 'a;

/// An already-compiled row projection: assembles one output value of type
/// `R` from one matching recid, the counterpart to `Predicate` (spec §4.D
/// `Scan(..., projection, ...)`).
pub type Projection<'a, R> = dyn Fn(RecId, &Shard) -> R + Sync + 'a;

/// A fully-specified scan request against one table.
///
/// `sort_keys` and `outer` from spec §4.D's `Scan` signature are left to
/// the caller: sorting is `Table::merge_sorted_runs` applied to `R` after
/// `run` returns (it needs a sort key extracted from `R`, which only the
/// planner knows how to do), and `outer`/aggregation is the caller's
/// associative reducer over the same output.
pub struct Query<'a, R> {
    boundaries: Vec<Boundary>,
    predicate: &'a Predicate<'a>,
    projection: &'a Projection<'a, R>,
    limit: Option<usize>,
    offset: usize,
}

impl<'a, R: Send> Query<'a, R> {
    /// A query over every shard, with no limit and a zero offset.
    pub fn new(predicate: &'a Predicate<'a>, projection: &'a Projection<'a, R>) -> Self {
        Query { boundaries: Vec::new(), predicate, projection, limit: None, offset: 0 }
    }

    /// Restrict the scan to shards whose partition range can satisfy
    /// `boundaries` (spec §4.D "boundary-pruned when partitioned").
    /// Boundaries naming a non-partition column are harmless no-ops.
    pub fn with_boundaries(mut self, boundaries: Vec<Boundary>) -> Self {
        self.boundaries = boundaries;
        self
    }

    /// Cap the number of rows returned.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` matching rows.
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Execute against `table` (spec §4.D `Scan`): fans out to the pruned
    /// shard set in parallel, applies `predicate` then `projection` to
    /// every matching recid, and truncates to `offset + limit`.
    pub fn run(&self, table: &Table) -> Result<Vec<R>> {
        table.scan_with_boundaries(&self.boundaries, self.predicate, self.projection, self.limit, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use columnstore_core::{ColumnDescriptor, LogicalType, PersistencyMode, Value};
    use columnstore_engine::OnCollision;

    #[test]
    fn query_runs_predicate_and_projection_over_a_table() {
        let table = Table::new(
            "t",
            vec![ColumnDescriptor::new("id", LogicalType::Int)],
            PersistencyMode::Memory,
        );
        table
            .insert(
                vec!["id".into()],
                vec![vec![Value::Int64(1)], vec![Value::Int64(2)], vec![Value::Int64(3)]],
                OnCollision::Fail,
            )
            .unwrap();

        let predicate: &Predicate = &|recid, shard| matches!(shard.column_reader("id", recid), Value::Int64(v) if v >= 2);
        let projection: &Projection<Value> = &|recid, shard| shard.column_reader("id", recid);
        let mut out = Query::new(predicate, projection).run(&table).unwrap();
        out.sort();
        assert_eq!(out, vec![Value::Int64(2), Value::Int64(3)]);
    }

    #[test]
    fn query_respects_limit() {
        let table = Table::new(
            "t",
            vec![ColumnDescriptor::new("id", LogicalType::Int)],
            PersistencyMode::Memory,
        );
        table
            .insert(vec!["id".into()], (0..10).map(|i| vec![Value::Int64(i)]).collect(), OnCollision::Fail)
            .unwrap();

        let predicate: &Predicate = &|_, _| true;
        let projection: &Projection<Value> = &|recid, shard| shard.column_reader("id", recid);
        let out = Query::new(predicate, projection).with_limit(3).run(&table).unwrap();
        assert_eq!(out.len(), 3);
    }
}
