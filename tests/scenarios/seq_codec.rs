//! Scenario 6 (spec §8): arithmetic runs broken by a null gap should
//! select the `Seq` codec and round-trip every value, including the
//! nulls in the middle run.

use crate::common::temp_backend;
use columnstore_core::{ColumnDescriptor, LogicalType, PersistencyMode, Value};
use columnstore_engine::{OnCollision, Table};

fn v(i: i64) -> Value {
    Value::Int64(i)
}

#[test]
fn mixed_null_runs_round_trip_after_rebuild() {
    let table = Table::new(
        "seq",
        vec![ColumnDescriptor::new("n", LogicalType::Int)],
        PersistencyMode::Memory,
    );
    let input = vec![
        v(1),
        v(2),
        v(3),
        v(4),
        Value::Null,
        Value::Null,
        v(10),
        v(20),
        v(30),
    ];
    let rows: Vec<Vec<Value>> = input.iter().cloned().map(|x| vec![x]).collect();
    table.insert(vec!["n".into()], rows, OnCollision::Fail).unwrap();

    let (_dir, backend) = temp_backend();
    table.rebuild_all(backend.as_ref(), true, |_, _| {}).unwrap();

    let out: Vec<Value> = table.scan(|_, _| true, |r, shard| shard.column_reader("n", r), None, 0).unwrap();
    assert_eq!(out, input);
}
