//! Scenario 2 (spec §8): a unique violation in the middle of a batch is
//! routed to its own error without aborting the rows before or after it.

use columnstore_core::{ColumnDescriptor, LogicalType, PersistencyMode, UniqueKey, Value};
use columnstore_engine::{OnCollision, Table};

fn row(id: i64, name: &str) -> Vec<Value> {
    vec![Value::Int64(id), Value::String(name.into())]
}

#[test]
fn unique_violation_is_routed_without_aborting_the_batch() {
    let table = Table::new(
        "users",
        vec![
            ColumnDescriptor::new("id", LogicalType::Int),
            ColumnDescriptor::new("name", LogicalType::Varchar),
        ],
        PersistencyMode::Memory,
    );
    table.add_unique_key(UniqueKey { id: 1, columns: vec!["id".into()] });

    table
        .insert(vec!["id".into(), "name".into()], vec![row(1, "a"), row(2, "b")], OnCollision::Fail)
        .unwrap();

    // A single batch whose middle row (`id=1`) collides with an already
    // committed row; the first and third rows of the batch should still
    // land, with the collision surfaced as one error for the whole call.
    let batch = table.insert(
        vec!["id".into(), "name".into()],
        vec![row(3, "c"), row(1, "d"), row(4, "e")],
        OnCollision::Fail,
    );
    assert!(batch.is_err());
    assert!(batch.unwrap_err().is_unique_violation());

    let mut rows: Vec<(i64, String)> = table
        .scan(
            |_, _| true,
            |r, shard| {
                let Value::Int64(id) = shard.column_reader("id", r) else { unreachable!() };
                let Value::String(name) = shard.column_reader("name", r) else { unreachable!() };
                (id, name)
            },
            None,
            0,
        )
        .unwrap();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            (1, "a".to_string()),
            (2, "b".to_string()),
            (3, "c".to_string()),
            (4, "e".to_string()),
        ]
    );
}
