//! The codec pipeline orchestrator (spec §4.B): every column starts as a
//! `Reference` codec, which proposes a specialization; that specialization
//! may itself propose one more hop (e.g. `Sparse` wrapping `StringDict`),
//! bounded at 3 hops total so the chain always terminates.

use super::storage::ColumnStorage;
use columnstore_core::Value;

const MAX_CHAIN_HOPS: usize = 3;

/// Run a column through `prepare → scan·n → propose_compression → init →
/// build·n → finish`, following proposed specializations up to
/// `MAX_CHAIN_HOPS` deep.
pub fn build_column(values: &[Value]) -> ColumnStorage {
    let mut storage = ColumnStorage::new_reference();
    storage.prepare();
    for (i, v) in values.iter().enumerate() {
        storage.scan(i, v);
    }

    let mut chosen = storage;
    for _ in 0..MAX_CHAIN_HOPS {
        match chosen.propose_compression(values.len()) {
            Some(mut next) => {
                next.prepare();
                for (i, v) in values.iter().enumerate() {
                    next.scan(i, v);
                }
                chosen = next;
            }
            None => break,
        }
    }

    chosen.init(values.len());
    for (i, v) in values.iter().enumerate() {
        chosen.build(i, v);
    }
    chosen.finish();
    chosen
}
