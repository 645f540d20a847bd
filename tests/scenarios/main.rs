//! Cross-layer scenario tests from spec §8, run against the public
//! `columnstore` facade plus the path-dependency crates a query-planner
//! layer would also need direct access to (storage codecs, the
//! durability backend) for anything the facade doesn't expose.

#[path = "common.rs"]
mod common;

mod adaptive_compression;
mod eviction;
mod rebuild_concurrent;
mod repartition_stability;
mod seq_codec;
mod unique_violation;
