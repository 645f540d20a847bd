//! An in-memory, persistent, columnar table store with a delta/main
//! two-tier shard design, adaptive per-column compression, horizontal
//! partitioning with online repartitioning, and a memory-pressure-driven
//! cache manager.
//!
//! This crate re-exports [`columnstore_api`] as the published surface; the
//! workspace is laid out in layers (`columnstore-core` → `columnstore-storage`
//! / `columnstore-concurrency` / `columnstore-durability` → `columnstore-engine`
//! → `columnstore-api`) and this crate is the thin top of that stack.
//! Integration tests under `tests/` exercise the layers together: adaptive
//! compression choice, unique-violation routing, repartition stability,
//! two-budget eviction, and rebuild-under-concurrent-insert.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use columnstore_api::*;
