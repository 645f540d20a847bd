//! Concurrency primitives for the column store (spec §5).
//!
//! This crate owns two things: the `SharedResource` Cold/Shared/Write
//! lifecycle every lazily-materialized shard/index goes through, and the
//! lock wrappers that encode the leaf-to-root acquisition order so
//! `columnstore-engine` never has to re-derive it. Transaction
//! coordination itself is out of scope (spec §1) — this crate exposes
//! only the hooks a transaction manager would need, via
//! `columnstore_core::traits`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(missing_docs)]

pub mod locks;
pub mod resource;

pub use locks::{SchemaLock, ShardRwLock, TableLock, UniqueLock};
pub use resource::SharedResource;
