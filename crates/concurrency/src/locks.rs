//! Lock wrappers and the leaf-to-root acquisition order from spec §5:
//!
//! 1. Shard RW-lock (`shard.mu`) — guards delta, tombstones, index deltas.
//! 2. Shard unique-lock (`shard.uniquelock`) — serializes
//!    unique-check-then-insert; held briefly.
//! 3. Table mutex (`table.mu`) — schema and shard-list mutation.
//! 4. Database schema-lock (`database.schemalock`) — DDL.
//! 5. Cache manager operator channel — effectively a single-threaded
//!    actor, acquired last (it never calls back into 1-4).
//!
//! Callers must acquire in this order and release in reverse to avoid
//! deadlock; nothing here enforces that automatically, it is a calling
//! convention documented once and followed by `columnstore-engine`.

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Guards a shard's delta buffer and tombstone bitmap (spec §4.C
/// "Concurrency within a shard"). Readers take the read lock only to
/// snapshot `delta_len` and copy tombstones; decode itself is lock-free.
#[derive(Default)]
pub struct ShardRwLock<T> {
    inner: RwLock<T>,
}

impl<T> ShardRwLock<T> {
    pub fn new(value: T) -> Self {
        ShardRwLock { inner: RwLock::new(value) }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write()
    }
}

/// Serializes unique-check-then-insert within a shard (spec §4.C "Unique
/// enforcement"). Held briefly: acquire, probe + insert, release.
#[derive(Default)]
pub struct UniqueLock {
    inner: Mutex<()>,
}

impl UniqueLock {
    pub fn new() -> Self {
        UniqueLock::default()
    }

    /// Run `f` with the unique-check lock held.
    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        f()
    }
}

/// A table's schema/shard-list mutex (spec §5, level 3).
#[derive(Default)]
pub struct TableLock {
    inner: Mutex<()>,
}

impl TableLock {
    pub fn new() -> Self {
        TableLock::default()
    }

    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        f()
    }
}

/// A database's DDL lock (spec §5, level 4).
#[derive(Default)]
pub struct SchemaLock {
    inner: Mutex<()>,
}

impl SchemaLock {
    pub fn new() -> Self {
        SchemaLock::default()
    }

    pub fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_rw_lock_read_write() {
        let lock = ShardRwLock::new(vec![1, 2, 3]);
        assert_eq!(lock.read().len(), 3);
        lock.write().push(4);
        assert_eq!(lock.read().len(), 4);
    }

    #[test]
    fn unique_lock_serializes() {
        let lock = UniqueLock::new();
        let result = lock.with_lock(|| 5);
        assert_eq!(result, 5);
    }
}
