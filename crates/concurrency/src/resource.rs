//! The `SharedResource` contract (spec §5 "Shared-resource protocol"):
//! every lazy object is one of `Cold` (not loaded), `Shared` (loaded,
//! read-only materialization), or `Write` (exclusively materialized for
//! mutation). `GetRead` loads Cold → Shared; `GetExclusive` loads either
//! state → Write. Memory-mode shards stay `Write` permanently to bypass
//! the cache manager's eviction (spec §5).

use columnstore_core::ResourceState;
use parking_lot::RwLock;

/// A lazily-materialized value guarded by the Cold/Shared/Write state
/// machine. `T` is the materialized form (e.g. a shard's column set);
/// `loader` produces it from cold storage on first access.
pub struct SharedResource<T> {
    inner: RwLock<Inner<T>>,
}

struct Inner<T> {
    state: ResourceState,
    value: Option<T>,
}

impl<T> SharedResource<T> {
    /// A resource that starts `Cold` with nothing materialized.
    pub fn new_cold() -> Self {
        SharedResource {
            inner: RwLock::new(Inner {
                state: ResourceState::Cold,
                value: None,
            }),
        }
    }

    /// A resource that is already materialized and pinned `Write`
    /// (memory-persistency shards, spec §5: "remain Write permanently").
    pub fn new_pinned(value: T) -> Self {
        SharedResource {
            inner: RwLock::new(Inner {
                state: ResourceState::Write,
                value: Some(value),
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ResourceState {
        self.inner.read().state
    }

    /// Materialize for read access, running `load` if currently `Cold`.
    /// A resource already `Shared` or `Write` is left alone — read access
    /// never downgrades an exclusive materialization.
    pub fn get_read<F, E>(&self, load: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        {
            let guard = self.inner.read();
            if guard.state != ResourceState::Cold {
                return Ok(());
            }
        }
        let mut guard = self.inner.write();
        if guard.state == ResourceState::Cold {
            guard.value = Some(load()?);
            guard.state = ResourceState::Shared;
        }
        Ok(())
    }

    /// Materialize for exclusive (write) access, loading from cold
    /// storage if necessary. Pinned (memory-mode) resources are already
    /// `Write` and this is a no-op.
    pub fn get_exclusive<F, E>(&self, load: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let mut guard = self.inner.write();
        if guard.state == ResourceState::Write {
            return Ok(());
        }
        if guard.value.is_none() {
            guard.value = Some(load()?);
        }
        guard.state = ResourceState::Write;
        Ok(())
    }

    /// Run `f` over the materialized value. Panics if called before a
    /// `get_read`/`get_exclusive` has materialized it — callers always go
    /// through one of those first.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read();
        f(guard.value.as_ref().expect("SharedResource accessed before materialization"))
    }

    /// Run `f` over the materialized value with exclusive access.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write();
        f(guard.value.as_mut().expect("SharedResource accessed before materialization"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cold_resource_loads_on_first_read() {
        let r: SharedResource<i32> = SharedResource::new_cold();
        assert_eq!(r.state(), ResourceState::Cold);
        r.get_read(|| Ok::<_, ()>(42)).unwrap();
        assert_eq!(r.state(), ResourceState::Shared);
        assert_eq!(r.with(|v| *v), 42);
    }

    #[test]
    fn second_get_read_does_not_reload() {
        let r: SharedResource<i32> = SharedResource::new_cold();
        r.get_read(|| Ok::<_, ()>(1)).unwrap();
        r.get_read(|| -> Result<i32, ()> { panic!("should not reload") }).unwrap();
        assert_eq!(r.with(|v| *v), 1);
    }

    #[test]
    fn pinned_resource_stays_write() {
        let r = SharedResource::new_pinned(7);
        assert_eq!(r.state(), ResourceState::Write);
        r.get_read(|| -> Result<i32, ()> { panic!("pinned resources never reload") })
            .unwrap();
        assert_eq!(r.state(), ResourceState::Write);
    }

    #[test]
    fn exclusive_materializes_and_mutates() {
        let r: SharedResource<i32> = SharedResource::new_cold();
        r.get_exclusive(|| Ok::<_, ()>(10)).unwrap();
        assert_eq!(r.state(), ResourceState::Write);
        r.with_mut(|v| *v += 1);
        assert_eq!(r.with(|v| *v), 11);
    }
}
