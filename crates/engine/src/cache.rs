//! Memory-pressure-driven cache/eviction manager (spec §4.F).
//!
//! Ownership is split like `BackgroundScheduler` (see `background.rs`):
//! operations are submitted to a single-threaded operator loop over a
//! bounded queue and acknowledged via a completion channel, so every
//! mutating op, budget check, and eviction pass is linearized without a
//! shared lock on the item table itself.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Evictable item kinds and their protection factors (spec §4.F "State").
/// `eviction_score = size / factor`; higher factor ⇒ lower score ⇒ evicted
/// later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictableType {
    /// A materialized temporary column (e.g. an index or computed cache).
    TempColumn,
    /// A loaded shard's main storage.
    Shard,
    /// A secondary index structure.
    Index,
    /// A temporary keytable (name starts with `.`).
    TempKeytable,
}

impl EvictableType {
    /// Protection factor: larger values resist eviction longer.
    pub fn protection_factor(self) -> u64 {
        match self {
            EvictableType::TempColumn => 1,
            EvictableType::Shard => 5,
            EvictableType::Index => 25,
            EvictableType::TempKeytable => 100,
        }
    }

    /// Whether this type counts against `persisted_budget`.
    pub fn is_persisted(self) -> bool {
        matches!(self, EvictableType::Shard | EvictableType::Index)
    }
}

/// A unique handle for a registered cache item.
pub type ItemId = u64;

/// Per-item bookkeeping the cache manager maintains (spec §4.F "State").
struct Item {
    kind: EvictableType,
    size: u64,
    last_used: Instant,
    telemetry: f64,
    /// `(item_id) -> (freed_ok)`. The callback may recursively remove other
    /// items via the bookkeeping-only path.
    cleanup: Box<dyn Fn(ItemId) -> bool + Send + Sync>,
}

impl Item {
    fn eviction_score(&self) -> f64 {
        self.size as f64 / self.kind.protection_factor() as f64
    }

    fn dynamic_score(&self, now: Instant) -> f64 {
        now.duration_since(self.last_used).as_secs_f64() - self.telemetry * 1000.0
    }
}

/// Snapshot of budget usage, returned by `Stat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Sum of every registered item's size.
    pub total_usage: u64,
    /// Sum of `Shard` + `Index` item sizes.
    pub persisted_usage: u64,
    /// Number of registered items.
    pub item_count: usize,
}

enum Op {
    Add {
        kind: EvictableType,
        size: u64,
        telemetry: f64,
        cleanup: Box<dyn Fn(ItemId) -> bool + Send + Sync>,
        reply: mpsc::Sender<ItemId>,
    },
    Remove {
        id: ItemId,
        reply: mpsc::Sender<()>,
    },
    UpdateSize {
        id: ItemId,
        size: u64,
        reply: mpsc::Sender<()>,
    },
    Touch {
        id: ItemId,
        reply: mpsc::Sender<()>,
    },
    SetBudgets {
        memory_budget: u64,
        persisted_budget: u64,
        reply: mpsc::Sender<()>,
    },
    PressureCheck {
        additional_size: u64,
        reply: mpsc::Sender<()>,
    },
    Stat {
        reply: mpsc::Sender<CacheStats>,
    },
}

struct Worker {
    items: HashMap<ItemId, Item>,
    next_id: u64,
    memory_budget: u64,
    persisted_budget: u64,
}

impl Worker {
    fn new(memory_budget: u64, persisted_budget: u64) -> Self {
        Worker { items: HashMap::new(), next_id: 1, memory_budget, persisted_budget }
    }

    fn usage(&self, filter: Option<fn(EvictableType) -> bool>) -> u64 {
        self.items
            .values()
            .filter(|i| filter.map(|f| f(i.kind)).unwrap_or(true))
            .map(|i| i.size)
            .sum()
    }

    /// Two-phase eviction (spec §4.F "Two-phase eviction").
    fn evict_to_budget(&mut self, budget: u64, additional_size: u64, filter: Option<fn(EvictableType) -> bool>) {
        let current = self.usage(filter);
        if current + additional_size <= budget {
            return;
        }
        let need = current + additional_size - budget;
        let free_target = need as f64 + budget as f64 * 0.25;
        let candidate_target = 2.0 * free_target;

        #[derive(Clone, Copy)]
        struct Candidate {
            id: ItemId,
            score: f64,
            size: u64,
        }
        impl PartialEq for Candidate {
            fn eq(&self, other: &Self) -> bool {
                self.score == other.score
            }
        }
        impl Eq for Candidate {}
        impl PartialOrd for Candidate {
            fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
                self.score.partial_cmp(&other.score)
            }
        }
        impl Ord for Candidate {
            fn cmp(&self, other: &Self) -> CmpOrdering {
                self.partial_cmp(other).unwrap_or(CmpOrdering::Equal)
            }
        }

        // Phase 1: max-heap pop by eviction_score until candidate size
        // reaches candidate_target. Items failing the filter are set aside
        // and re-pushed, never considered for eviction in this pass.
        let mut heap: BinaryHeap<Candidate> = self
            .items
            .iter()
            .filter(|(_, item)| filter.map(|f| f(item.kind)).unwrap_or(true))
            .map(|(&id, item)| Candidate { id, score: item.eviction_score(), size: item.size })
            .collect();

        let mut candidates = Vec::new();
        let mut candidate_size = 0.0;
        while candidate_size < candidate_target {
            let Some(top) = heap.pop() else { break };
            candidate_size += top.size as f64;
            candidates.push(top.id);
        }

        if candidates.is_empty() {
            warn!("cache eviction found no candidates under current budget filter");
            return;
        }

        // Phase 2: dynamic_score = age_in_seconds - telemetry*1000, sort
        // desc, evict the worst 50% (at least 1); survivors return to the
        // live set untouched.
        let now = Instant::now();
        let mut scored: Vec<(ItemId, f64)> = candidates
            .into_iter()
            .filter_map(|id| self.items.get(&id).map(|item| (id, item.dynamic_score(now))))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal));

        let evict_count = (scored.len() / 2).max(1).min(scored.len());
        for &(id, _) in &scored[..evict_count] {
            self.remove_bookkeeping_only(id);
        }
        debug!(evicted = evict_count, candidates = scored.len(), "cache eviction pass complete");
    }

    /// Bookkeeping-only removal: invokes the item's cleanup callback and
    /// drops its accounting entry, but never re-enters the operator loop
    /// (spec §4.F "Re-entrancy rule").
    fn remove_bookkeeping_only(&mut self, id: ItemId) -> bool {
        if let Some(item) = self.items.remove(&id) {
            let freed = (item.cleanup)(id);
            if !freed {
                warn!(item = id, "cleanup callback could not acquire locks, item dropped from accounting anyway");
            }
            true
        } else {
            false
        }
    }

    fn run_budget_checks(&mut self) {
        self.evict_to_budget(self.persisted_budget, 0, Some(EvictableType::is_persisted));
        self.evict_to_budget(self.memory_budget, 0, None);
    }

    fn handle(&mut self, op: Op) {
        match op {
            Op::Add { kind, size, telemetry, cleanup, reply } => {
                let id = self.next_id;
                self.next_id += 1;
                self.items.insert(
                    id,
                    Item { kind, size, last_used: Instant::now(), telemetry, cleanup },
                );
                self.run_budget_checks();
                let _ = reply.send(id);
            }
            Op::Remove { id, reply } => {
                self.remove_bookkeeping_only(id);
                let _ = reply.send(());
            }
            Op::UpdateSize { id, size, reply } => {
                if let Some(item) = self.items.get_mut(&id) {
                    item.size = size;
                }
                self.run_budget_checks();
                let _ = reply.send(());
            }
            Op::Touch { id, reply } => {
                if let Some(item) = self.items.get_mut(&id) {
                    item.last_used = Instant::now();
                }
                let _ = reply.send(());
            }
            Op::SetBudgets { memory_budget, persisted_budget, reply } => {
                self.memory_budget = memory_budget;
                self.persisted_budget = persisted_budget;
                self.run_budget_checks();
                let _ = reply.send(());
            }
            Op::PressureCheck { additional_size, reply } => {
                self.evict_to_budget(self.persisted_budget, 0, Some(EvictableType::is_persisted));
                self.evict_to_budget(self.memory_budget, additional_size, None);
                let _ = reply.send(());
            }
            Op::Stat { reply } => {
                let stats = CacheStats {
                    total_usage: self.usage(None),
                    persisted_usage: self.usage(Some(EvictableType::is_persisted)),
                    item_count: self.items.len(),
                };
                let _ = reply.send(stats);
            }
        }
    }
}

struct Inner {
    queue: Mutex<std::collections::VecDeque<Op>>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

/// A handle to the cache manager's single-threaded operator loop (spec
/// §4.F "Single-threaded operator loop"). All public methods submit a
/// message and block on its completion channel.
pub struct CacheManager {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CacheManager {
    /// Start the operator loop with the given budgets.
    pub fn new(memory_budget: u64, persisted_budget: u64) -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(std::collections::VecDeque::new()),
            work_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });
        let worker_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("columnstore-cache".into())
            .spawn(move || operator_loop(worker_inner, memory_budget, persisted_budget))
            .expect("failed to spawn cache operator thread");
        info!(memory_budget, persisted_budget, "cache manager started");
        CacheManager { inner, handle: Mutex::new(Some(handle)) }
    }

    fn submit<T, F: FnOnce(mpsc::Sender<T>) -> Op>(&self, make_op: F) -> T {
        let (tx, rx) = mpsc::channel();
        let op = make_op(tx);
        {
            let mut queue = self.inner.queue.lock();
            queue.push_back(op);
        }
        self.inner.work_ready.notify_one();
        rx.recv().expect("cache operator loop stopped unexpectedly")
    }

    /// Register an item (spec §4.F "add"). Triggers budget checks.
    pub fn add(&self, kind: EvictableType, size: u64, telemetry: f64, cleanup: impl Fn(ItemId) -> bool + Send + Sync + 'static) -> ItemId {
        self.submit(|reply| Op::Add { kind, size, telemetry, cleanup: Box::new(cleanup), reply })
    }

    /// Explicitly drop an item (the public `Remove`; never call this from
    /// inside a cleanup callback — spec §4.F "Re-entrancy rule").
    pub fn remove(&self, id: ItemId) {
        self.submit(|reply| Op::Remove { id, reply })
    }

    /// Update a tracked item's size, e.g. after a shard rebuild changes its
    /// footprint.
    pub fn update_size(&self, id: ItemId, size: u64) {
        self.submit(|reply| Op::UpdateSize { id, size, reply })
    }

    /// Refresh an item's last-used clock.
    pub fn touch(&self, id: ItemId) {
        self.submit(|reply| Op::Touch { id, reply })
    }

    /// Change both budgets, re-running eviction immediately.
    pub fn set_budgets(&self, memory_budget: u64, persisted_budget: u64) {
        self.submit(|reply| Op::SetBudgets { memory_budget, persisted_budget, reply })
    }

    /// Run persisted-then-total budget checks for a pending allocation of
    /// `additional_size` bytes without registering anything.
    pub fn pressure_check(&self, additional_size: u64) {
        self.submit(|reply| Op::PressureCheck { additional_size, reply })
    }

    /// Snapshot current usage.
    pub fn stat(&self) -> CacheStats {
        self.submit(|reply| Op::Stat { reply })
    }

    /// Stop the operator thread, joining it.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.work_ready.notify_all();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn operator_loop(inner: Arc<Inner>, memory_budget: u64, persisted_budget: u64) {
    let mut worker = Worker::new(memory_budget, persisted_budget);
    loop {
        let op = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(op) = queue.pop_front() {
                    break Some(op);
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    break None;
                }
                inner.work_ready.wait_for(&mut queue, Duration::from_millis(200));
                if inner.shutdown.load(Ordering::Acquire) && queue.is_empty() {
                    break None;
                }
            }
        };
        match op {
            Some(op) => worker.handle(op),
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn add_then_stat_reflects_usage() {
        let cache = CacheManager::new(1_000_000, 1_000_000);
        let id = cache.add(EvictableType::Shard, 100, 0.0, |_| true);
        let stats = cache.stat();
        assert_eq!(stats.total_usage, 100);
        assert_eq!(stats.persisted_usage, 100);
        cache.remove(id);
        let stats = cache.stat();
        assert_eq!(stats.total_usage, 0);
        cache.shutdown();
    }

    #[test]
    fn pressure_evicts_low_protection_items_first() {
        let cache = CacheManager::new(150, 150);
        let evicted = Arc::new(AtomicUsize::new(0));

        let e1 = Arc::clone(&evicted);
        cache.add(EvictableType::TempColumn, 100, 0.0, move |_| {
            e1.fetch_add(1, Ordering::Relaxed);
            true
        });
        let e2 = Arc::clone(&evicted);
        cache.add(EvictableType::Index, 100, 0.0, move |_| {
            e2.fetch_add(1, Ordering::Relaxed);
            true
        });

        // Adding the second item pushed usage to 200 > 150 budget; eviction
        // should have already run inside `add`.
        assert!(evicted.load(Ordering::Relaxed) >= 1);
        cache.shutdown();
    }

    #[test]
    fn update_size_triggers_reeval() {
        let cache = CacheManager::new(1000, 1000);
        let id = cache.add(EvictableType::Shard, 10, 0.0, |_| true);
        cache.update_size(id, 50);
        let stats = cache.stat();
        assert_eq!(stats.total_usage, 50);
        cache.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let cache = CacheManager::new(1000, 1000);
        cache.shutdown();
        cache.shutdown();
    }

    #[test]
    fn protection_factors_match_spec_ordering() {
        assert!(EvictableType::TempColumn.protection_factor() < EvictableType::Shard.protection_factor());
        assert!(EvictableType::Shard.protection_factor() < EvictableType::Index.protection_factor());
        assert!(EvictableType::Index.protection_factor() < EvictableType::TempKeytable.protection_factor());
    }
}
