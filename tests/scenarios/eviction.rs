//! Scenario 4 (spec §8): two-budget eviction. Persisted-tier pressure
//! should evict shards before the temp column, and the final footprint
//! must settle at or under 75% of the total memory budget.

use columnstore_engine::{CacheManager, EvictableType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[test]
fn two_budget_eviction_settles_under_75_percent_of_memory_budget() {
    let cache = CacheManager::new(1000, 400);

    let t1_alive = Arc::new(AtomicBool::new(true));
    let s1_alive = Arc::new(AtomicBool::new(true));
    let s2_alive = Arc::new(AtomicBool::new(true));
    let i1_alive = Arc::new(AtomicBool::new(true));

    {
        let flag = Arc::clone(&t1_alive);
        cache.add(EvictableType::TempColumn, 300, 0.0, move |_| {
            flag.store(false, Ordering::SeqCst);
            true
        });
    }
    {
        let flag = Arc::clone(&s1_alive);
        cache.add(EvictableType::Shard, 300, 0.0, move |_| {
            flag.store(false, Ordering::SeqCst);
            true
        });
    }
    {
        let flag = Arc::clone(&s2_alive);
        cache.add(EvictableType::Shard, 300, 0.0, move |_| {
            flag.store(false, Ordering::SeqCst);
            true
        });
    }
    {
        let flag = Arc::clone(&i1_alive);
        cache.add(EvictableType::Index, 100, 0.0, move |_| {
            flag.store(false, Ordering::SeqCst);
            true
        });
    }

    let stats = cache.stat();
    // The persisted tier (shards + indexes) was 700 > 400, so at least
    // one of the two equal-score shards must have been evicted.
    let shards_remaining = [s1_alive.load(Ordering::SeqCst), s2_alive.load(Ordering::SeqCst)]
        .into_iter()
        .filter(|alive| *alive)
        .count();
    assert!(shards_remaining <= 1, "expected at least one shard evicted, both survived");
    assert!(stats.total_usage <= 750, "expected total usage <= 750 (75% of 1000), got {}", stats.total_usage);

    cache.shutdown();
}
