use centralcache::{
    Cache, CacheConfig, CacheError, CacheEvent, CacheEventListener, Clock, EvictionPolicyKind, ManualClock, Status,
    Timestamp,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp::from_millis(1_000_000)))
}

fn memory_cache(cfg: CacheConfig, clock: &Arc<ManualClock>) -> Cache<String, String> {
    Cache::builder("test", cfg).clock(clock.clone()).build().unwrap()
}

fn k(s: &str) -> String {
    s.to_string()
}

#[derive(Default)]
struct Recorder(Mutex<Vec<CacheEvent<String, String>>>);

impl CacheEventListener<String, String> for Recorder {
    fn on_event(&self, event: &CacheEvent<String, String>) {
        self.0.lock().push(event.clone());
    }
}

#[test]
fn put_then_get_round_trips() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10), &c);
    cache.put(k("Oranges"), k("12")).unwrap();
    assert_eq!(cache.get(&k("Oranges")).unwrap(), Some(k("12")));
    assert_eq!(cache.get(&k("Apples")).unwrap(), None);
    let stats = cache.statistics();
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.puts, 1);
}

#[test]
fn overwrite_replaces_value_and_resets_metadata() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.get(&k("a")).unwrap();
    c.advance(Duration::from_secs(5));
    cache.put(k("a"), k("2")).unwrap();
    let entry = cache.get_entry(&k("a")).unwrap().unwrap();
    assert_eq!(entry.value, "2");
    assert_eq!(entry.stats.created_at, c.now());
    assert_eq!(entry.stats.hit_count, 1);
    assert_eq!(cache.statistics().updates, 1);
}

#[test]
fn lru_evicts_least_recently_used_without_disk() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(2), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    cache.get(&k("a")).unwrap();
    cache.put(k("c"), k("3")).unwrap();

    assert_eq!(cache.memory_size(), 2);
    assert_eq!(cache.get(&k("b")).unwrap(), None);
    assert_eq!(cache.get(&k("a")).unwrap(), Some(k("1")));
    assert_eq!(cache.get(&k("c")).unwrap(), Some(k("3")));
    assert_eq!(cache.statistics().evictions, 1);
}

#[test]
fn lru_order_holds_when_clock_does_not_move() {
    // All operations share one millisecond; access order alone decides.
    let c = clock();
    let cache = memory_cache(CacheConfig::new(3), &c);
    for key in ["a", "b", "c"] {
        cache.put(k(key), k(key)).unwrap();
    }
    cache.get(&k("a")).unwrap();
    cache.get(&k("b")).unwrap();
    cache.put(k("d"), k("d")).unwrap();
    assert!(!cache.is_key_in_memory(&k("c")));
    assert!(cache.is_key_in_memory(&k("a")));
}

#[test]
fn lfu_and_fifo_pick_different_victims() {
    let c = clock();
    let lfu = memory_cache(CacheConfig::new(2).eviction_policy(EvictionPolicyKind::Lfu), &c);
    let fifo = memory_cache(CacheConfig::new(2).eviction_policy(EvictionPolicyKind::Fifo), &c);
    for cache in [&lfu, &fifo] {
        cache.put(k("a"), k("1")).unwrap();
        c.advance(Duration::from_millis(1));
        cache.put(k("b"), k("2")).unwrap();
        c.advance(Duration::from_millis(1));
        cache.get(&k("a")).unwrap();
        cache.get(&k("a")).unwrap();
        c.advance(Duration::from_millis(1));
        cache.get(&k("b")).unwrap();
        cache.put(k("c"), k("3")).unwrap();
    }
    // LFU drops the less used "b"; FIFO drops the older "a".
    assert!(lfu.is_key_in_memory(&k("a")));
    assert!(!lfu.is_key_in_memory(&k("b")));
    assert!(!fifo.is_key_in_memory(&k("a")));
    assert!(fifo.is_key_in_memory(&k("b")));
}

#[test]
fn ttl_boundary_is_inclusive() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10).time_to_live_secs(10), &c);
    cache.put(k("a"), k("1")).unwrap();
    c.advance(Duration::from_millis(9_999));
    assert_eq!(cache.get(&k("a")).unwrap(), Some(k("1")));
    c.advance(Duration::from_millis(1));
    assert_eq!(cache.get(&k("a")).unwrap(), None);
    let stats = cache.statistics();
    assert_eq!(stats.expired_misses, 1);
    assert_eq!(stats.expirations, 1);
    assert_eq!(cache.memory_size(), 0);
}

#[test]
fn tti_is_refreshed_by_reads() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10).time_to_idle_secs(5), &c);
    cache.put(k("a"), k("1")).unwrap();
    for _ in 0..4 {
        c.advance(Duration::from_secs(4));
        assert!(cache.get(&k("a")).unwrap().is_some());
    }
    c.advance(Duration::from_secs(5));
    assert!(cache.get(&k("a")).unwrap().is_none());
}

#[test]
fn get_quiet_does_not_refresh_idle_time() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10).time_to_idle_secs(5), &c);
    cache.put(k("a"), k("1")).unwrap();
    c.advance(Duration::from_secs(4));
    assert_eq!(cache.get_quiet(&k("a")).unwrap(), Some(k("1")));
    c.advance(Duration::from_secs(1));
    assert_eq!(cache.get_quiet(&k("a")).unwrap(), None);
    assert_eq!(cache.statistics().hits, 0);
}

#[test]
fn eternal_overrides_ttl_and_tti() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10).eternal(true).time_to_live_secs(1).time_to_idle_secs(1), &c);
    cache.put(k("a"), k("1")).unwrap();
    c.advance(Duration::from_secs(365 * 24 * 3600));
    assert_eq!(cache.get(&k("a")).unwrap(), Some(k("1")));
}

#[test]
fn zero_ttl_and_tti_never_expire() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10), &c);
    cache.put(k("a"), k("1")).unwrap();
    c.advance(Duration::from_secs(10_000_000));
    assert_eq!(cache.get(&k("a")).unwrap(), Some(k("1")));
}

#[test]
fn evict_expired_sweeps_memory() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10).time_to_live_secs(1), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    c.advance(Duration::from_millis(500));
    cache.put(k("c"), k("3")).unwrap();
    c.advance(Duration::from_millis(500));
    assert_eq!(cache.evict_expired().unwrap(), 2);
    assert_eq!(cache.keys(), vec![k("c")]);
}

#[test]
fn expired_victim_is_dropped_before_live_entries() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(2).time_to_idle_secs(10), &c);
    cache.put(k("stale"), k("1")).unwrap();
    c.advance(Duration::from_secs(10));
    cache.put(k("fresh"), k("2")).unwrap();
    cache.put(k("new"), k("3")).unwrap();
    assert!(cache.is_key_in_memory(&k("fresh")));
    assert!(cache.is_key_in_memory(&k("new")));
    let stats = cache.statistics();
    assert_eq!(stats.evictions, 0);
    assert_eq!(stats.expirations, 1);
}

#[test]
fn remove_and_remove_all() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    assert!(cache.remove(&k("a")).unwrap());
    assert!(!cache.remove(&k("a")).unwrap());
    assert_eq!(cache.size(), 1);
    cache.remove_all().unwrap();
    assert_eq!(cache.size(), 0);
    assert!(!cache.contains_key(&k("b")));
}

#[test]
fn listeners_see_events_in_order() {
    let c = clock();
    let recorder = Arc::new(Recorder::default());
    let cache: Cache<String, String> =
        Cache::builder("events", CacheConfig::new(1)).clock(c.clone()).listener(recorder.clone()).build().unwrap();
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("a"), k("2")).unwrap();
    cache.put(k("b"), k("3")).unwrap();
    cache.remove(&k("b")).unwrap();
    let events = recorder.0.lock().clone();
    assert_eq!(
        events,
        vec![
            CacheEvent::Put { key: k("a"), value: k("1") },
            CacheEvent::Updated { key: k("a"), value: k("2") },
            CacheEvent::Evicted { key: k("a"), spilled: false },
            CacheEvent::Put { key: k("b"), value: k("3") },
            CacheEvent::Removed { key: k("b") },
        ]
    );
}

#[test]
fn operations_after_dispose_fail() {
    let c = clock();
    let cache = memory_cache(CacheConfig::new(10), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.dispose().unwrap();
    cache.dispose().unwrap();
    assert_eq!(cache.status(), Status::Shutdown);
    assert_eq!(cache.get(&k("a")).unwrap_err(), CacheError::CacheShutdown(k("test")));
    assert!(matches!(cache.put(k("b"), k("2")), Err(CacheError::CacheShutdown(_))));
}

#[test]
fn invalid_config_is_rejected() {
    let err = Cache::<String, String>::new("bad", CacheConfig::new(0)).unwrap_err();
    assert!(matches!(err, CacheError::InvalidConfig(_)));
    let err = Cache::<String, String>::new("bad", CacheConfig::new(1).disk_expiry_thread_interval_secs(0)).unwrap_err();
    assert!(matches!(err, CacheError::InvalidConfig(_)));
}

#[test]
fn concurrent_puts_never_exceed_the_bound() {
    let cache: Arc<Cache<u64, u64>> = Arc::new(Cache::new("bounded", CacheConfig::new(16)).unwrap());
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for i in 0..500u64 {
                    cache.put(t * 1_000 + i, i).unwrap();
                    assert!(cache.memory_size() <= 16);
                    let _ = cache.get(&(t * 1_000 + i / 2)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(cache.memory_size(), 16);
    assert_eq!(cache.statistics().evictions, 8 * 500 - 16);
}
