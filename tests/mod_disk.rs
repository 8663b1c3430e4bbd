use centralcache::disk::{DiskStore, RECORD_EXT, key_file_stem};
use centralcache::{Cache, CacheConfig, Clock, Entry, EntryStats, ExpiryPolicy, ManualClock, Timestamp};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(Timestamp::from_millis(5_000_000)))
}

fn disk_cache(dir: &TempDir, cfg: CacheConfig, clock: &Arc<ManualClock>) -> Cache<String, String> {
    Cache::builder("disk", cfg).clock(clock.clone()).disk_dir(dir.path().join("disk")).build().unwrap()
}

fn k(s: &str) -> String {
    s.to_string()
}

#[test]
fn victim_spills_and_is_promoted_on_read() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(2), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    cache.put(k("c"), k("3")).unwrap();

    assert!(cache.is_key_on_disk(&k("a")));
    assert!(!cache.is_key_in_memory(&k("a")));
    assert_eq!(cache.size(), 3);

    assert_eq!(cache.get(&k("a")).unwrap(), Some(k("1")));
    assert!(cache.is_key_in_memory(&k("a")));
    assert!(!cache.is_key_on_disk(&k("a")));
    // b was least recently used when a came back.
    assert!(cache.is_key_on_disk(&k("b")));
    assert_eq!(cache.memory_size(), 2);
    assert_eq!(cache.disk_size(), 1);

    let stats = cache.statistics();
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(stats.evictions, 2);
}

#[test]
fn put_over_a_disk_resident_key_moves_it_to_memory() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(1), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    cache.put(k("a"), k("9")).unwrap();
    assert!(cache.is_key_in_memory(&k("a")));
    assert!(cache.is_key_on_disk(&k("b")));
    assert_eq!(cache.size(), 2);
    assert_eq!(cache.get_quiet(&k("a")).unwrap(), Some(k("9")));
}

#[test]
fn disk_bound_evicts_least_recently_used_record() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(1).max_elements_on_disk(2), &c);
    for key in ["a", "b", "c", "d"] {
        cache.put(k(key), k(key)).unwrap();
        c.advance(Duration::from_millis(10));
    }
    assert_eq!(cache.disk_size(), 2);
    assert!(!cache.contains_key(&k("a")));
    assert!(cache.is_key_on_disk(&k("b")));
    assert!(cache.is_key_on_disk(&k("c")));
    assert_eq!(cache.statistics().disk_evictions, 1);
}

#[test]
fn expired_disk_entry_reads_as_miss_and_is_removed() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(1).time_to_live_secs(10), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    c.advance(Duration::from_secs(10));
    assert_eq!(cache.get(&k("a")).unwrap(), None);
    assert!(!cache.is_key_on_disk(&k("a")));
    assert_eq!(cache.statistics().expired_misses, 1);
}

#[test]
fn failed_spill_leaves_cache_unchanged() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(2), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    std::fs::remove_dir_all(tmp.path().join("disk")).unwrap();

    let err = cache.put(k("c"), k("3")).unwrap_err();
    assert!(err.is_storage(), "unexpected error: {err:?}");
    assert!(cache.is_key_in_memory(&k("a")));
    assert!(cache.is_key_in_memory(&k("b")));
    assert!(!cache.contains_key(&k("c")));
    assert_eq!(cache.statistics().evictions, 0);
}

#[test]
fn promotion_into_a_full_disk_does_not_evict_the_promoted_key() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(1).max_elements_on_disk(1), &c);
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    assert!(cache.is_key_on_disk(&k("a")));

    assert_eq!(cache.get(&k("a")).unwrap(), Some(k("1")));
    assert!(cache.is_key_in_memory(&k("a")));
    assert!(cache.is_key_on_disk(&k("b")));
    assert_eq!(cache.disk_size(), 1);
    let stats = cache.statistics();
    assert_eq!(stats.disk_evictions, 0);
    assert_eq!(stats.disk_hits, 1);
    assert_eq!(cache.get(&k("b")).unwrap(), Some(k("2")));
}

#[test]
fn dispose_persists_memory_and_reopen_restores_it() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    {
        let cache = disk_cache(&tmp, CacheConfig::new(10).time_to_idle_secs(60), &c);
        cache.put(k("Oranges"), k("12")).unwrap();
        cache.put(k("Pears"), k("3")).unwrap();
        cache.dispose().unwrap();
    }
    c.advance(Duration::from_secs(30));
    let cache = disk_cache(&tmp, CacheConfig::new(10).time_to_idle_secs(60), &c);
    assert_eq!(cache.disk_size(), 2);
    assert_eq!(cache.get(&k("Oranges")).unwrap(), Some(k("12")));
    assert!(cache.is_key_in_memory(&k("Oranges")));
    c.advance(Duration::from_secs(30));
    // Pears kept its original access time across the restart.
    assert_eq!(cache.get(&k("Pears")).unwrap(), None);
}

#[test]
fn dispose_into_a_bounded_disk_keeps_the_most_recent_entries() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cfg = CacheConfig::new(4).max_elements_on_disk(2);
    {
        let cache = disk_cache(&tmp, cfg.clone(), &c);
        for key in ["a", "b", "c", "d"] {
            cache.put(k(key), k(key)).unwrap();
        }
        cache.get(&k("a")).unwrap();
        cache.dispose().unwrap();
    }
    let cache = disk_cache(&tmp, cfg, &c);
    assert_eq!(cache.disk_size(), 2);
    assert!(cache.is_key_on_disk(&k("a")));
    assert!(cache.is_key_on_disk(&k("d")));
    assert!(!cache.contains_key(&k("b")));
}

#[test]
fn run_disk_expiry_removes_only_expired_records() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(1).time_to_live_secs(5), &c);
    cache.put(k("old"), k("1")).unwrap();
    cache.put(k("mid"), k("2")).unwrap();
    c.advance(Duration::from_secs(3));
    cache.put(k("new"), k("3")).unwrap();
    c.advance(Duration::from_secs(2));
    assert_eq!(cache.disk_size(), 2);
    assert_eq!(cache.run_disk_expiry().unwrap(), 2);
    assert_eq!(cache.disk_size(), 0);
    assert!(cache.is_key_in_memory(&k("new")));
    let stats = cache.statistics();
    assert_eq!(stats.reaper_runs, 1);
    assert_eq!(stats.expirations, 2);
}

#[test]
fn background_reaper_sweeps_on_its_interval() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache: Cache<String, String> = Cache::builder("reaped", CacheConfig::new(1).time_to_live_secs(1))
        .clock(c.clone())
        .disk_dir(tmp.path().join("reaped"))
        .disk_expiry_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    assert!(cache.has_running_reaper());
    cache.put(k("a"), k("1")).unwrap();
    cache.put(k("b"), k("2")).unwrap();
    assert_eq!(cache.disk_size(), 1);
    c.advance(Duration::from_secs(2));

    let deadline = Instant::now() + Duration::from_secs(5);
    while cache.disk_size() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(cache.disk_size(), 0);
    cache.dispose().unwrap();
    assert!(!cache.has_running_reaper());
}

#[test]
fn eternal_cache_runs_no_reaper() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let cache = disk_cache(&tmp, CacheConfig::new(1).eternal(true), &c);
    assert!(!cache.has_running_reaper());
}

#[test]
fn store_discards_corrupt_and_partial_records_on_open() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("store");
    let c = clock();
    {
        let store: DiskStore<String, String> = DiskStore::open(&dir, 0, c.clone()).unwrap();
        store.put(&Entry::new(k("good"), k("1"), EntryStats::new(c.now(), 0))).unwrap();
    }
    std::fs::write(dir.join(format!("{}.{RECORD_EXT}", "0".repeat(64))), b"not a record").unwrap();
    std::fs::write(dir.join("half-written.tmp"), b"CCR1").unwrap();
    // A valid record under the wrong file name.
    let good_stem = key_file_stem(&k("good")).unwrap();
    let bytes = std::fs::read(dir.join(format!("{good_stem}.{RECORD_EXT}"))).unwrap();
    std::fs::write(dir.join(format!("{}.{RECORD_EXT}", "f".repeat(64))), bytes).unwrap();

    let store: DiskStore<String, String> = DiskStore::open(&dir, 0, c.clone()).unwrap();
    assert_eq!(store.keys(), vec![k("good")]);
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
}

#[test]
fn store_trims_to_bound_on_open() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("store");
    let c = clock();
    {
        let store: DiskStore<u32, u32> = DiskStore::open(&dir, 0, c.clone()).unwrap();
        for i in 0..5u32 {
            store.put(&Entry::new(i, i, EntryStats::new(c.now(), u64::from(i)))).unwrap();
            c.advance(Duration::from_millis(1));
        }
    }
    let store: DiskStore<u32, u32> = DiskStore::open(&dir, 3, c.clone()).unwrap();
    assert_eq!(store.size(), 3);
    assert!(!store.contains_key(&0));
    assert!(!store.contains_key(&1));
    assert!(store.contains_key(&4));
}

#[test]
fn store_flush_persists_access_times() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("store");
    let c = clock();
    let start = c.now();
    {
        let store: DiskStore<String, u64> = DiskStore::open(&dir, 0, c.clone()).unwrap();
        store.put(&Entry::new(k("x"), 7, EntryStats::new(start, 0))).unwrap();
        c.advance(Duration::from_secs(9));
        assert_eq!(store.get(&k("x")).unwrap().map(|e| e.value), Some(7));
        assert_eq!(store.flush().unwrap(), 1);
        assert_eq!(store.flush().unwrap(), 0);
    }
    let store: DiskStore<String, u64> = DiskStore::open(&dir, 0, c.clone()).unwrap();
    let stats = store.stats_of(&k("x")).unwrap();
    assert_eq!(stats.created_at, start);
    assert_eq!(stats.last_accessed_at, c.now());
}

#[test]
fn store_purge_reports_removed_keys() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let store: DiskStore<u32, u32> = DiskStore::open(tmp.path(), 0, c.clone()).unwrap();
    store.put(&Entry::new(1, 1, EntryStats::new(c.now(), 0))).unwrap();
    c.advance(Duration::from_secs(2));
    store.put(&Entry::new(2, 2, EntryStats::new(c.now(), 1))).unwrap();
    let policy = ExpiryPolicy::new(false, Duration::from_secs(2), Duration::ZERO);
    let report = store.purge_expired(&policy);
    assert_eq!(report.removed, vec![1]);
    assert!(report.failed.is_empty());
    assert_eq!(store.keys(), vec![2]);
}

#[test]
fn store_remove_missing_file_is_not_an_error() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let store: DiskStore<u32, u32> = DiskStore::open(tmp.path(), 0, c.clone()).unwrap();
    store.put(&Entry::new(1, 1, EntryStats::new(c.now(), 0))).unwrap();
    let stem = key_file_stem(&1u32).unwrap();
    std::fs::remove_file(tmp.path().join(format!("{stem}.{RECORD_EXT}"))).unwrap();
    assert!(store.remove(&1).unwrap());
    assert_eq!(store.size(), 0);
    assert!(matches!(store.get(&1), Ok(None)));
}

#[test]
fn store_purge_covers_an_index_larger_than_one_scan_chunk() {
    let tmp = TempDir::new().unwrap();
    let c = clock();
    let store: DiskStore<u32, u32> = DiskStore::open(tmp.path(), 0, c.clone()).unwrap();
    let old = c.now();
    c.advance(Duration::from_secs(10));
    for i in 0..300u32 {
        let created = if i % 2 == 0 { old } else { c.now() };
        store.put(&Entry::new(i, i, EntryStats::new(created, u64::from(i)))).unwrap();
    }
    let policy = ExpiryPolicy::new(false, Duration::from_secs(5), Duration::ZERO);
    let mut removed = store.purge_expired(&policy).removed;
    removed.sort_unstable();
    assert_eq!(removed, (0..300).step_by(2).collect::<Vec<u32>>());
    assert_eq!(store.size(), 150);
    assert!(store.keys().iter().all(|k| k % 2 == 1));
}
