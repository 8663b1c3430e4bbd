use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for observing cache behavior.
#[derive(Default, Debug)]
pub struct CacheMetrics {
    pub memory_hits: AtomicU64,
    pub disk_hits: AtomicU64,
    pub misses: AtomicU64,
    pub expired_misses: AtomicU64,
    pub puts: AtomicU64,
    pub updates: AtomicU64,
    pub removes: AtomicU64,
    pub evictions: AtomicU64,
    pub disk_evictions: AtomicU64,
    pub expirations: AtomicU64,
    pub reaper_runs: AtomicU64,
    pub reaper_errors: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, name: &str, memory_size: usize, disk_size: usize) -> CacheStatistics {
        let memory_hits = self.memory_hits.load(Ordering::Relaxed);
        let disk_hits = self.disk_hits.load(Ordering::Relaxed);
        CacheStatistics {
            name: name.to_string(),
            hits: memory_hits + disk_hits,
            memory_hits,
            disk_hits,
            misses: self.misses.load(Ordering::Relaxed),
            expired_misses: self.expired_misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            disk_evictions: self.disk_evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            reaper_runs: self.reaper_runs.load(Ordering::Relaxed),
            reaper_errors: self.reaper_errors.load(Ordering::Relaxed),
            memory_size,
            disk_size,
        }
    }
}

/// Point-in-time view of a cache's counters and tier sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub name: String,
    pub hits: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    /// Lookups that found nothing usable, including expired entries.
    pub misses: u64,
    pub expired_misses: u64,
    pub puts: u64,
    pub updates: u64,
    pub removes: u64,
    /// Memory-tier evictions, spilled or discarded.
    pub evictions: u64,
    pub disk_evictions: u64,
    pub expirations: u64,
    pub reaper_runs: u64,
    pub reaper_errors: u64,
    pub memory_size: usize,
    pub disk_size: usize,
}

impl CacheStatistics {
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.memory_size + self.disk_size
    }
}
