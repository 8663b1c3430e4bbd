//! Background thread that removes expired entries from a disk tier.

use crate::cache::CacheMetrics;
use crate::disk::DiskStore;
use crate::entry::{CacheKey, CacheValue};
use crate::errors::CacheError;
use crate::events::{CacheEvent, RegisteredListeners};
use crate::expiry::ExpiryPolicy;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Everything a sweep needs, shared with the owning cache.
pub(crate) struct SweepContext<K, V> {
    pub cache_name: String,
    pub store: Arc<DiskStore<K, V>>,
    pub expiry: ExpiryPolicy,
    pub metrics: Arc<CacheMetrics>,
    pub listeners: Arc<RegisteredListeners<K, V>>,
}

impl<K, V> Clone for SweepContext<K, V> {
    fn clone(&self) -> Self {
        Self {
            cache_name: self.cache_name.clone(),
            store: Arc::clone(&self.store),
            expiry: self.expiry,
            metrics: Arc::clone(&self.metrics),
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl<K: CacheKey, V: CacheValue> SweepContext<K, V> {
    /// Runs one sweep and returns the number of records removed. Failed
    /// removals are counted and logged; they never abort the sweep.
    pub fn sweep(&self) -> usize {
        let report = self.store.purge_expired(&self.expiry);
        CacheMetrics::bump(&self.metrics.reaper_runs);
        let removed = report.removed.len();
        CacheMetrics::add(&self.metrics.expirations, removed as u64);
        CacheMetrics::add(&self.metrics.reaper_errors, report.failed.len() as u64);
        for (_, e) in &report.failed {
            log::warn!("cache {}: disk expiry removal failed: {e}", self.cache_name);
        }
        if removed > 0 {
            log::debug!("cache {}: disk expiry removed {removed} records", self.cache_name);
            if self.listeners.has_listeners() {
                let events: Vec<CacheEvent<K, V>> =
                    report.removed.into_iter().map(|key| CacheEvent::Expired { key }).collect();
                self.listeners.notify_all(&events);
            }
        }
        removed
    }
}

/// Handle to a running reaper. Stopping (or dropping) it blocks until the
/// thread has finished its current sweep and exited.
pub struct Reaper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    pub(crate) fn spawn<K: CacheKey, V: CacheValue>(
        ctx: SweepContext<K, V>,
        interval: Duration,
    ) -> Result<Self, CacheError> {
        let (tx, rx) = mpsc::channel::<()>();
        let thread_name = format!("centralcache-reaper-{}", ctx.cache_name);
        let handle = thread::Builder::new().name(thread_name).spawn(move || {
            log::debug!("cache {}: disk reaper started (interval {interval:?})", ctx.cache_name);
            loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        ctx.sweep();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("cache {}: disk reaper stopped", ctx.cache_name);
        })?;
        Ok(Self { stop_tx: Some(tx), handle: Some(handle) })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("disk reaper thread panicked");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}
