use crate::cache::builder::CacheBuilder;
use crate::cache::config::CacheConfig;
use crate::cache::memory::{MemoryStore, Slot};
use crate::cache::metrics::{CacheMetrics, CacheStatistics};
use crate::clock::{Clock, Timestamp};
use crate::disk::{DiskStore, Reaper, SweepContext};
use crate::entry::{CacheKey, CacheValue, Entry, EntryStats};
use crate::errors::CacheError;
use crate::events::{CacheEvent, CacheEventListener, RegisteredListeners};
use crate::eviction::EvictionPolicy;
use crate::expiry::ExpiryPolicy;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Alive,
    Shutdown,
}

/// A bounded, thread-safe cache with an optional disk overflow tier.
///
/// Every operation runs under one lock per cache (memory tier first, then the
/// disk tier's own lock), so the memory bound holds whenever the lock is free
/// and a key is resident in at most one tier.
pub struct Cache<K, V> {
    name: String,
    config: CacheConfig,
    expiry: ExpiryPolicy,
    policy: Arc<dyn EvictionPolicy>,
    clock: Arc<dyn Clock>,
    memory: Mutex<MemoryStore<K, V>>,
    disk: Option<Arc<DiskStore<K, V>>>,
    sweeper: Option<SweepContext<K, V>>,
    reaper: Mutex<Option<Reaper>>,
    metrics: Arc<CacheMetrics>,
    listeners: Arc<RegisteredListeners<K, V>>,
}

pub(crate) struct CacheParts<K, V> {
    pub name: String,
    pub config: CacheConfig,
    pub policy: Arc<dyn EvictionPolicy>,
    pub clock: Arc<dyn Clock>,
    pub disk: Option<Arc<DiskStore<K, V>>>,
    pub reaper_interval: std::time::Duration,
    pub listeners: Arc<RegisteredListeners<K, V>>,
}

impl<K: CacheKey, V: CacheValue> Cache<K, V> {
    /// Creates a memory-only cache.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfig`] if the configuration is invalid.
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Result<Self, CacheError> {
        Self::builder(name, config).build()
    }

    pub fn builder(name: impl Into<String>, config: CacheConfig) -> CacheBuilder<K, V> {
        CacheBuilder::new(name, config)
    }

    pub(crate) fn from_parts(parts: CacheParts<K, V>) -> Result<Self, CacheError> {
        let CacheParts { name, config, policy, clock, disk, reaper_interval, listeners } = parts;
        let expiry = ExpiryPolicy::from_config(&config);
        let metrics = Arc::new(CacheMetrics::default());
        let sweeper = disk.as_ref().map(|store| SweepContext {
            cache_name: name.clone(),
            store: Arc::clone(store),
            expiry,
            metrics: Arc::clone(&metrics),
            listeners: Arc::clone(&listeners),
        });
        let reaper = match &sweeper {
            Some(ctx) if !expiry.never_expires() => Some(Reaper::spawn(ctx.clone(), reaper_interval)?),
            _ => None,
        };
        log::info!(
            "cache {name} created: max_in_memory={}, disk={}, policy={}, eternal={}, ttl={}s, tti={}s",
            config.max_elements_in_memory,
            disk.as_ref().map_or_else(|| "none".to_string(), |d| d.dir().display().to_string()),
            policy.name(),
            config.eternal,
            config.time_to_live_secs,
            config.time_to_idle_secs,
        );
        Ok(Self {
            memory: Mutex::new(MemoryStore::new(config.max_elements_in_memory, Arc::clone(&policy))),
            name,
            config,
            expiry,
            policy,
            clock,
            disk,
            sweeper,
            reaper: Mutex::new(reaper),
            metrics,
            listeners,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[must_use]
    pub const fn expiry_policy(&self) -> &ExpiryPolicy {
        &self.expiry
    }

    #[must_use]
    pub fn eviction_policy_name(&self) -> &'static str {
        self.policy.name()
    }

    #[must_use]
    pub const fn is_disk_backed(&self) -> bool {
        self.disk.is_some()
    }

    #[must_use]
    pub fn status(&self) -> Status {
        if self.memory.lock().alive { Status::Alive } else { Status::Shutdown }
    }

    #[must_use]
    pub fn has_running_reaper(&self) -> bool {
        self.reaper.lock().as_ref().is_some_and(Reaper::is_running)
    }

    pub fn register_listener(&self, listener: Arc<dyn CacheEventListener<K, V>>) {
        self.listeners.register(listener);
    }

    fn lock_alive(&self) -> Result<MutexGuard<'_, MemoryStore<K, V>>, CacheError> {
        let guard = self.memory.lock();
        if guard.alive { Ok(guard) } else { Err(CacheError::CacheShutdown(self.name.clone())) }
    }

    /// Runs `op` under the cache lock and delivers its events once the lock is released.
    fn with_events<T>(
        &self,
        op: impl FnOnce(&mut MemoryStore<K, V>, &mut Events<K, V>) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut events = Events::new(self.listeners.has_listeners());
        let result = {
            let mut mem = self.lock_alive()?;
            op(&mut mem, &mut events)
        };
        self.listeners.notify_all(&events.list);
        result
    }

    /// Looks up `key`, returning its value on a hit.
    ///
    /// # Errors
    /// Storage errors from the disk tier; ordinary misses are `Ok(None)`.
    pub fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        Ok(self.get_entry(key)?.map(Entry::into_value))
    }

    /// Looks up `key`, returning the entry with its refreshed metadata.
    ///
    /// # Errors
    /// Storage errors from the disk tier; ordinary misses are `Ok(None)`.
    pub fn get_entry(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        self.with_events(|mem, events| self.get_locked(mem, key, events, true))
    }

    /// Like [`get`](Self::get), but a miss is not counted. For callers that
    /// look a key up again after already recording the miss.
    pub(crate) fn get_rechecked(&self, key: &K) -> Result<Option<V>, CacheError> {
        let entry = self.with_events(|mem, events| self.get_locked(mem, key, events, false))?;
        Ok(entry.map(Entry::into_value))
    }

    fn get_locked(
        &self,
        mem: &mut MemoryStore<K, V>,
        key: &K,
        events: &mut Events<K, V>,
        count_miss: bool,
    ) -> Result<Option<Entry<K, V>>, CacheError> {
        let now = self.clock.now();
        match mem.get(key).map(|slot| self.expiry.is_expired(&slot.stats, now)) {
            Some(true) => {
                mem.remove(key);
                self.record_expired_miss(count_miss);
                events.push(|| CacheEvent::Expired { key: key.clone() });
                return Ok(None);
            }
            Some(false) => {
                if let Some(slot) = mem.touch(key, now) {
                    CacheMetrics::bump(&self.metrics.memory_hits);
                    return Ok(Some(Entry::new(key.clone(), slot.value.clone(), slot.stats)));
                }
            }
            None => {}
        }

        let Some(disk) = &self.disk else {
            self.record_miss(count_miss);
            return Ok(None);
        };
        let Some(entry) = disk.peek(key)? else {
            self.record_miss(count_miss);
            return Ok(None);
        };
        if self.expiry.is_expired(&entry.stats, now) {
            disk.remove(key)?;
            self.record_expired_miss(count_miss);
            events.push(|| CacheEvent::Expired { key: key.clone() });
            return Ok(None);
        }

        // Promote: make room first so a failed spill leaves the entry on disk.
        // The spill must not push the promoted key itself off a full disk tier.
        self.make_room(mem, now, events, Some(key))?;
        disk.remove(key)?;
        let mut stats = entry.stats;
        stats.seq = mem.next_seq();
        stats.touch(now, stats.seq);
        mem.insert(key.clone(), Slot { value: entry.value.clone(), stats });
        CacheMetrics::bump(&self.metrics.disk_hits);
        log::debug!("cache {}: promoted entry from disk", self.name);
        Ok(Some(Entry::new(entry.key, entry.value, stats)))
    }

    fn record_miss(&self, count_miss: bool) {
        if count_miss {
            CacheMetrics::bump(&self.metrics.misses);
        }
    }

    fn record_expired_miss(&self, count_miss: bool) {
        CacheMetrics::bump(&self.metrics.expirations);
        if count_miss {
            CacheMetrics::bump(&self.metrics.expired_misses);
            CacheMetrics::bump(&self.metrics.misses);
        }
    }

    /// Looks up `key` without touching access metadata, recency or statistics.
    /// Expired entries read as absent but are left in place.
    ///
    /// # Errors
    /// Storage errors from the disk tier.
    pub fn get_quiet(&self, key: &K) -> Result<Option<V>, CacheError> {
        let mem = self.lock_alive()?;
        let now = self.clock.now();
        if let Some(slot) = mem.get(key) {
            let fresh = !self.expiry.is_expired(&slot.stats, now);
            return Ok(fresh.then(|| slot.value.clone()));
        }
        match &self.disk {
            Some(disk) => Ok(disk
                .peek(key)?
                .filter(|e| !self.expiry.is_expired(&e.stats, now))
                .map(Entry::into_value)),
            None => Ok(None),
        }
    }

    /// Inserts or overwrites `key`. Overwrites reset the entry's metadata.
    ///
    /// # Errors
    /// A storage error if the memory victim could not be spilled to disk; the
    /// cache is unchanged in that case.
    pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        self.with_events(|mem, events| self.put_locked(mem, key, value, events))
    }

    fn put_locked(
        &self,
        mem: &mut MemoryStore<K, V>,
        key: K,
        value: V,
        events: &mut Events<K, V>,
    ) -> Result<(), CacheError> {
        let now = self.clock.now();
        let seq = mem.next_seq();
        if mem.contains_key(&key) {
            CacheMetrics::bump(&self.metrics.puts);
            CacheMetrics::bump(&self.metrics.updates);
            events.push(|| CacheEvent::Updated { key: key.clone(), value: value.clone() });
            mem.insert(key, Slot { value, stats: EntryStats::new(now, seq) });
            return Ok(());
        }

        self.make_room(mem, now, events, None)?;
        let was_on_disk = match &self.disk {
            Some(disk) => disk.remove(&key)?,
            None => false,
        };
        CacheMetrics::bump(&self.metrics.puts);
        if was_on_disk {
            CacheMetrics::bump(&self.metrics.updates);
            events.push(|| CacheEvent::Updated { key: key.clone(), value: value.clone() });
        } else {
            events.push(|| CacheEvent::Put { key: key.clone(), value: value.clone() });
        }
        mem.insert(key, Slot { value, stats: EntryStats::new(now, seq) });
        Ok(())
    }

    /// Evicts until one more entry fits in memory. Expired victims are
    /// dropped; live ones spill to disk when the cache is disk-backed. A full
    /// disk tier never drops `spare` to take a spilled entry.
    fn make_room(
        &self,
        mem: &mut MemoryStore<K, V>,
        now: Timestamp,
        events: &mut Events<K, V>,
        spare: Option<&K>,
    ) -> Result<(), CacheError> {
        while mem.len() >= self.config.max_elements_in_memory {
            let Some(victim) = mem.select_victim() else { break };
            let Some(slot) = mem.remove(&victim) else { break };

            if self.expiry.is_expired(&slot.stats, now) {
                CacheMetrics::bump(&self.metrics.expirations);
                events.push(|| CacheEvent::Expired { key: victim.clone() });
                continue;
            }

            let spilled = match &self.disk {
                Some(disk) => {
                    let entry = Entry::new(victim.clone(), slot.value, slot.stats);
                    match disk.put_sparing(&entry, spare) {
                        Ok(outcome) => {
                            if let Some(dropped) = outcome.evicted {
                                CacheMetrics::bump(&self.metrics.disk_evictions);
                                events.push(|| CacheEvent::DiskEvicted { key: dropped });
                            }
                            true
                        }
                        Err(e) => {
                            log::warn!("cache {}: spill to disk failed, keeping entry in memory: {e}", self.name);
                            mem.insert(victim, Slot { value: entry.value, stats: entry.stats });
                            return Err(e);
                        }
                    }
                }
                None => false,
            };
            CacheMetrics::bump(&self.metrics.evictions);
            events.push(|| CacheEvent::Evicted { key: victim.clone(), spilled });
            log::trace!("cache {}: evicted one entry (spilled={spilled})", self.name);
        }
        Ok(())
    }

    /// Removes `key` from whichever tier holds it.
    ///
    /// # Errors
    /// A storage error if the disk record could not be deleted.
    pub fn remove(&self, key: &K) -> Result<bool, CacheError> {
        self.with_events(|mem, events| {
            let removed = if mem.remove(key).is_some() {
                true
            } else {
                match &self.disk {
                    Some(disk) => disk.remove(key)?,
                    None => false,
                }
            };
            if removed {
                CacheMetrics::bump(&self.metrics.removes);
                events.push(|| CacheEvent::Removed { key: key.clone() });
            }
            Ok(removed)
        })
    }

    /// Empties both tiers.
    ///
    /// # Errors
    /// A storage error if some disk records could not be deleted.
    pub fn remove_all(&self) -> Result<(), CacheError> {
        self.with_events(|mem, events| {
            mem.clear();
            if let Some(disk) = &self.disk {
                disk.clear()?;
            }
            events.push(|| CacheEvent::Cleared);
            Ok(())
        })
    }

    /// Drops expired entries from the memory tier now. Returns how many went.
    ///
    /// # Errors
    /// [`CacheError::CacheShutdown`] after disposal.
    pub fn evict_expired(&self) -> Result<usize, CacheError> {
        self.with_events(|mem, events| {
            let now = self.clock.now();
            let expired = mem.expired_keys(&self.expiry, now);
            for key in &expired {
                mem.remove(key);
                events.push(|| CacheEvent::Expired { key: key.clone() });
            }
            CacheMetrics::add(&self.metrics.expirations, expired.len() as u64);
            Ok(expired.len())
        })
    }

    /// Runs one disk expiry sweep on the calling thread, the same work the
    /// reaper does on its timer. Returns the number of records removed.
    ///
    /// # Errors
    /// [`CacheError::CacheShutdown`] after disposal.
    pub fn run_disk_expiry(&self) -> Result<usize, CacheError> {
        drop(self.lock_alive()?);
        Ok(self.sweeper.as_ref().map_or(0, SweepContext::sweep))
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        let mem = self.memory.lock();
        let mut keys: Vec<K> = mem.keys().cloned().collect();
        if let Some(disk) = &self.disk {
            keys.extend(disk.keys());
        }
        keys
    }

    #[must_use]
    pub fn is_key_in_memory(&self, key: &K) -> bool {
        self.memory.lock().contains_key(key)
    }

    #[must_use]
    pub fn is_key_on_disk(&self, key: &K) -> bool {
        self.disk.as_ref().is_some_and(|d| d.contains_key(key))
    }

    /// True if either tier holds `key`, expired or not.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        let mem = self.memory.lock();
        mem.contains_key(key) || self.disk.as_ref().is_some_and(|d| d.contains_key(key))
    }

    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.memory.lock().len()
    }

    #[must_use]
    pub fn disk_size(&self) -> usize {
        self.disk.as_ref().map_or(0, |d| d.size())
    }

    #[must_use]
    pub fn size(&self) -> usize {
        let mem = self.memory.lock();
        mem.len() + self.disk.as_ref().map_or(0, |d| d.size())
    }

    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        let mem = self.memory.lock();
        let disk_size = self.disk.as_ref().map_or(0, |d| d.size());
        self.metrics.snapshot(&self.name, mem.len(), disk_size)
    }

    /// Persists pending disk metadata without shutting down.
    ///
    /// # Errors
    /// The first disk write failure.
    pub fn flush(&self) -> Result<(), CacheError> {
        let _mem = self.lock_alive()?;
        if let Some(disk) = &self.disk {
            disk.flush()?;
        }
        Ok(())
    }

    /// Shuts the cache down: stops the reaper, moves live memory entries to
    /// disk when disk-backed, and flushes the disk tier. Later operations fail
    /// with [`CacheError::CacheShutdown`]. Calling it twice is a no-op.
    ///
    /// # Errors
    /// The first failure while spilling or flushing; disposal still completes.
    pub fn dispose(&self) -> Result<(), CacheError> {
        {
            let mut mem = self.memory.lock();
            if !mem.alive {
                return Ok(());
            }
            mem.alive = false;
        }
        // Joined without the cache lock held: a sweep may be notifying listeners.
        if let Some(mut reaper) = self.reaper.lock().take() {
            reaper.stop();
        }

        let mut mem = self.memory.lock();
        let Some(disk) = &self.disk else {
            mem.clear();
            log::info!("cache {} disposed", self.name);
            return Ok(());
        };
        let now = self.clock.now();
        let mut live: Vec<(K, Slot<V>)> =
            mem.drain().into_iter().filter(|(_, slot)| !self.expiry.is_expired(&slot.stats, now)).collect();
        // Lowest priority first, so a bounded disk tier keeps the most valuable entries.
        live.sort_by(|(_, a), (_, b)| self.policy.compare(&a.stats, &b.stats));

        let mut first_err: Option<CacheError> = None;
        let mut spilled = 0usize;
        for (key, slot) in live {
            match disk.put(&Entry::new(key, slot.value, slot.stats)) {
                Ok(_) => spilled += 1,
                Err(e) => {
                    log::warn!("cache {}: could not persist entry on shutdown: {e}", self.name);
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Err(e) = disk.flush() {
            first_err.get_or_insert(e);
        }
        log::info!("cache {} disposed (persisted {spilled} entries)", self.name);
        first_err.map_or(Ok(()), Err)
    }
}

impl<K, V> std::fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .finish_non_exhaustive()
    }
}

/// Events collected while the lock is held. Construction is skipped entirely
/// when nobody listens.
struct Events<K, V> {
    enabled: bool,
    list: Vec<CacheEvent<K, V>>,
}

impl<K, V> Events<K, V> {
    const fn new(enabled: bool) -> Self {
        Self { enabled, list: Vec::new() }
    }

    fn push(&mut self, make: impl FnOnce() -> CacheEvent<K, V>) {
        if self.enabled {
            self.list.push(make());
        }
    }
}
