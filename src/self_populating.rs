//! Read-through cache that computes missing values exactly once per miss.
//!
//! Callers that miss on the same key while a computation is running join it
//! instead of starting their own. Each in-flight key has its own slot, so a
//! slow factory only blocks callers of that key.

use crate::cache::Cache;
use crate::entry::{CacheKey, CacheValue};
use crate::errors::CacheError;
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Produces the value for a key that is not cached.
pub trait EntryFactory<K, V>: Send + Sync {
    /// # Errors
    /// A message describing why no value could be produced.
    fn create_entry(&self, key: &K) -> Result<V, String>;
}

impl<K, V, E, F> EntryFactory<K, V> for F
where
    F: Fn(&K) -> Result<V, E> + Send + Sync,
    E: Display,
{
    fn create_entry(&self, key: &K) -> Result<V, String> {
        self(key).map_err(|e| e.to_string())
    }
}

struct Flight<V> {
    result: Mutex<Option<Result<V, CacheError>>>,
    done: Condvar,
}

impl<V: Clone> Flight<V> {
    fn new() -> Self {
        Self { result: Mutex::new(None), done: Condvar::new() }
    }

    fn publish(&self, result: Result<V, CacheError>) {
        *self.result.lock() = Some(result);
        self.done.notify_all();
    }

    fn wait(&self, timeout: Option<Duration>) -> Result<V, CacheError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut slot = self.result.lock();
        loop {
            if let Some(result) = slot.as_ref() {
                return result.clone();
            }
            match (deadline, timeout) {
                (Some(at), Some(t)) => {
                    if self.done.wait_until(&mut slot, at).timed_out() && slot.is_none() {
                        return Err(CacheError::WaitTimedOut(t));
                    }
                }
                _ => self.done.wait(&mut slot),
            }
        }
    }
}

struct FlightTable<K, V> {
    in_flight: HashMap<K, Arc<Flight<V>>>,
    closed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfPopulatingStatistics {
    /// Factory invocations.
    pub computations: u64,
    pub computation_failures: u64,
    /// Callers that waited on another caller's computation.
    pub joined_waiters: u64,
}

pub struct SelfPopulatingCache<K, V> {
    cache: Arc<Cache<K, V>>,
    factory: Box<dyn EntryFactory<K, V>>,
    table: Mutex<FlightTable<K, V>>,
    idle: Condvar,
    computations: AtomicU64,
    computation_failures: AtomicU64,
    joined_waiters: AtomicU64,
}

enum Role<V> {
    Leader(Arc<Flight<V>>),
    Waiter(Arc<Flight<V>>),
}

impl<K: CacheKey, V: CacheValue> SelfPopulatingCache<K, V> {
    pub fn new(cache: Arc<Cache<K, V>>, factory: impl EntryFactory<K, V> + 'static) -> Self {
        Self {
            cache,
            factory: Box::new(factory),
            table: Mutex::new(FlightTable { in_flight: HashMap::new(), closed: false }),
            idle: Condvar::new(),
            computations: AtomicU64::new(0),
            computation_failures: AtomicU64::new(0),
            joined_waiters: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<Cache<K, V>> {
        &self.cache
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.cache.name()
    }

    /// Returns the cached value, computing and caching it on a miss.
    ///
    /// # Errors
    /// [`CacheError::Computation`] if the factory failed (shared by every
    /// caller that joined that computation), or any error of the wrapped cache.
    pub fn get(&self, key: &K) -> Result<V, CacheError> {
        self.fetch(key, None, false)
    }

    /// Like [`get`](Self::get), but a caller that has to wait on someone
    /// else's computation gives up after `timeout`. The computation keeps
    /// running and still populates the cache.
    ///
    /// # Errors
    /// [`CacheError::WaitTimedOut`] on timeout, otherwise as [`get`](Self::get).
    pub fn get_with_timeout(&self, key: &K, timeout: Duration) -> Result<V, CacheError> {
        self.fetch(key, Some(timeout), false)
    }

    /// Recomputes `key` and overwrites the cached value. Joins a computation
    /// already in flight for the key instead of starting a second one.
    ///
    /// # Errors
    /// As [`get`](Self::get).
    pub fn refresh(&self, key: &K) -> Result<V, CacheError> {
        self.fetch(key, None, true)
    }

    /// # Errors
    /// As [`Cache::put`].
    pub fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        self.cache.put(key, value)
    }

    /// # Errors
    /// As [`Cache::remove`].
    pub fn remove(&self, key: &K) -> Result<bool, CacheError> {
        self.cache.remove(key)
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.table.lock().in_flight.len()
    }

    #[must_use]
    pub fn statistics(&self) -> SelfPopulatingStatistics {
        SelfPopulatingStatistics {
            computations: self.computations.load(Ordering::Relaxed),
            computation_failures: self.computation_failures.load(Ordering::Relaxed),
            joined_waiters: self.joined_waiters.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting new computations and waits for running ones to finish.
    pub fn close(&self) {
        let mut table = self.table.lock();
        table.closed = true;
        while !table.in_flight.is_empty() {
            self.idle.wait(&mut table);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.table.lock().closed
    }

    fn fetch(&self, key: &K, timeout: Option<Duration>, refresh: bool) -> Result<V, CacheError> {
        if !refresh {
            if let Some(v) = self.cache.get(key)? {
                return Ok(v);
            }
        }

        let role = {
            let mut table = self.table.lock();
            if table.closed {
                return Err(CacheError::RegistryClosed);
            }
            match table.in_flight.get(key) {
                Some(flight) => Role::Waiter(Arc::clone(flight)),
                None => {
                    let flight = Arc::new(Flight::new());
                    table.in_flight.insert(key.clone(), Arc::clone(&flight));
                    Role::Leader(flight)
                }
            }
        };

        match role {
            Role::Waiter(flight) => {
                self.joined_waiters.fetch_add(1, Ordering::Relaxed);
                flight.wait(timeout)
            }
            Role::Leader(flight) => {
                let mut guard = LeaderGuard { owner: self, key, flight, finished: false };
                let result = self.compute(key, refresh);
                guard.finish(result.clone());
                result
            }
        }
    }

    fn compute(&self, key: &K, refresh: bool) -> Result<V, CacheError> {
        // Another leader may have stored the value between our miss and
        // claiming the slot. The miss was already counted in `fetch`.
        if !refresh {
            if let Some(v) = self.cache.get_rechecked(key)? {
                return Ok(v);
            }
        }
        self.computations.fetch_add(1, Ordering::Relaxed);
        match self.factory.create_entry(key) {
            Ok(value) => {
                self.cache.put(key.clone(), value.clone())?;
                Ok(value)
            }
            Err(msg) => {
                self.computation_failures.fetch_add(1, Ordering::Relaxed);
                log::debug!("cache {}: entry factory failed: {msg}", self.cache.name());
                Err(CacheError::Computation(msg))
            }
        }
    }

    fn release(&self, key: &K, flight: &Flight<V>, result: Result<V, CacheError>) {
        {
            let mut table = self.table.lock();
            table.in_flight.remove(key);
            if table.in_flight.is_empty() {
                self.idle.notify_all();
            }
        }
        flight.publish(result);
    }
}

/// Resolves the leader's slot even if the factory panics, so joined callers
/// are never left waiting.
struct LeaderGuard<'a, K: CacheKey, V: CacheValue> {
    owner: &'a SelfPopulatingCache<K, V>,
    key: &'a K,
    flight: Arc<Flight<V>>,
    finished: bool,
}

impl<K: CacheKey, V: CacheValue> LeaderGuard<'_, K, V> {
    fn finish(&mut self, result: Result<V, CacheError>) {
        self.finished = true;
        self.owner.release(self.key, &self.flight, result);
    }
}

impl<K: CacheKey, V: CacheValue> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        if !self.finished {
            self.owner.computation_failures.fetch_add(1, Ordering::Relaxed);
            log::error!("cache {}: entry factory panicked", self.owner.cache.name());
            self.owner.release(self.key, &self.flight, Err(CacheError::Computation("entry factory panicked".into())));
        }
    }
}

impl<K, V> std::fmt::Debug for SelfPopulatingCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfPopulatingCache").field("cache", &self.cache).finish_non_exhaustive()
    }
}
