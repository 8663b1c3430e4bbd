use crate::cache::{Cache, CacheConfig, CacheStatistics};
use crate::clock::{Clock, SystemClock};
use crate::entry::{CacheKey, CacheValue};
use crate::errors::CacheError;
use crate::eviction::EvictionPolicy;
use crate::fsutil;
use crate::registry::config::RegistryConfig;
use crate::self_populating::{EntryFactory, SelfPopulatingCache};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const METRICS_TARGET: &str = "centralcache::metrics";

/// Type-erased view the registry keeps of every cache it owns.
pub trait ManagedCache: Send + Sync {
    fn cache_name(&self) -> &str;
    fn cache_statistics(&self) -> CacheStatistics;
    fn is_self_populating(&self) -> bool {
        false
    }
    /// Quiesces background activity other than the reaper. No-op by default.
    fn close(&self) {}
    /// # Errors
    /// Storage errors raised while persisting the disk tier.
    fn dispose(&self) -> Result<(), CacheError>;
}

impl<K: CacheKey, V: CacheValue> ManagedCache for Cache<K, V> {
    fn cache_name(&self) -> &str {
        self.name()
    }

    fn cache_statistics(&self) -> CacheStatistics {
        self.statistics()
    }

    fn dispose(&self) -> Result<(), CacheError> {
        Cache::dispose(self)
    }
}

impl<K: CacheKey, V: CacheValue> ManagedCache for SelfPopulatingCache<K, V> {
    fn cache_name(&self) -> &str {
        self.name()
    }

    fn cache_statistics(&self) -> CacheStatistics {
        self.cache().statistics()
    }

    fn is_self_populating(&self) -> bool {
        true
    }

    fn close(&self) {
        SelfPopulatingCache::close(self);
    }

    fn dispose(&self) -> Result<(), CacheError> {
        self.cache().dispose()
    }
}

struct Registered {
    managed: Arc<dyn ManagedCache>,
    /// The concrete `Arc<Cache<K, V>>` or `Arc<SelfPopulatingCache<K, V>>`.
    handle: Arc<dyn Any + Send + Sync>,
    self_populating: bool,
}

#[derive(Default)]
struct RegistryState {
    caches: BTreeMap<String, Registered>,
    closed: bool,
}

/// Named collection of caches sharing one disk root and one lifecycle.
pub struct CacheRegistry {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<RegistryState>,
}

impl CacheRegistry {
    /// Creates a registry. Caches get a disk tier only when `disk_root` is set.
    #[must_use]
    pub fn new(disk_root: Option<PathBuf>) -> Self {
        Self::with_config(RegistryConfig::with_disk_root(disk_root))
    }

    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        log::info!(
            "cache registry created: disk_root={}",
            config.disk_root.as_ref().map_or_else(|| "none".to_string(), |p| p.display().to_string())
        );
        Self { config, clock: Arc::new(SystemClock), state: RwLock::new(RegistryState::default()) }
    }

    /// Clock handed to every cache created afterwards.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn disk_root(&self) -> Option<&Path> {
        self.config.disk_root.as_deref()
    }

    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Creates and registers a cache.
    ///
    /// # Errors
    /// [`CacheError::DuplicateCache`], [`CacheError::RegistryClosed`],
    /// [`CacheError::InvalidConfig`], or a storage error opening the disk tier.
    pub fn add_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
        config: CacheConfig,
    ) -> Result<Arc<Cache<K, V>>, CacheError> {
        self.register(name, |reg| reg.build_cache(name, config, None))
    }

    /// Like [`add_cache`](Self::add_cache) with a caller-supplied eviction policy.
    ///
    /// # Errors
    /// As [`add_cache`](Self::add_cache).
    pub fn add_cache_with_policy<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
        config: CacheConfig,
        policy: Arc<dyn EvictionPolicy>,
    ) -> Result<Arc<Cache<K, V>>, CacheError> {
        self.register(name, |reg| reg.build_cache(name, config, Some(policy)))
    }

    /// Creates a cache from the registry configuration: the section named
    /// `name`, else `default_cache`, else defaults.
    ///
    /// # Errors
    /// As [`add_cache`](Self::add_cache).
    pub fn add_configured_cache<K: CacheKey, V: CacheValue>(&self, name: &str) -> Result<Arc<Cache<K, V>>, CacheError> {
        self.add_cache(name, self.config.cache_config(name))
    }

    /// Creates a cache wrapped in a [`SelfPopulatingCache`] and registers it.
    ///
    /// # Errors
    /// As [`add_cache`](Self::add_cache).
    pub fn add_self_populating_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
        config: CacheConfig,
        factory: impl EntryFactory<K, V> + 'static,
    ) -> Result<Arc<SelfPopulatingCache<K, V>>, CacheError> {
        self.register(name, |reg| {
            let cache = reg.build_cache::<K, V>(name, config, None)?;
            Ok(Arc::new(SelfPopulatingCache::new(cache, factory)))
        })
    }

    fn register<T: ManagedCache + 'static>(
        &self,
        name: &str,
        build: impl FnOnce(&Self) -> Result<Arc<T>, CacheError>,
    ) -> Result<Arc<T>, CacheError> {
        let mut state = self.state.write();
        if state.closed {
            return Err(CacheError::RegistryClosed);
        }
        if state.caches.contains_key(name) {
            return Err(CacheError::DuplicateCache(name.to_string()));
        }
        let cache = build(self)?;
        state.caches.insert(
            name.to_string(),
            Registered {
                managed: Arc::clone(&cache) as Arc<dyn ManagedCache>,
                handle: Arc::clone(&cache) as Arc<dyn Any + Send + Sync>,
                self_populating: cache.is_self_populating(),
            },
        );
        Ok(cache)
    }

    fn build_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
        config: CacheConfig,
        policy: Option<Arc<dyn EvictionPolicy>>,
    ) -> Result<Arc<Cache<K, V>>, CacheError> {
        let disk_dir = match &self.config.disk_root {
            Some(root) if config.overflow_to_disk => Some(fsutil::cache_dir(root, name)),
            _ => None,
        };
        let mut builder = Cache::builder(name, config).clock(Arc::clone(&self.clock));
        if let Some(policy) = policy {
            builder = builder.eviction_policy(policy);
        }
        if let Some(dir) = disk_dir {
            builder = builder.disk_dir(dir);
        }
        builder.build().map(Arc::new)
    }

    /// Looks up a cache by name. For a self-populating cache this is the
    /// wrapped cache, which reads without computing.
    ///
    /// # Errors
    /// [`CacheError::TypeMismatch`] if it was registered with other types,
    /// [`CacheError::RegistryClosed`] after shutdown.
    pub fn get_cache<K: CacheKey, V: CacheValue>(&self, name: &str) -> Result<Option<Arc<Cache<K, V>>>, CacheError> {
        let state = self.state.read();
        if state.closed {
            return Err(CacheError::RegistryClosed);
        }
        let Some(reg) = state.caches.get(name) else { return Ok(None) };
        if reg.self_populating {
            let spc = Arc::clone(&reg.handle)
                .downcast::<SelfPopulatingCache<K, V>>()
                .map_err(|_| CacheError::TypeMismatch(name.to_string()))?;
            return Ok(Some(Arc::clone(spc.cache())));
        }
        Arc::clone(&reg.handle)
            .downcast::<Cache<K, V>>()
            .map(Some)
            .map_err(|_| CacheError::TypeMismatch(name.to_string()))
    }

    /// # Errors
    /// [`CacheError::TypeMismatch`] if `name` is a plain cache or has other
    /// types, [`CacheError::RegistryClosed`] after shutdown.
    pub fn get_self_populating_cache<K: CacheKey, V: CacheValue>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<SelfPopulatingCache<K, V>>>, CacheError> {
        let state = self.state.read();
        if state.closed {
            return Err(CacheError::RegistryClosed);
        }
        let Some(reg) = state.caches.get(name) else { return Ok(None) };
        Arc::clone(&reg.handle)
            .downcast::<SelfPopulatingCache<K, V>>()
            .map(Some)
            .map_err(|_| CacheError::TypeMismatch(name.to_string()))
    }

    #[must_use]
    pub fn cache_names(&self) -> Vec<String> {
        self.state.read().caches.keys().cloned().collect()
    }

    #[must_use]
    pub fn cache_exists(&self, name: &str) -> bool {
        self.state.read().caches.contains_key(name)
    }

    /// # Errors
    /// [`CacheError::NoSuchCache`] or [`CacheError::RegistryClosed`].
    pub fn statistics(&self, name: &str) -> Result<CacheStatistics, CacheError> {
        let state = self.state.read();
        if state.closed {
            return Err(CacheError::RegistryClosed);
        }
        state
            .caches
            .get(name)
            .map(|reg| reg.managed.cache_statistics())
            .ok_or_else(|| CacheError::NoSuchCache(name.to_string()))
    }

    #[must_use]
    pub fn all_statistics(&self) -> Vec<CacheStatistics> {
        self.state.read().caches.values().map(|reg| reg.managed.cache_statistics()).collect()
    }

    /// Unregisters and disposes a cache. Handles callers still hold will
    /// fail with [`CacheError::CacheShutdown`].
    ///
    /// # Errors
    /// [`CacheError::NoSuchCache`], [`CacheError::RegistryClosed`], or a
    /// storage error from disposal (the cache is unregistered regardless).
    pub fn remove_cache(&self, name: &str) -> Result<(), CacheError> {
        let reg = {
            let mut state = self.state.write();
            if state.closed {
                return Err(CacheError::RegistryClosed);
            }
            state.caches.remove(name).ok_or_else(|| CacheError::NoSuchCache(name.to_string()))?
        };
        reg.managed.close();
        reg.managed.dispose()
    }

    /// Closes the registry: waits for in-flight computations, stops every
    /// reaper, persists disk tiers and logs final statistics. Repeated calls
    /// are no-ops.
    ///
    /// # Errors
    /// The first disposal failure; every cache is still disposed.
    pub fn shutdown(&self) -> Result<(), CacheError> {
        let caches = {
            let mut state = self.state.write();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            std::mem::take(&mut state.caches)
        };
        let mut first_err: Option<CacheError> = None;
        for reg in caches.values() {
            reg.managed.close();
        }
        for (name, reg) in &caches {
            let stats = reg.managed.cache_statistics();
            if let Err(e) = reg.managed.dispose() {
                log::error!("cache {name}: dispose failed: {e}");
                first_err.get_or_insert(e);
            }
            match serde_json::to_string(&stats) {
                Ok(json) => log::info!(target: METRICS_TARGET, "{json}"),
                Err(e) => log::warn!("cache {name}: could not serialize statistics: {e}"),
            }
        }
        log::info!("cache registry shut down ({} caches)", caches.len());
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for CacheRegistry {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("cache registry shutdown on drop failed: {e}");
        }
    }
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("disk_root", &self.config.disk_root)
            .field("caches", &self.cache_names())
            .finish_non_exhaustive()
    }
}
