use crate::cache::config::CacheConfig;
use crate::cache::core::{Cache, CacheParts};
use crate::clock::{Clock, SystemClock};
use crate::disk::DiskStore;
use crate::entry::{CacheKey, CacheValue};
use crate::errors::CacheError;
use crate::events::{CacheEventListener, RegisteredListeners};
use crate::eviction::EvictionPolicy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Assembles a [`Cache`] from its configuration plus the pieces that cannot
/// live in a config file: a custom eviction policy, a clock, a disk directory.
pub struct CacheBuilder<K, V> {
    name: String,
    config: CacheConfig,
    policy: Option<Arc<dyn EvictionPolicy>>,
    clock: Option<Arc<dyn Clock>>,
    disk_dir: Option<PathBuf>,
    disk_expiry_interval: Option<Duration>,
    listeners: Vec<Arc<dyn CacheEventListener<K, V>>>,
}

impl<K: CacheKey, V: CacheValue> CacheBuilder<K, V> {
    pub fn new(name: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            name: name.into(),
            config,
            policy: None,
            clock: None,
            disk_dir: None,
            disk_expiry_interval: None,
            listeners: Vec::new(),
        }
    }

    /// Overrides the policy named by `config.eviction_policy`.
    #[must_use]
    pub fn eviction_policy(mut self, policy: Arc<dyn EvictionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Enables the disk tier, storing records under `dir`.
    #[must_use]
    pub fn disk_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.disk_dir = Some(dir.into());
        self
    }

    /// Sub-second reaper intervals for tests; the config only speaks seconds.
    #[must_use]
    pub const fn disk_expiry_interval(mut self, interval: Duration) -> Self {
        self.disk_expiry_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn listener(mut self, listener: Arc<dyn CacheEventListener<K, V>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// # Errors
    /// [`CacheError::InvalidConfig`] for a bad configuration, or a storage
    /// error if the disk directory cannot be opened or the reaper not started.
    pub fn build(self) -> Result<Cache<K, V>, CacheError> {
        self.config.validate()?;
        let reaper_interval = match self.disk_expiry_interval {
            Some(d) if d.is_zero() => {
                return Err(CacheError::InvalidConfig("disk expiry interval must be greater than 0".into()));
            }
            Some(d) => d,
            None => Duration::from_secs(self.config.disk_expiry_thread_interval_secs),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let policy = self.policy.unwrap_or_else(|| self.config.eviction_policy.build());
        let disk = match self.disk_dir {
            Some(dir) => Some(Arc::new(DiskStore::open(dir, self.config.max_elements_on_disk, Arc::clone(&clock))?)),
            None => None,
        };
        let listeners = Arc::new(RegisteredListeners::default());
        for l in self.listeners {
            listeners.register(l);
        }
        Cache::from_parts(CacheParts {
            name: self.name,
            config: self.config,
            policy,
            clock,
            disk,
            reaper_interval,
            listeners,
        })
    }
}
