use crate::errors::CacheError;
use crate::eviction::EvictionPolicyKind;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ELEMENTS_IN_MEMORY: usize = 10_000;
pub const DEFAULT_DISK_EXPIRY_INTERVAL_SECS: u64 = 120;

/// Configuration for one cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hard cap on entries held in memory. Must be positive.
    pub max_elements_in_memory: usize,
    /// Entries never expire when set; TTL and TTI are ignored.
    pub eternal: bool,
    /// Maximum age since creation. 0 disables the ceiling.
    pub time_to_live_secs: u64,
    /// Maximum time since last access. 0 disables the ceiling.
    pub time_to_idle_secs: u64,
    /// Seconds between disk expiry sweeps. Must be positive.
    pub disk_expiry_thread_interval_secs: u64,
    /// Hard cap on entries held on disk. 0 means unbounded.
    pub max_elements_on_disk: usize,
    pub eviction_policy: EvictionPolicyKind,
    /// Spill memory victims to disk when the owning registry has a disk root.
    pub overflow_to_disk: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_elements_in_memory: DEFAULT_MAX_ELEMENTS_IN_MEMORY,
            eternal: false,
            time_to_live_secs: 0,
            time_to_idle_secs: 0,
            disk_expiry_thread_interval_secs: DEFAULT_DISK_EXPIRY_INTERVAL_SECS,
            max_elements_on_disk: 0,
            eviction_policy: EvictionPolicyKind::Lru,
            overflow_to_disk: true,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn new(max_elements_in_memory: usize) -> Self {
        Self { max_elements_in_memory, ..Default::default() }
    }

    #[must_use]
    pub const fn eternal(mut self, eternal: bool) -> Self {
        self.eternal = eternal;
        self
    }

    #[must_use]
    pub const fn time_to_live_secs(mut self, secs: u64) -> Self {
        self.time_to_live_secs = secs;
        self
    }

    #[must_use]
    pub const fn time_to_idle_secs(mut self, secs: u64) -> Self {
        self.time_to_idle_secs = secs;
        self
    }

    #[must_use]
    pub const fn disk_expiry_thread_interval_secs(mut self, secs: u64) -> Self {
        self.disk_expiry_thread_interval_secs = secs;
        self
    }

    #[must_use]
    pub const fn max_elements_on_disk(mut self, max: usize) -> Self {
        self.max_elements_on_disk = max;
        self
    }

    #[must_use]
    pub const fn eviction_policy(mut self, kind: EvictionPolicyKind) -> Self {
        self.eviction_policy = kind;
        self
    }

    #[must_use]
    pub const fn overflow_to_disk(mut self, enabled: bool) -> Self {
        self.overflow_to_disk = enabled;
        self
    }

    /// Rejects bounds the engine cannot honor.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.max_elements_in_memory == 0 {
            return Err(CacheError::InvalidConfig(
                "max_elements_in_memory must be greater than 0".into(),
            ));
        }
        if self.disk_expiry_thread_interval_secs == 0 {
            return Err(CacheError::InvalidConfig(
                "disk_expiry_thread_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
