//! Embeddable two-tier cache engine.
//!
//! A [`CacheRegistry`] owns named [`Cache`]s. Each cache keeps a bounded
//! memory tier and, when the registry has a disk root, spills eviction
//! victims to a bounded disk tier swept by a background reaper. Entries
//! expire by time-to-live, time-to-idle, or never. [`SelfPopulatingCache`]
//! adds read-through loading with one computation per missing key.
//!
//! ```no_run
//! use centralcache::{CacheConfig, CacheRegistry};
//!
//! let registry = CacheRegistry::new(Some("/tmp/centralcache".into()));
//! let cache = registry
//!     .add_cache::<String, String>(
//!         "jimcache",
//!         CacheConfig::new(10).time_to_live_secs(120).time_to_idle_secs(60).max_elements_on_disk(100),
//!     )
//!     .unwrap();
//! cache.put("Oranges".into(), "12".into()).unwrap();
//! assert_eq!(cache.get(&"Oranges".to_string()).unwrap().as_deref(), Some("12"));
//! registry.shutdown().unwrap();
//! ```

pub mod cache;
pub mod clock;
pub mod disk;
pub mod entry;
pub mod errors;
pub mod events;
pub mod eviction;
pub mod expiry;
pub mod fsutil;
pub mod logger;
pub mod registry;
pub mod self_populating;

pub use cache::{Cache, CacheBuilder, CacheConfig, CacheStatistics, Status};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use entry::{CacheKey, CacheValue, Entry, EntryStats};
pub use errors::{CacheError, ErrorKind};
pub use events::{CacheEvent, CacheEventListener};
pub use eviction::{EvictionKey, EvictionPolicy, EvictionPolicyKind, FifoPolicy, LfuPolicy, LruPolicy};
pub use expiry::ExpiryPolicy;
pub use registry::{CacheRegistry, RegistryConfig};
pub use self_populating::{EntryFactory, SelfPopulatingCache, SelfPopulatingStatistics};

/// Configures logging from `CENTRALCACHE_LOG_*` environment variables.
///
/// # Errors
/// Returns an error if the log directory or files cannot be created.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    logger::configure_from_env()
}
