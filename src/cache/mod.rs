mod builder;
mod config;
mod core;
mod memory;
mod metrics;

pub use builder::CacheBuilder;
pub use config::{CacheConfig, DEFAULT_DISK_EXPIRY_INTERVAL_SECS, DEFAULT_MAX_ELEMENTS_IN_MEMORY};
pub use self::core::{Cache, Status};
pub use metrics::{CacheMetrics, CacheStatistics};
