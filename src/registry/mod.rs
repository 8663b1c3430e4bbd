mod config;
mod core;

pub use self::core::{CacheRegistry, METRICS_TARGET, ManagedCache};
pub use config::RegistryConfig;
