use crate::cache::CacheConfig;
use crate::errors::CacheError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Registry-wide settings, usually loaded from a TOML file:
///
/// ```toml
/// disk_root = "/var/cache/centralcache"
///
/// [default_cache]
/// max_elements_in_memory = 1000
///
/// [caches.jimcache]
/// max_elements_in_memory = 10
/// time_to_live_secs = 120
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Parent directory of every cache's disk tier. No disk tiers without it.
    pub disk_root: Option<PathBuf>,
    /// Used by `add_configured_cache` for names without their own section.
    pub default_cache: Option<CacheConfig>,
    pub caches: BTreeMap<String, CacheConfig>,
}

impl RegistryConfig {
    #[must_use]
    pub fn with_disk_root(disk_root: Option<PathBuf>) -> Self {
        Self { disk_root, ..Self::default() }
    }

    /// # Errors
    /// [`CacheError::ConfigFile`] if the text is not valid TOML for this shape,
    /// or [`CacheError::InvalidConfig`] if a cache section is invalid.
    pub fn from_toml_str(text: &str) -> Result<Self, CacheError> {
        let cfg: Self = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// As [`from_toml_str`](Self::from_toml_str), plus unreadable files.
    pub fn from_path(path: &Path) -> Result<Self, CacheError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::ConfigFile(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Config for `name`: its own section, else `default_cache`, else defaults.
    #[must_use]
    pub fn cache_config(&self, name: &str) -> CacheConfig {
        self.caches.get(name).or(self.default_cache.as_ref()).cloned().unwrap_or_default()
    }

    /// # Errors
    /// The first invalid cache section, named in the message.
    pub fn validate(&self) -> Result<(), CacheError> {
        if let Some(default) = &self.default_cache {
            default
                .validate()
                .map_err(|e| CacheError::InvalidConfig(format!("default_cache: {e}")))?;
        }
        for (name, cfg) in &self.caches {
            cfg.validate().map_err(|e| CacheError::InvalidConfig(format!("caches.{name}: {e}")))?;
        }
        Ok(())
    }
}
