use std::time::Duration;
use thiserror::Error;

/// Broad category of a [`CacheError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Storage,
    Computation,
}

/// Errors raised by caches, the disk tier and the registry.
///
/// Messages are stored as strings so a single failure can be cloned and
/// handed to every caller waiting on the same computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache already exists: {0}")]
    DuplicateCache(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Registry is closed")]
    RegistryClosed,

    #[error("Cache is shut down: {0}")]
    CacheShutdown(String),

    #[error("Cache not found: {0}")]
    NoSuchCache(String),

    #[error("Cache {0} was registered with different key/value types")]
    TypeMismatch(String),

    #[error("Config file error: {0}")]
    ConfigFile(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Corrupt disk record: {0}")]
    CorruptRecord(String),

    #[error("Computation failed: {0}")]
    Computation(String),

    #[error("Timed out after {0:?} waiting for an in-flight computation")]
    WaitTimedOut(Duration),
}

impl CacheError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateCache(_)
            | Self::InvalidConfig(_)
            | Self::RegistryClosed
            | Self::CacheShutdown(_)
            | Self::NoSuchCache(_)
            | Self::TypeMismatch(_)
            | Self::ConfigFile(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Encode(_) | Self::Decode(_) | Self::CorruptRecord(_) => {
                ErrorKind::Storage
            }
            Self::Computation(_) | Self::WaitTimedOut(_) => ErrorKind::Computation,
        }
    }

    #[must_use]
    pub fn is_storage(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for CacheError {
    fn from(e: bincode::error::EncodeError) -> Self {
        Self::Encode(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for CacheError {
    fn from(e: bincode::error::DecodeError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(e: toml::de::Error) -> Self {
        Self::ConfigFile(e.to_string())
    }
}
