use crate::clock::Timestamp;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Bounds every cache key satisfies. Keys must be serializable so they can
/// follow their value into the disk tier.
pub trait CacheKey: Hash + Eq + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Hash + Eq + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Access metadata kept alongside each value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStats {
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub hit_count: u64,
    /// Insertion order within the owning tier.
    pub seq: u64,
    /// Tier-local counter bumped on every insert or hit. Orders accesses that
    /// share a millisecond.
    #[serde(default)]
    pub access_seq: u64,
}

impl EntryStats {
    #[must_use]
    pub const fn new(now: Timestamp, seq: u64) -> Self {
        Self { created_at: now, last_accessed_at: now, hit_count: 0, seq, access_seq: seq }
    }

    pub fn touch(&mut self, now: Timestamp, access_seq: u64) {
        self.last_accessed_at = now;
        self.access_seq = access_seq;
        self.hit_count = self.hit_count.saturating_add(1);
    }
}

/// A cached key/value pair with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
    pub stats: EntryStats,
}

impl<K, V> Entry<K, V> {
    #[must_use]
    pub const fn new(key: K, value: V, stats: EntryStats) -> Self {
        Self { key, value, stats }
    }

    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }
}
