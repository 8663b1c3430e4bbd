//! Victim selection for the memory tier.

use crate::entry::EntryStats;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Position of an entry in a policy's eviction order; smaller goes first.
pub type EvictionKey = (u64, u64, u64);

/// Orders entries by eviction priority.
///
/// `compare(a, b) == Ordering::Less` means `a` goes before `b`. The ordering
/// must be total over distinct entries of one tier (`seq` is unique there).
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn compare(&self, a: &EntryStats, b: &EntryStats) -> Ordering;

    /// A key whose natural order matches [`compare`](Self::compare) and which
    /// is unique per entry of a tier. When provided, the memory tier keeps
    /// entries in an ordered index and finds victims in `O(log n)`; policies
    /// returning `None` are served by a scan over the tier.
    fn sort_key(&self, _stats: &EntryStats) -> Option<EvictionKey> {
        None
    }
}

/// Picks the entry the policy ranks first, `None` for an empty tier.
pub fn select_victim<'a, K: 'a>(
    policy: &dyn EvictionPolicy,
    entries: impl IntoIterator<Item = (&'a K, &'a EntryStats)>,
) -> Option<&'a K> {
    entries.into_iter().min_by(|(_, a), (_, b)| policy.compare(a, b)).map(|(k, _)| k)
}

/// Least recently used: oldest access time, then oldest access order.
///
/// Ties on `last_accessed_at` go to `access_seq` before `created_at`, so
/// accesses within one millisecond keep their real order. Creation time only
/// matters through `seq` for entries never read since insertion.
#[derive(Debug, Default, Clone, Copy)]
pub struct LruPolicy;

impl EvictionPolicy for LruPolicy {
    fn name(&self) -> &'static str {
        "LRU"
    }

    fn compare(&self, a: &EntryStats, b: &EntryStats) -> Ordering {
        a.last_accessed_at
            .cmp(&b.last_accessed_at)
            .then(a.access_seq.cmp(&b.access_seq))
            .then(a.seq.cmp(&b.seq))
    }

    fn sort_key(&self, stats: &EntryStats) -> Option<EvictionKey> {
        Some((stats.last_accessed_at.as_millis(), stats.access_seq, stats.seq))
    }
}

/// Least frequently used, falling back to LRU among equal hit counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LfuPolicy;

impl EvictionPolicy for LfuPolicy {
    fn name(&self) -> &'static str {
        "LFU"
    }

    fn compare(&self, a: &EntryStats, b: &EntryStats) -> Ordering {
        a.hit_count.cmp(&b.hit_count).then_with(|| LruPolicy.compare(a, b))
    }

    fn sort_key(&self, stats: &EntryStats) -> Option<EvictionKey> {
        // access_seq is unique per tier, so seq never decides.
        Some((stats.hit_count, stats.last_accessed_at.as_millis(), stats.access_seq))
    }
}

/// First in, first out.
#[derive(Debug, Default, Clone, Copy)]
pub struct FifoPolicy;

impl EvictionPolicy for FifoPolicy {
    fn name(&self) -> &'static str {
        "FIFO"
    }

    fn compare(&self, a: &EntryStats, b: &EntryStats) -> Ordering {
        a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq))
    }

    fn sort_key(&self, stats: &EntryStats) -> Option<EvictionKey> {
        Some((stats.created_at.as_millis(), stats.seq, 0))
    }
}

/// Serializable selector for the built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicyKind {
    #[default]
    Lru,
    Lfu,
    Fifo,
}

impl EvictionPolicyKind {
    #[must_use]
    pub fn build(self) -> Arc<dyn EvictionPolicy> {
        match self {
            Self::Lru => Arc::new(LruPolicy),
            Self::Lfu => Arc::new(LfuPolicy),
            Self::Fifo => Arc::new(FifoPolicy),
        }
    }
}
