//! TTL / TTI expiry.
//!
//! An entry expires once `now - created_at` reaches the time-to-live, or once
//! `now - last_accessed_at` reaches the time-to-idle. A zero duration disables
//! the corresponding ceiling. `eternal` overrides both.

use crate::cache::CacheConfig;
use crate::clock::Timestamp;
use crate::entry::EntryStats;
use std::time::Duration;

#[must_use]
pub fn is_expired(stats: &EntryStats, now: Timestamp, ttl: Duration, tti: Duration, eternal: bool) -> bool {
    if eternal {
        return false;
    }
    if !ttl.is_zero() && now.saturating_since(stats.created_at) >= ttl {
        return true;
    }
    !tti.is_zero() && now.saturating_since(stats.last_accessed_at) >= tti
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpiryPolicy {
    pub eternal: bool,
    pub time_to_live: Duration,
    pub time_to_idle: Duration,
}

impl ExpiryPolicy {
    #[must_use]
    pub const fn new(eternal: bool, time_to_live: Duration, time_to_idle: Duration) -> Self {
        Self { eternal, time_to_live, time_to_idle }
    }

    #[must_use]
    pub const fn eternal() -> Self {
        Self::new(true, Duration::ZERO, Duration::ZERO)
    }

    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.eternal,
            Duration::from_secs(config.time_to_live_secs),
            Duration::from_secs(config.time_to_idle_secs),
        )
    }

    #[must_use]
    pub fn is_expired(&self, stats: &EntryStats, now: Timestamp) -> bool {
        is_expired(stats, now, self.time_to_live, self.time_to_idle, self.eternal)
    }

    /// True when no entry can ever expire under this policy.
    #[must_use]
    pub fn never_expires(&self) -> bool {
        self.eternal || (self.time_to_live.is_zero() && self.time_to_idle.is_zero())
    }

    /// The first instant at which `stats` counts as expired, if any.
    #[must_use]
    pub fn expiration_time(&self, stats: &EntryStats) -> Option<Timestamp> {
        if self.eternal {
            return None;
        }
        let by_ttl = (!self.time_to_live.is_zero())
            .then(|| stats.created_at.saturating_add(self.time_to_live));
        let by_tti = (!self.time_to_idle.is_zero())
            .then(|| stats.last_accessed_at.saturating_add(self.time_to_idle));
        match (by_ttl, by_tti) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
