//! Cache event notifications.

use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent<K, V> {
    Put { key: K, value: V },
    Updated { key: K, value: V },
    Removed { key: K },
    /// Dropped because its TTL or TTI ran out, from either tier.
    Expired { key: K },
    /// Pushed out of memory to honor the bound. `spilled` is true when the
    /// entry moved to disk instead of being discarded.
    Evicted { key: K, spilled: bool },
    /// Pushed out of the disk tier to honor its bound.
    DiskEvicted { key: K },
    Cleared,
}

/// Receives events after the cache lock has been released, so listeners may
/// call back into the cache.
pub trait CacheEventListener<K, V>: Send + Sync {
    fn on_event(&self, event: &CacheEvent<K, V>);
}

pub struct RegisteredListeners<K, V> {
    listeners: RwLock<Vec<Arc<dyn CacheEventListener<K, V>>>>,
}

impl<K, V> Default for RegisteredListeners<K, V> {
    fn default() -> Self {
        Self { listeners: RwLock::new(Vec::new()) }
    }
}

impl<K, V> RegisteredListeners<K, V> {
    pub fn register(&self, listener: Arc<dyn CacheEventListener<K, V>>) {
        self.listeners.write().push(listener);
    }

    #[must_use]
    pub fn has_listeners(&self) -> bool {
        !self.listeners.read().is_empty()
    }

    pub fn notify_all(&self, events: &[CacheEvent<K, V>]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for event in events {
            for l in &listeners {
                l.on_event(event);
            }
        }
    }
}
