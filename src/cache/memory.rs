use crate::clock::Timestamp;
use crate::entry::EntryStats;
use crate::eviction::{EvictionKey, EvictionPolicy, select_victim};
use crate::expiry::ExpiryPolicy;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) struct Slot<V> {
    pub value: V,
    pub stats: EntryStats,
}

/// Memory tier. Always accessed under the owning cache's lock.
///
/// When the policy supplies sort keys, `order` mirrors `entries` so the next
/// victim is the first key of a `BTreeMap`. Every change to a slot's stats
/// goes through this type to keep the two in step.
#[derive(Debug)]
pub(crate) struct MemoryStore<K, V> {
    entries: HashMap<K, Slot<V>>,
    order: Option<BTreeMap<EvictionKey, K>>,
    policy: Arc<dyn EvictionPolicy>,
    next_seq: u64,
    pub alive: bool,
}

impl<K: Hash + Eq + Clone, V> MemoryStore<K, V> {
    pub fn new(capacity: usize, policy: Arc<dyn EvictionPolicy>) -> Self {
        let indexed = policy.sort_key(&EntryStats::new(Timestamp::default(), 0)).is_some();
        Self {
            // The bound can be large; don't reserve all of it up front.
            entries: HashMap::with_capacity(capacity.min(1024)),
            order: indexed.then(BTreeMap::new),
            policy,
            next_seq: 0,
            alive: true,
        }
    }

    pub fn next_seq(&mut self) -> u64 {
        let s = self.next_seq;
        self.next_seq += 1;
        s
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &K) -> Option<&Slot<V>> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    fn index(&mut self, key: &K, stats: &EntryStats) {
        if let (Some(order), Some(sk)) = (self.order.as_mut(), self.policy.sort_key(stats)) {
            order.insert(sk, key.clone());
        }
    }

    fn unindex(&mut self, stats: &EntryStats) {
        if let (Some(order), Some(sk)) = (self.order.as_mut(), self.policy.sort_key(stats)) {
            order.remove(&sk);
        }
    }

    /// Inserts or replaces `key`, returning the previous slot.
    pub fn insert(&mut self, key: K, slot: Slot<V>) -> Option<Slot<V>> {
        let stats = slot.stats;
        let previous = self.entries.insert(key.clone(), slot);
        if let Some(prev) = &previous {
            self.unindex(&prev.stats);
        }
        self.index(&key, &stats);
        previous
    }

    pub fn remove(&mut self, key: &K) -> Option<Slot<V>> {
        let slot = self.entries.remove(key)?;
        self.unindex(&slot.stats);
        Some(slot)
    }

    /// Records a hit on `key` at `now` and returns the refreshed slot.
    pub fn touch(&mut self, key: &K, now: Timestamp) -> Option<&Slot<V>> {
        let old = self.entries.get(key)?.stats;
        let access_seq = self.next_seq();
        self.unindex(&old);
        let mut stats = old;
        stats.touch(now, access_seq);
        self.index(key, &stats);
        let slot = self.entries.get_mut(key)?;
        slot.stats = stats;
        Some(&*slot)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if let Some(order) = self.order.as_mut() {
            order.clear();
        }
    }

    pub fn drain(&mut self) -> Vec<(K, Slot<V>)> {
        if let Some(order) = self.order.as_mut() {
            order.clear();
        }
        self.entries.drain().collect()
    }

    pub fn select_victim(&self) -> Option<K> {
        match &self.order {
            Some(order) => order.first_key_value().map(|(_, k)| k.clone()),
            None => select_victim(self.policy.as_ref(), self.entries.iter().map(|(k, slot)| (k, &slot.stats))).cloned(),
        }
    }

    pub fn expired_keys(&self, expiry: &ExpiryPolicy, now: Timestamp) -> Vec<K> {
        if expiry.never_expires() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|(_, slot)| expiry.is_expired(&slot.stats, now))
            .map(|(k, _)| k.clone())
            .collect()
    }
}
