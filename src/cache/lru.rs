// src/cache/lru.rs

//! Capacity-bounded LRU map with a per-entry time-to-live.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
    /// Recency stamp; larger is more recent.
    tick: u64,
}

/// LRU with TTL. Expired entries are dropped lazily on access, or eagerly
/// through [`TtlLru::purge_expired`].
#[derive(Debug)]
pub struct TtlLru<K, V> {
    capacity: usize,
    ttl: Duration,
    slots: HashMap<K, Slot<V>>,
    recency: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K, V> TtlLru<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            slots: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up `key`, refreshing its recency. Expired entries are removed
    /// and reported as misses.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = Instant::now();
        let tick = self.bump();

        let slot = self.slots.get_mut(key)?;
        if slot.expires_at <= now {
            let stale = slot.tick;
            self.slots.remove(key);
            self.recency.remove(&stale);
            trace!("lru entry expired on access");
            return None;
        }

        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, key.clone());
        Some(slot.value.clone())
    }

    /// Insert or replace `key`, evicting the least recently used entry when
    /// full.
    pub fn insert(&mut self, key: K, value: V) {
        let tick = self.bump();
        let expires_at = Instant::now() + self.ttl;

        if let Some(old) = self.slots.remove(&key) {
            self.recency.remove(&old.tick);
        }

        while self.slots.len() >= self.capacity {
            let Some((_, victim)) = self.recency.pop_first() else {
                break;
            };
            self.slots.remove(&victim);
            trace!("lru evicted least recently used entry");
        }

        self.recency.insert(tick, key.clone());
        self.slots.insert(
            key,
            Slot {
                value,
                expires_at,
                tick,
            },
        );
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.slots.remove(key)?;
        self.recency.remove(&slot.tick);
        Some(slot.value)
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.recency.clear();
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired: Vec<(K, u64)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.expires_at <= now)
            .map(|(k, slot)| (k.clone(), slot.tick))
            .collect();

        for (key, tick) in &expired {
            self.slots.remove(key);
            self.recency.remove(tick);
        }
        expired.len()
    }

    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }
}
