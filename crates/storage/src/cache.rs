//! Bounded LRU cache for node-local reads.
//!
//! Purely a performance layer in front of the engine: entries are
//! overwritten on every local PUT of the same key, so the cache can never
//! answer with data a direct engine read would not also produce. Bounded
//! both by entry count and by estimated byte size; the least recently used
//! entry is evicted on overflow.

use meshkv_common::VersionedValue;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct CacheSlot {
    value: VersionedValue,
    cost: usize,
    tick: u64,
}

/// An LRU cache keyed by the store's string keys.
#[derive(Debug)]
pub struct LruCache {
    max_items: usize,
    max_bytes: usize,
    slots: HashMap<String, CacheSlot>,
    /// Recency index: tick -> key. Smallest tick is least recently used.
    recency: BTreeMap<u64, String>,
    size_bytes: usize,
    next_tick: u64,
}

/// Estimate the byte cost of an entry: key bytes plus serialized value.
fn entry_cost(key: &str, value: &VersionedValue) -> usize {
    let value_bytes = serde_json::to_vec(value).map(|b| b.len()).unwrap_or(32);
    key.len() + value_bytes
}

impl LruCache {
    pub fn new(max_items: usize, max_bytes: usize) -> Self {
        Self {
            max_items,
            max_bytes,
            slots: HashMap::new(),
            recency: BTreeMap::new(),
            size_bytes: 0,
            next_tick: 0,
        }
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Look up a key, refreshing its recency on hit.
    pub fn get(&mut self, key: &str) -> Option<VersionedValue> {
        let tick = self.bump();
        let slot = self.slots.get_mut(key)?;
        self.recency.remove(&slot.tick);
        slot.tick = tick;
        self.recency.insert(tick, key.to_string());
        Some(slot.value.clone())
    }

    /// Insert or overwrite a key (write-through from the engine).
    pub fn put(&mut self, key: &str, value: VersionedValue) {
        if self.max_items == 0 {
            return;
        }
        if let Some(old) = self.slots.remove(key) {
            self.recency.remove(&old.tick);
            self.size_bytes -= old.cost;
        }

        let cost = entry_cost(key, &value);
        let tick = self.bump();
        self.slots
            .insert(key.to_string(), CacheSlot { value, cost, tick });
        self.recency.insert(tick, key.to_string());
        self.size_bytes += cost;
        self.evict();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Evict least-recently-used entries until both bounds hold.
    fn evict(&mut self) {
        while self.size_bytes > self.max_bytes || self.slots.len() > self.max_items {
            let Some((&tick, _)) = self.recency.iter().next() else {
                break;
            };
            if let Some(key) = self.recency.remove(&tick) {
                if let Some(slot) = self.slots.remove(&key) {
                    self.size_bytes -= slot.cost;
                }
            }
        }
    }
}
