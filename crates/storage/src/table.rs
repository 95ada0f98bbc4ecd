//! In-memory LWW table for fast key lookups.
//!
//! Unlike vector-clock stores there are no siblings: each key holds exactly
//! one version, and an incoming write either supersedes it (timestamp ≥
//! stored) or is silently dropped. This is what makes out-of-order repair
//! and hint deliveries safe to apply directly.

use meshkv_common::VersionedValue;
use std::collections::HashMap;

/// In-memory key-value table with node-level last-write-wins.
#[derive(Debug, Default)]
pub struct LwwTable {
    data: HashMap<String, VersionedValue>,
}

impl LwwTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for a key, if any.
    pub fn get(&self, key: &str) -> Option<&VersionedValue> {
        self.data.get(key)
    }

    /// Apply a write under LWW. Returns `true` if the value was stored,
    /// `false` if it was stale and dropped (not an error).
    pub fn put(&mut self, key: &str, value: VersionedValue) -> bool {
        match self.data.get(key) {
            Some(current) if !value.supersedes(current) => false,
            _ => {
                self.data.insert(key.to_string(), value);
                true
            }
        }
    }

    /// Apply a replayed WAL record. Replay is in append order, so the
    /// regular LWW check yields the same final state.
    pub fn load_from_wal(&mut self, key: &str, value: VersionedValue) {
        self.put(key, value);
    }

    /// Store unconditionally, bypassing the LWW check. Used by the CAS
    /// commit path, where the compare has already decided the outcome.
    pub fn insert(&mut self, key: &str, value: VersionedValue) {
        self.data.insert(key.to_string(), value);
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
