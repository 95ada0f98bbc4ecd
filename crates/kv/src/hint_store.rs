//! In-memory store for hinted-handoff hints.
//!
//! Each hint represents a write that could not be delivered to its intended
//! replica node. The coordinator owns no durable state, so hints live in
//! memory and do not survive a coordinator crash; a crashed coordinator's
//! undelivered hints heal later via read-repair.
//!
//! One hint per (target, key): a newer write for the same key replaces the
//! queued one, since delivering the superseded value would be dropped by
//! the node's LWW check anyway.

use meshkv_common::VersionedValue;
use std::collections::{HashMap, HashSet};

/// A hint: a write that needs to be delivered to a specific target node.
#[derive(Debug, Clone, PartialEq)]
pub struct Hint {
    pub target_node_id: String,
    pub key: String,
    pub value: VersionedValue,
    pub enqueued_at_ms: u64,
}

/// Pending hints, grouped by target node.
#[derive(Debug, Default)]
pub struct HintStore {
    /// target node id -> key -> hint
    hints: HashMap<String, HashMap<String, Hint>>,
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl HintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a hint for a target node. A hint already queued for the same
    /// (target, key) is replaced only if the new value supersedes it.
    pub fn store_hint(&mut self, target: &str, key: &str, value: &VersionedValue) {
        let per_target = self.hints.entry(target.to_string()).or_default();
        if let Some(existing) = per_target.get(key) {
            if !value.supersedes(&existing.value) {
                return;
            }
        }
        per_target.insert(
            key.to_string(),
            Hint {
                target_node_id: target.to_string(),
                key: key.to_string(),
                value: value.clone(),
                enqueued_at_ms: now_ms(),
            },
        );
    }

    /// All hints destined for a target node, oldest first.
    pub fn hints_for_node(&self, target: &str) -> Vec<Hint> {
        let mut hints: Vec<Hint> = self
            .hints
            .get(target)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        hints.sort_by_key(|h| h.enqueued_at_ms);
        hints
    }

    /// Remove a delivered hint — unless a newer value was queued for the
    /// same (target, key) while delivery was in flight; that one still
    /// needs to go out.
    pub fn ack_delivered(&mut self, target: &str, key: &str, delivered: &VersionedValue) {
        if let Some(per_target) = self.hints.get_mut(target) {
            let replaced_mid_flight = per_target
                .get(key)
                .is_some_and(|h| h.value.cmp_lww(delivered) == std::cmp::Ordering::Greater);
            if !replaced_mid_flight {
                per_target.remove(key);
            }
            if per_target.is_empty() {
                self.hints.remove(target);
            }
        }
    }

    /// Drop every hint queued for a target, e.g. a node that left the ring.
    pub fn delete_target(&mut self, target: &str) {
        self.hints.remove(target);
    }

    /// All distinct target node ids with pending hints.
    pub fn all_target_nodes(&self) -> HashSet<String> {
        self.hints.keys().cloned().collect()
    }

    /// Total number of pending hints.
    pub fn hint_count(&self) -> usize {
        self.hints.values().map(HashMap::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
