//! meshkv-common: shared types for the meshkv project.
//!
//! Provides the `{_ts, data}` LWW envelope that every replica stores,
//! plus the `RingNode` descriptor used by the ring and the coordinator.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ---------------------------------------------------------------------------
// VersionedValue
// ---------------------------------------------------------------------------

/// A timestamped value: the unit of replication and conflict resolution.
///
/// Serialized on the wire and in the WAL as `{"_ts": <float>, "data": <json>}`.
/// The value with the strictly greater timestamp wins; ties are broken by
/// byte comparison of the serialized payload so that all replicas converge
/// on the same winner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionedValue {
    #[serde(rename = "_ts")]
    pub ts: f64,
    pub data: serde_json::Value,
}

impl VersionedValue {
    /// Wrap a payload with an explicit timestamp.
    pub fn at(ts: f64, data: serde_json::Value) -> Self {
        Self { ts, data }
    }

    /// Wrap a payload with the current wall-clock timestamp.
    pub fn now(data: serde_json::Value) -> Self {
        Self {
            ts: now_ts(),
            data,
        }
    }

    /// Normalize an arbitrary wire value into an envelope.
    ///
    /// A well-formed `{"_ts": .., "data": ..}` object is taken as-is.
    /// Anything else is treated as a bare payload at timestamp 0.0, so any
    /// enveloped write supersedes it.
    pub fn from_wire(raw: serde_json::Value) -> Self {
        if let serde_json::Value::Object(ref map) = raw {
            if map.contains_key("_ts") && map.contains_key("data") {
                if let Ok(vv) = serde_json::from_value::<VersionedValue>(raw.clone()) {
                    return vv;
                }
            }
        }
        Self { ts: 0.0, data: raw }
    }

    /// Total LWW order: timestamp first, serialized payload bytes as the
    /// deterministic tie-break.
    pub fn cmp_lww(&self, other: &Self) -> Ordering {
        match self.ts.partial_cmp(&other.ts) {
            Some(Ordering::Equal) | None => {
                let a = serde_json::to_vec(&self.data).unwrap_or_default();
                let b = serde_json::to_vec(&other.data).unwrap_or_default();
                a.cmp(&b)
            }
            Some(ord) => ord,
        }
    }

    /// Whether this value should replace `other` under node-level LWW.
    /// Equal timestamps are accepted (absorbs idempotent repair/hint writes).
    pub fn supersedes(&self, other: &Self) -> bool {
        self.ts >= other.ts
    }
}

// ---------------------------------------------------------------------------
// RingNode
// ---------------------------------------------------------------------------

/// A storage backend as seen by the ring and the coordinator.
///
/// The node set is fixed at startup; there is no membership protocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RingNode {
    /// Stable identifier, used for ring hashing and hint addressing.
    pub id: String,
    /// Base URL of the node's HTTP surface, e.g. `http://kvstore-a:9000`.
    pub url: String,
}

impl RingNode {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

impl fmt::Display for RingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.id, self.url)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Current wall-clock time as fractional seconds since the epoch.
pub fn now_ts() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
