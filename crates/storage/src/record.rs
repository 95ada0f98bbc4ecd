//! Storage record format.

use meshkv_common::VersionedValue;
use serde::{Deserialize, Serialize};

/// A record as written to the WAL and held in the in-memory table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageRecord {
    /// The key (opaque string, namespacing owned by callers).
    pub key: String,
    /// The timestamped value envelope.
    pub value: VersionedValue,
}

impl StorageRecord {
    pub fn new(key: String, value: VersionedValue) -> Self {
        Self { key, value }
    }
}
