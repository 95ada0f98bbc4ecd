//! Storage engine: combines WAL + LWW table.
//!
//! All writes go through the WAL first (for durability), then into the
//! in-memory table. The engine also hosts the node-local CAS primitive:
//! callers hold the engine behind a single lock, so the compare and the
//! commit are one critical section.

use crate::record::StorageRecord;
use crate::table::LwwTable;
use crate::wal::{FsyncPolicy, Wal, WalError};
use meshkv_common::VersionedValue;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a node-local compare-and-swap.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The compare matched and the new value was committed.
    Applied,
    /// The compare failed; carries the current value (None if absent).
    Mismatch(Option<VersionedValue>),
}

/// The storage engine. All operations are synchronous (blocking I/O).
/// The async boundary is at the caller (the HTTP layer).
#[derive(Debug)]
pub struct StorageEngine {
    table: LwwTable,
    wal: Wal,
    #[allow(dead_code)] // will be used for WAL rotation/compaction
    wal_path: PathBuf,
}

impl StorageEngine {
    /// Open or create a storage engine at the given directory.
    pub fn open(data_dir: &Path, fsync: FsyncPolicy) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let wal_path = data_dir.join("wal.log");

        // Replay WAL to rebuild the table
        let records = Wal::replay(&wal_path)?;
        let mut table = LwwTable::new();
        for record in records {
            table.load_from_wal(&record.key, record.value);
        }

        let wal = Wal::open(&wal_path, fsync)?;

        tracing::info!(
            "storage engine opened: {} keys recovered from WAL at {:?}",
            table.len(),
            wal_path
        );

        Ok(Self {
            table,
            wal,
            wal_path,
        })
    }

    /// Current value for a key.
    pub fn get(&self, key: &str) -> Option<&VersionedValue> {
        self.table.get(key)
    }

    /// Apply a write under node-level LWW. Stale writes are dropped without
    /// touching the WAL; returns whether the value was stored.
    pub fn put(&mut self, key: &str, value: VersionedValue) -> Result<bool, StorageError> {
        if let Some(current) = self.table.get(key) {
            if !value.supersedes(current) {
                return Ok(false);
            }
        }
        self.wal
            .append(&StorageRecord::new(key.to_string(), value.clone()))?;
        self.table.insert(key, value);
        Ok(true)
    }

    /// Compare-and-swap: commit `new` iff the stored envelope equals
    /// `expected` (`None` = key must be absent). The caller serializes
    /// access, so compare and commit are atomic with respect to other
    /// engine operations.
    pub fn cas(
        &mut self,
        key: &str,
        expected: Option<&VersionedValue>,
        new: VersionedValue,
    ) -> Result<CasOutcome, StorageError> {
        let current = self.table.get(key);
        let matches = match (current, expected) {
            (None, None) => true,
            (Some(c), Some(e)) => c == e,
            _ => false,
        };

        if !matches {
            return Ok(CasOutcome::Mismatch(current.cloned()));
        }

        self.wal
            .append(&StorageRecord::new(key.to_string(), new.clone()))?;
        self.table.insert(key, new);
        Ok(CasOutcome::Applied)
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.table.len()
    }

    /// Sync the WAL to disk (for batch fsync mode).
    pub fn sync(&mut self) -> Result<(), StorageError> {
        self.wal.sync()?;
        Ok(())
    }
}
