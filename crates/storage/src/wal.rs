//! Append-only write-ahead log.
//!
//! Frame layout: `[crc32 LE (4)][payload length LE (4)][JSON payload][\n]`.
//! Replay tolerates a torn tail: an incomplete or checksum-failing frame
//! ends recovery with a warning rather than an error, so a crash
//! mid-append never leaves the node unable to start.

use crate::record::StorageRecord;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const FRAME_HEADER_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum WalError {
    #[error("WAL I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("WAL serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Fsync policy for the WAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// Fsync after every write.
    Always,
    /// Fsync periodically (caller controls).
    Batch,
    /// Never explicitly fsync (OS decides).
    None,
}

impl FsyncPolicy {
    pub fn from_str_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "always" => Self::Always,
            "none" => Self::None,
            _ => Self::Batch,
        }
    }
}

/// An append-only write-ahead log.
#[derive(Debug)]
pub struct Wal {
    writer: BufWriter<File>,
    #[allow(dead_code)] // will be used for WAL rotation
    path: PathBuf,
    fsync: FsyncPolicy,
    entries_written: u64,
}

impl Wal {
    /// Open or create a WAL file at the given path.
    pub fn open(path: &Path, fsync: FsyncPolicy) -> Result<Self, WalError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            fsync,
            entries_written: 0,
        })
    }

    /// Append a record to the WAL.
    pub fn append(&mut self, record: &StorageRecord) -> Result<(), WalError> {
        let payload = serde_json::to_vec(record)?;

        // Build the whole frame before writing so a frame is never
        // interleaved with another writer's partial output.
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len() + 1);
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        frame.push(b'\n');

        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        if self.fsync == FsyncPolicy::Always {
            self.writer.get_ref().sync_all()?;
        }

        self.entries_written += 1;
        Ok(())
    }

    /// Explicitly fsync the WAL (for batch mode).
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Number of entries written since open.
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    /// Replay all intact frames from a WAL file, in append order.
    pub fn replay(path: &Path) -> Result<Vec<StorageRecord>, WalError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(WalError::Io(e)),
        };

        let mut reader = BufReader::new(file);
        let mut records = Vec::new();
        while let Some(payload) = next_frame(&mut reader, records.len())? {
            records.push(serde_json::from_slice(&payload)?);
        }
        Ok(records)
    }
}

/// Read one frame's payload. `None` means the log ended, either cleanly
/// or with a torn/corrupt tail (logged, not an error).
fn next_frame(reader: &mut impl Read, index: usize) -> Result<Option<Vec<u8>>, WalError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let got = fill(reader, &mut header)?;
    if got == 0 {
        return Ok(None);
    }
    if got < FRAME_HEADER_LEN {
        tracing::warn!("WAL torn mid-header at frame {}; stopping replay", index);
        return Ok(None);
    }

    let stored_crc = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;

    // Payload plus the trailing newline
    let mut body = vec![0u8; len + 1];
    let got = fill(reader, &mut body)?;
    if got < body.len() {
        tracing::warn!("WAL torn mid-frame at frame {}; stopping replay", index);
        return Ok(None);
    }
    body.truncate(len);

    let actual_crc = crc32fast::hash(&body);
    if actual_crc != stored_crc {
        tracing::warn!(
            "WAL checksum mismatch at frame {} (stored {:#010x}, computed {:#010x}); stopping replay",
            index,
            stored_crc,
            actual_crc
        );
        return Ok(None);
    }

    Ok(Some(body))
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshkv_common::VersionedValue;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_record(key: &str, ts: f64, value: &str) -> StorageRecord {
        StorageRecord::new(key.to_string(), VersionedValue::at(ts, json!(value)))
    }

    #[test]
    fn test_wal_write_and_replay() {
        let dir = TempDir::new().unwrap();
        let wal_path = dir.path().join("test.wal");

        // Write
        {
            let mut wal = Wal::open(&wal_path, FsyncPolicy::Always).unwrap();
            wal.append(&test_record("k1", 1.0, "v1")).unwrap();
            wal.append(&test_record("k2", 2.0, "v2")).unwrap();
            wal.append(&test_record("k3", 3.0, "v3")).unwrap();
            assert_eq!(wal.entries_written(), 3);
        }

        // Replay
        let records = Wal::replay(&wal_path).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, "k1");
        assert_eq!(records[1].key, "k2");
        assert_eq!(records[2].key, "k3");
        assert_eq!(records[0].value.data, json!("v1"));
        assert_eq!(records[2].value.ts, 3.0);
    }

    #[test]
    fn test_wal_replay_empty() {
        let dir = TempDir::new().unwrap();
        let wal_path = dir.path().join("empty.wal");
        let records = Wal::replay(&wal_path).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_wal_replay_truncated() {
        let dir = TempDir::new().unwrap();
        let wal_path = dir.path().join("trunc.wal");

        // Write 3 entries
        {
            let mut wal = Wal::open(&wal_path, FsyncPolicy::Always).unwrap();
            wal.append(&test_record("k1", 1.0, "v1")).unwrap();
            wal.append(&test_record("k2", 2.0, "v2")).unwrap();
            wal.append(&test_record("k3", 3.0, "v3")).unwrap();
        }

        // Corrupt the file by truncating the last few bytes
        {
            let file = OpenOptions::new().write(true).open(&wal_path).unwrap();
            let len = file.metadata().unwrap().len();
            file.set_len(len - 5).unwrap(); // chop off end
        }

        // Replay should return the first 2 valid entries
        let records = Wal::replay(&wal_path).unwrap();
        assert_eq!(
            records.len(),
            2,
            "should recover 2 of 3 entries after truncation"
        );
        assert_eq!(records[0].key, "k1");
        assert_eq!(records[1].key, "k2");
    }

    #[test]
    fn test_wal_stops_at_corrupt_frame() {
        let dir = TempDir::new().unwrap();
        let wal_path = dir.path().join("corrupt.wal");

        {
            let mut wal = Wal::open(&wal_path, FsyncPolicy::Always).unwrap();
            wal.append(&test_record("k1", 1.0, "v1")).unwrap();
            wal.append(&test_record("k2", 2.0, "v2")).unwrap();
        }

        // Flip a payload byte inside the second frame
        {
            let mut bytes = std::fs::read(&wal_path).unwrap();
            let target = bytes.len() - 4;
            bytes[target] ^= 0xff;
            std::fs::write(&wal_path, bytes).unwrap();
        }

        let records = Wal::replay(&wal_path).unwrap();
        assert_eq!(records.len(), 1, "replay stops before the corrupt frame");
        assert_eq!(records[0].key, "k1");
    }

    #[test]
    fn test_wal_preserves_json_payloads() {
        let dir = TempDir::new().unwrap();
        let wal_path = dir.path().join("json.wal");

        let value = VersionedValue::at(7.5, json!({"status": "pending", "note": "old"}));
        let record = StorageRecord::new("delivery:1".to_string(), value.clone());

        {
            let mut wal = Wal::open(&wal_path, FsyncPolicy::Always).unwrap();
            wal.append(&record).unwrap();
        }

        let records = Wal::replay(&wal_path).unwrap();
        assert_eq!(records[0].value, value);
    }
}
