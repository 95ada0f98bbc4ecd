//! Configuration schema and loaders for meshkv processes.
//!
//! Two process kinds share this crate: the storage node (`meshkv-node`)
//! and the coordinating front (`meshkv-front`). Both are configured from
//! YAML files; every knob has a default so a minimal config is just a
//! listen address (and, for the front, a backend list).

use meshkv_common::RingNode;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Storage node
// ---------------------------------------------------------------------------

/// Configuration for a storage node process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's listen address.
    pub listen: SocketAddr,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// LRU cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the WAL.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Fsync policy: "always", "batch", "none".
    #[serde(default = "default_fsync")]
    pub fsync: String,

    /// WAL sync interval in milliseconds (only used under "batch").
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            fsync: default_fsync(),
            sync_interval_ms: default_sync_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached entries.
    #[serde(default = "default_cache_items")]
    pub max_items: usize,

    /// Maximum total cache size in bytes.
    #[serde(default = "default_cache_bytes")]
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: default_cache_items(),
            max_bytes: default_cache_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Front (coordinator)
// ---------------------------------------------------------------------------

/// Configuration for the coordinating front process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontConfig {
    /// The front's listen address.
    pub listen: SocketAddr,

    /// Storage backends (the physical ring members).
    pub backends: Vec<BackendConfig>,

    /// Replication / quorum settings.
    #[serde(default)]
    pub kv: KvConfig,

    /// Optional Prometheus metrics HTTP port.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// One storage backend entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    pub url: String,
}

impl BackendConfig {
    pub fn to_ring_node(&self) -> RingNode {
        RingNode::new(self.id.clone(), self.url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    /// Replication factor. Clamped to the backend count at startup.
    #[serde(default = "default_rf")]
    pub rf: usize,

    /// Per-replica request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Whether read-repair is enabled.
    #[serde(default = "default_true")]
    pub read_repair: bool,

    /// Whether hinted handoff is enabled.
    #[serde(default = "default_true")]
    pub hinted_handoff: bool,

    /// Hint flush interval in seconds.
    #[serde(default = "default_hint_flush_secs")]
    pub hint_flush_secs: u64,

    /// Maximum hints to attempt delivery per flush cycle.
    #[serde(default = "default_max_hints_per_cycle")]
    pub max_hints_per_cycle: usize,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            rf: default_rf(),
            request_timeout_ms: default_request_timeout_ms(),
            read_repair: true,
            hinted_handoff: true,
            hint_flush_secs: default_hint_flush_secs(),
            max_hints_per_cycle: default_max_hints_per_cycle(),
        }
    }
}

// --- Defaults ---

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_fsync() -> String {
    "batch".to_string()
}
fn default_sync_interval_ms() -> u64 {
    1000
}
fn default_cache_items() -> usize {
    10_000
}
fn default_cache_bytes() -> usize {
    32 * 1024 * 1024
}
fn default_rf() -> usize {
    2
}
fn default_request_timeout_ms() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}
fn default_hint_flush_secs() -> u64 {
    2
}
fn default_max_hints_per_cycle() -> usize {
    100
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_items == 0 {
            return Err(ConfigError::Invalid("cache.max_items must be > 0".into()));
        }
        if self.cache.max_bytes == 0 {
            return Err(ConfigError::Invalid("cache.max_bytes must be > 0".into()));
        }
        Ok(())
    }
}

impl FrontConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::Invalid("backends must not be empty".into()));
        }
        let mut ids: Vec<&str> = self.backends.iter().map(|b| b.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.backends.len() {
            return Err(ConfigError::Invalid("backend ids must be distinct".into()));
        }
        if self.kv.rf == 0 {
            return Err(ConfigError::Invalid("kv.rf must be > 0".into()));
        }
        Ok(())
    }

    /// The replication factor actually used: `rf` clamped to the backend count.
    pub fn effective_rf(&self) -> usize {
        self.kv.rf.min(self.backends.len())
    }

    pub fn ring_nodes(&self) -> Vec<RingNode> {
        self.backends.iter().map(BackendConfig::to_ring_node).collect()
    }
}

/// Load a `NodeConfig` from a YAML file path.
pub fn load_node_from_file(path: &std::path::Path) -> Result<NodeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_node_from_str(&contents)
}

/// Load a `NodeConfig` from a YAML string.
pub fn load_node_from_str(yaml: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Load a `FrontConfig` from a YAML file path.
pub fn load_front_from_file(path: &std::path::Path) -> Result<FrontConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_front_from_str(&contents)
}

/// Load a `FrontConfig` from a YAML string.
pub fn load_front_from_str(yaml: &str) -> Result<FrontConfig, ConfigError> {
    let config: FrontConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_node_config() {
        let yaml = r#"
listen: "127.0.0.1:9000"
"#;
        let config = load_node_from_str(yaml).unwrap();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.cache.max_items, 10_000);
        assert_eq!(config.cache.max_bytes, 32 * 1024 * 1024);
        assert_eq!(config.storage.fsync, "batch");
    }

    #[test]
    fn test_parse_full_node_config() {
        let yaml = r#"
listen: "0.0.0.0:9001"
storage:
  data_dir: /tmp/meshkv-a
  fsync: always
cache:
  max_items: 500
  max_bytes: 1048576
metrics_port: 9101
"#;
        let config = load_node_from_str(yaml).unwrap();
        assert_eq!(config.storage.fsync, "always");
        assert_eq!(config.cache.max_items, 500);
        assert_eq!(config.metrics_port, Some(9101));
    }

    #[test]
    fn test_parse_front_config() {
        let yaml = r#"
listen: "127.0.0.1:8000"
backends:
  - { id: a, url: "http://kvstore-a:9000/" }
  - { id: b, url: "http://kvstore-b:9000" }
  - { id: c, url: "http://kvstore-c:9000" }
kv:
  rf: 2
  hint_flush_secs: 1
"#;
        let config = load_front_from_str(yaml).unwrap();
        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.effective_rf(), 2);
        assert_eq!(config.kv.hint_flush_secs, 1);
        assert!(config.kv.read_repair);
        // trailing slash is normalized away
        assert_eq!(config.ring_nodes()[0].url, "http://kvstore-a:9000");
    }

    #[test]
    fn test_rf_clamped_to_backend_count() {
        let yaml = r#"
listen: "127.0.0.1:8000"
backends:
  - { id: a, url: "http://a:9000" }
kv:
  rf: 5
"#;
        let config = load_front_from_str(yaml).unwrap();
        assert_eq!(config.effective_rf(), 1);
    }

    #[test]
    fn test_rejects_empty_backends() {
        let yaml = r#"
listen: "127.0.0.1:8000"
backends: []
"#;
        let err = load_front_from_str(yaml).unwrap_err().to_string();
        assert!(err.contains("backends"), "unexpected error: {}", err);
    }

    #[test]
    fn test_rejects_duplicate_backend_ids() {
        let yaml = r#"
listen: "127.0.0.1:8000"
backends:
  - { id: a, url: "http://a:9000" }
  - { id: a, url: "http://b:9000" }
"#;
        let err = load_front_from_str(yaml).unwrap_err().to_string();
        assert!(err.contains("distinct"), "unexpected error: {}", err);
    }

    #[test]
    fn test_rejects_zero_rf() {
        let yaml = r#"
listen: "127.0.0.1:8000"
backends:
  - { id: a, url: "http://a:9000" }
kv:
  rf: 0
"#;
        assert!(load_front_from_str(yaml).is_err());
    }

    #[test]
    fn test_roundtrip_yaml() {
        let yaml = r#"
listen: "127.0.0.1:8000"
backends:
  - { id: a, url: "http://a:9000" }
  - { id: b, url: "http://b:9000" }
"#;
        let config = load_front_from_str(yaml).unwrap();
        let serialized = serde_yaml::to_string(&config).unwrap();
        let config2 = load_front_from_str(&serialized).unwrap();
        assert_eq!(config.listen, config2.listen);
        assert_eq!(config.kv.rf, config2.kv.rf);
    }
}
