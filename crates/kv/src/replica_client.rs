//! Abstraction over coordinator-to-replica requests.
//!
//! Concrete implementation lives in `meshkv-net::replica_client` (HTTP).
//! The coordinator and the hint flusher are generic over this trait so
//! unit tests can substitute in-process mocks.

use meshkv_common::{RingNode, VersionedValue};

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("timeout")]
    Timeout,
}

/// Result of a node-side compare-and-swap.
#[derive(Debug, Clone, PartialEq)]
pub struct CasReply {
    pub ok: bool,
    /// The node's current envelope when the compare failed.
    pub current: Option<VersionedValue>,
}

/// Result of a node-side lock acquire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockReply {
    pub ok: bool,
    /// Expiry of the blocking lock when the acquire was rejected.
    pub expires_at: Option<f64>,
}

/// Transport for replica requests.
#[async_trait::async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    /// Deliver a versioned write to a replica. The replica applies its own
    /// LWW check; a stale write is still a successful delivery.
    async fn replica_put(
        &self,
        target: &RingNode,
        key: &str,
        value: &VersionedValue,
    ) -> Result<(), ReplicaError>;

    /// Fetch a replica's current envelope for a key (None = not found).
    async fn replica_get(
        &self,
        target: &RingNode,
        key: &str,
    ) -> Result<Option<VersionedValue>, ReplicaError>;

    /// Node-side CAS: commit `new` iff the stored envelope equals
    /// `expected` (None = key must be absent). The compare happens on the
    /// node at commit time, which is what makes coordinator CAS race-safe.
    async fn replica_cas(
        &self,
        target: &RingNode,
        key: &str,
        expected: Option<&VersionedValue>,
        new: &VersionedValue,
    ) -> Result<CasReply, ReplicaError>;

    /// Acquire a TTL lock on the target node.
    async fn lock_acquire(
        &self,
        target: &RingNode,
        key: &str,
        ttl_sec: f64,
    ) -> Result<LockReply, ReplicaError>;

    /// Release a lock on the target node (idempotent).
    async fn lock_release(&self, target: &RingNode, key: &str) -> Result<(), ReplicaError>;
}
