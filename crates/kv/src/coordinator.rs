//! KV coordinator: handles client PUT/GET/CAS by fanning out to replicas.
//!
//! The coordinator:
//! 1. Maps a key to its RF replicas (via the consistent hash ring)
//! 2. Sends replica requests in parallel with a bounded deadline
//! 3. For writes, returns after ≥1 ack (sloppy quorum) and queues hints
//!    for replicas that failed or timed out
//! 4. For reads, picks the LWW winner across responses and asynchronously
//!    repairs replicas that answered with a stale value
//! 5. Sequences CAS through the primary replica's commit-time compare
//! 6. Forwards lock operations to the primary of the `lock:` keyspace
//!
//! The coordinator owns no durable state; it is rebuilt fresh on restart.

use crate::hint_store::HintStore;
use crate::replica_client::{LockReply, ReplicaClient, ReplicaError};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use meshkv_common::{RingNode, VersionedValue};
use meshkv_ring::Ring;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

/// Quorum and replication configuration.
#[derive(Debug, Clone)]
pub struct QuorumConfig {
    /// Per-replica request deadline.
    pub request_timeout: Duration,
    /// Whether to perform async read repair.
    pub read_repair: bool,
    /// Whether to queue hints for failed replicas.
    pub hinted_handoff: bool,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
            read_repair: true,
            hinted_handoff: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("no backends configured for key placement")]
    NoReplicas,
    #[error("no replica reachable: {0} attempted")]
    AllReplicasFailed(usize),
    #[error("key not found")]
    NotFound,
    #[error("lock backend unavailable: {0}")]
    LockUnavailable(#[from] ReplicaError),
}

/// Receipt returned to the client after a coordinated write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PutReceipt {
    /// The timestamp assigned to the write.
    pub ts: f64,
    /// Replicas that acknowledged within the deadline.
    pub written: usize,
    /// The replication factor attempted.
    pub rf: usize,
}

/// Outcome of a coordinated CAS, as reported to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct CasOutcome {
    pub ok: bool,
    /// The current payload (unwrapped) when the compare failed.
    pub current: Option<serde_json::Value>,
}

/// Distributed KV coordinator.
///
/// Generic over `R: ReplicaClient` for testability — real deployment uses
/// `HttpReplicaClient`; unit tests use in-process mocks.
pub struct Coordinator<R: ReplicaClient> {
    ring: Arc<Ring>,
    client: Arc<R>,
    config: QuorumConfig,
    hint_store: Option<Arc<RwLock<HintStore>>>,
}

impl<R: ReplicaClient> std::fmt::Debug for Coordinator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("rf", &self.ring.rf())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: ReplicaClient> Coordinator<R> {
    pub fn new(ring: Arc<Ring>, client: Arc<R>, config: QuorumConfig) -> Self {
        Self {
            ring,
            client,
            config,
            hint_store: None,
        }
    }

    /// Attach a hint store for hinted handoff.
    pub fn with_hint_store(mut self, hint_store: Arc<RwLock<HintStore>>) -> Self {
        self.hint_store = Some(hint_store);
        self
    }

    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    // -----------------------------------------------------------------------
    // PUT
    // -----------------------------------------------------------------------

    /// Coordinated write: wraps the payload with a fresh timestamp and fans
    /// out to all RF replicas. Succeeds once ≥1 replica acks within the
    /// deadline (sloppy quorum); every other replica gets a hint.
    pub async fn put(&self, key: &str, data: serde_json::Value) -> Result<PutReceipt, KvError> {
        let value = VersionedValue::now(data);
        let written = self.fan_out_put(key, &value).await?;
        Ok(PutReceipt {
            ts: value.ts,
            written,
            rf: self.ring.rf(),
        })
    }

    /// Fan out a versioned write to all replicas of `key`. Returns the ack
    /// count; queues hints for replicas that failed or missed the deadline.
    async fn fan_out_put(&self, key: &str, value: &VersionedValue) -> Result<usize, KvError> {
        let replicas: Vec<RingNode> = self
            .ring
            .replicas_for(key)
            .into_iter()
            .cloned()
            .collect();
        if replicas.is_empty() {
            return Err(KvError::NoReplicas);
        }

        let deadline = tokio::time::Instant::now() + self.config.request_timeout;
        let mut futs = FuturesUnordered::new();

        for replica in &replicas {
            let client = self.client.clone();
            let target = replica.clone();
            let key = key.to_string();
            let value = value.clone();
            futs.push(tokio::spawn(async move {
                let result = client.replica_put(&target, &key, &value).await;
                (target.id, result)
            }));
        }

        // Wait for all replies or the deadline; late replicas become
        // hint targets rather than blocking the response.
        let mut acks = 0usize;
        let mut succeeded: HashSet<String> = HashSet::new();

        while let Some(result) = tokio::time::timeout_at(deadline, futs.next())
            .await
            .ok()
            .flatten()
        {
            if let Ok((node_id, Ok(()))) = result {
                acks += 1;
                succeeded.insert(node_id);
            }
        }

        if acks == 0 {
            return Err(KvError::AllReplicasFailed(replicas.len()));
        }

        // Hinted handoff: queue a hint for every replica that did not ack
        if self.config.hinted_handoff {
            if let Some(ref hint_store) = self.hint_store {
                let failed: Vec<&RingNode> = replicas
                    .iter()
                    .filter(|r| !succeeded.contains(&r.id))
                    .collect();

                if !failed.is_empty() {
                    let mut hs = hint_store.write().await;
                    for node in &failed {
                        hs.store_hint(&node.id, key, value);
                    }
                    meshkv_metrics::metrics()
                        .hints_stored
                        .inc_by(failed.len() as u64);
                    tracing::debug!("stored {} hint(s) for key '{}'", failed.len(), key);
                }
            }
        }

        Ok(acks)
    }

    // -----------------------------------------------------------------------
    // GET
    // -----------------------------------------------------------------------

    /// Coordinated read: fans out to all replicas, picks the LWW winner,
    /// and asynchronously repairs replicas that answered with a stale
    /// value. Replicas that did not respond are left to hinted handoff.
    pub async fn get(&self, key: &str) -> Result<VersionedValue, KvError> {
        let replicas: Vec<RingNode> = self
            .ring
            .replicas_for(key)
            .into_iter()
            .cloned()
            .collect();
        if replicas.is_empty() {
            return Err(KvError::NoReplicas);
        }

        let deadline = tokio::time::Instant::now() + self.config.request_timeout;
        let mut futs = FuturesUnordered::new();

        for replica in &replicas {
            let client = self.client.clone();
            let target = replica.clone();
            let key = key.to_string();
            futs.push(tokio::spawn(async move {
                let result = client.replica_get(&target, &key).await;
                (target, result)
            }));
        }

        // (replica, envelope-if-any) for every replica that responded
        let mut responses: Vec<(RingNode, Option<VersionedValue>)> = Vec::new();

        while let Some(result) = tokio::time::timeout_at(deadline, futs.next())
            .await
            .ok()
            .flatten()
        {
            if let Ok((node, Ok(found))) = result {
                responses.push((node, found));
            }
        }

        if responses.is_empty() {
            return Err(KvError::AllReplicasFailed(replicas.len()));
        }

        let winner = responses
            .iter()
            .filter_map(|(_, v)| v.as_ref())
            .max_by(|a, b| a.cmp_lww(b))
            .cloned()
            .ok_or(KvError::NotFound)?;

        // Read repair: only replicas that responded with a strictly older
        // value. Non-responders heal via hints, not the read path.
        if self.config.read_repair {
            let stale: Vec<RingNode> = responses
                .iter()
                .filter(|(_, v)| match v {
                    Some(v) => v.ts < winner.ts,
                    None => false,
                })
                .map(|(node, _)| node.clone())
                .collect();
            if !stale.is_empty() {
                self.spawn_read_repair(key.to_string(), winner.clone(), stale);
            }
        }

        Ok(winner)
    }

    /// Spawn a background task that pushes the winning value to the given
    /// stale replicas.
    fn spawn_read_repair(&self, key: String, winner: VersionedValue, stale: Vec<RingNode>) {
        let client = self.client.clone();
        tokio::spawn(async move {
            meshkv_metrics::metrics().read_repairs.inc();
            for node in &stale {
                if let Err(e) = client.replica_put(node, &key, &winner).await {
                    tracing::debug!("read repair of '{}' on {} failed: {}", key, node.id, e);
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // CAS
    // -----------------------------------------------------------------------

    /// Coordinated compare-and-swap.
    ///
    /// Reads the current envelope from the primary, compares the unwrapped
    /// payload against `old` (`null` = expect absence), then asks the
    /// primary to commit with a node-side compare on the envelope read
    /// here. Two racing CAS calls from the same observed `old` reach the
    /// primary with the same expected envelope; the node commits the first
    /// and rejects the second.
    pub async fn cas(
        &self,
        key: &str,
        old: serde_json::Value,
        new: serde_json::Value,
    ) -> Result<CasOutcome, KvError> {
        let replicas: Vec<RingNode> = self
            .ring
            .replicas_for(key)
            .into_iter()
            .cloned()
            .collect();
        let Some((primary, secondaries)) = replicas.split_first() else {
            return Err(KvError::NoReplicas);
        };

        let current = self
            .client
            .replica_get(primary, key)
            .await
            .map_err(|_| KvError::AllReplicasFailed(1))?;

        // Front-side compare on the unwrapped payload
        let matches = match (&current, old.is_null()) {
            (None, true) => true,
            (Some(cur), false) => cur.data == old,
            _ => false,
        };
        if !matches {
            meshkv_metrics::metrics().kv_cas_failed.inc();
            return Ok(CasOutcome {
                ok: false,
                current: current.map(|v| v.data),
            });
        }

        // Node-side compare at commit time closes the read-then-write race
        let new_value = VersionedValue::now(new);
        let reply = self
            .client
            .replica_cas(primary, key, current.as_ref(), &new_value)
            .await
            .map_err(|_| KvError::AllReplicasFailed(1))?;

        if !reply.ok {
            meshkv_metrics::metrics().kv_cas_failed.inc();
            return Ok(CasOutcome {
                ok: false,
                current: reply.current.map(|v| v.data),
            });
        }

        // Replicate the committed value to the secondaries (hint on failure)
        for node in secondaries {
            if self
                .client
                .replica_put(node, key, &new_value)
                .await
                .is_err()
            {
                if self.config.hinted_handoff {
                    if let Some(ref hint_store) = self.hint_store {
                        hint_store.write().await.store_hint(&node.id, key, &new_value);
                        meshkv_metrics::metrics().hints_stored.inc();
                    }
                }
            }
        }

        Ok(CasOutcome {
            ok: true,
            current: None,
        })
    }

    // -----------------------------------------------------------------------
    // Locks
    // -----------------------------------------------------------------------

    /// The node holding lock state for a key: the primary replica of the
    /// `lock:` keyspace. Every coordinator instance resolves the same node,
    /// so lock state is consistent regardless of which front is asked.
    fn lock_primary(&self, key: &str) -> Result<RingNode, KvError> {
        self.ring
            .primary_for(&format!("lock:{}", key))
            .cloned()
            .ok_or(KvError::NoReplicas)
    }

    /// Forward a lock acquire to the lock primary.
    pub async fn lock_acquire(&self, key: &str, ttl_sec: f64) -> Result<LockReply, KvError> {
        let primary = self.lock_primary(key)?;
        let reply = self.client.lock_acquire(&primary, key, ttl_sec).await?;
        let m = meshkv_metrics::metrics();
        if reply.ok {
            m.locks_granted.inc();
        } else {
            m.locks_rejected.inc();
        }
        Ok(reply)
    }

    /// Forward a lock release to the lock primary.
    pub async fn lock_release(&self, key: &str) -> Result<(), KvError> {
        let primary = self.lock_primary(key)?;
        self.client.lock_release(&primary, key).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
