//! Background hint delivery.
//!
//! A periodic task drains queued hints toward their target nodes. Delivery
//! per target stops at the first failure and resumes next cycle, so a node
//! that is still down costs one attempt per cycle instead of one per hint.

use crate::hint_store::HintStore;
use crate::replica_client::ReplicaClient;
use meshkv_ring::Ring;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Spawn the hint delivery loop. Runs until the process exits.
pub fn spawn_hint_flusher<R: ReplicaClient>(
    hint_store: Arc<RwLock<HintStore>>,
    client: Arc<R>,
    ring: Arc<Ring>,
    flush_interval: Duration,
    max_hints_per_cycle: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let delivered =
                deliver_hints(&hint_store, client.as_ref(), &ring, max_hints_per_cycle).await;
            if delivered > 0 {
                tracing::info!("delivered {} hint(s)", delivered);
            }
        }
    })
}

/// One delivery cycle. Returns the number of hints handed off.
///
/// Targets are independent: a failure on one target never blocks delivery
/// to another.
pub async fn deliver_hints<R: ReplicaClient>(
    hint_store: &Arc<RwLock<HintStore>>,
    client: &R,
    ring: &Ring,
    max_hints_per_cycle: usize,
) -> usize {
    let targets = hint_store.read().await.all_target_nodes();
    let mut delivered = 0usize;
    let mut budget = max_hints_per_cycle;

    for target_id in targets {
        if budget == 0 {
            break;
        }
        // Target may have left the ring since the hint was queued
        let Some(node) = ring.node_by_id(&target_id).cloned() else {
            tracing::warn!("dropping hints for unknown node '{}'", target_id);
            hint_store.write().await.delete_target(&target_id);
            continue;
        };

        let pending = hint_store.read().await.hints_for_node(&target_id);
        for hint in pending.into_iter().take(budget) {
            match client.replica_put(&node, &hint.key, &hint.value).await {
                Ok(()) => {
                    hint_store
                        .write()
                        .await
                        .ack_delivered(&target_id, &hint.key, &hint.value);
                    meshkv_metrics::metrics().hints_delivered.inc();
                    delivered += 1;
                    budget -= 1;
                }
                Err(e) => {
                    // Node still unreachable: keep its hints, try again later
                    tracing::debug!("hint delivery to {} failed: {}", target_id, e);
                    break;
                }
            }
        }
    }

    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica_client::{CasReply, LockReply, ReplicaError};
    use meshkv_common::{RingNode, VersionedValue};
    use serde_json::json;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockNodes {
        stores: Mutex<HashMap<String, HashMap<String, VersionedValue>>>,
        down: Mutex<HashSet<String>>,
    }

    impl MockNodes {
        fn set_down(&self, node: &str, down: bool) {
            let mut set = self.down.lock().unwrap();
            if down {
                set.insert(node.to_string());
            } else {
                set.remove(node);
            }
        }

        fn node_value(&self, node: &str, key: &str) -> Option<VersionedValue> {
            self.stores
                .lock()
                .unwrap()
                .get(node)
                .and_then(|m| m.get(key))
                .cloned()
        }
    }

    #[async_trait::async_trait]
    impl ReplicaClient for MockNodes {
        async fn replica_put(
            &self,
            target: &RingNode,
            key: &str,
            value: &VersionedValue,
        ) -> Result<(), ReplicaError> {
            if self.down.lock().unwrap().contains(&target.id) {
                return Err(ReplicaError::RequestFailed("node down".into()));
            }
            self.stores
                .lock()
                .unwrap()
                .entry(target.id.clone())
                .or_default()
                .insert(key.to_string(), value.clone());
            Ok(())
        }

        async fn replica_get(
            &self,
            _target: &RingNode,
            _key: &str,
        ) -> Result<Option<VersionedValue>, ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }

        async fn replica_cas(
            &self,
            _target: &RingNode,
            _key: &str,
            _expected: Option<&VersionedValue>,
            _new: &VersionedValue,
        ) -> Result<CasReply, ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }

        async fn lock_acquire(
            &self,
            _target: &RingNode,
            _key: &str,
            _ttl_sec: f64,
        ) -> Result<LockReply, ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }

        async fn lock_release(&self, _target: &RingNode, _key: &str) -> Result<(), ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }
    }

    fn test_ring() -> Ring {
        Ring::new(
            vec![
                RingNode::new("a", "http://a:9000"),
                RingNode::new("b", "http://b:9000"),
            ],
            2,
        )
    }

    fn hinted(pairs: &[(&str, &str, f64)]) -> Arc<RwLock<HintStore>> {
        let mut hs = HintStore::new();
        for (target, key, ts) in pairs {
            hs.store_hint(target, key, &VersionedValue::at(*ts, json!("hinted")));
        }
        Arc::new(RwLock::new(hs))
    }

    #[tokio::test]
    async fn test_delivers_to_reachable_node() {
        let nodes = MockNodes::default();
        let hint_store = hinted(&[("a", "k1", 1.0), ("a", "k2", 2.0)]);

        let delivered = deliver_hints(&hint_store, &nodes, &test_ring(), 100).await;
        assert_eq!(delivered, 2);
        assert_eq!(hint_store.read().await.hint_count(), 0);
        assert_eq!(nodes.node_value("a", "k1").unwrap().data, json!("hinted"));
        assert_eq!(nodes.node_value("a", "k2").unwrap().ts, 2.0);
    }

    #[tokio::test]
    async fn test_failure_keeps_hints_for_retry() {
        let nodes = MockNodes::default();
        nodes.set_down("a", true);
        let hint_store = hinted(&[("a", "k1", 1.0)]);

        let delivered = deliver_hints(&hint_store, &nodes, &test_ring(), 100).await;
        assert_eq!(delivered, 0);
        assert_eq!(hint_store.read().await.hint_count(), 1);

        // Node comes back: next cycle drains the queue
        nodes.set_down("a", false);
        let delivered = deliver_hints(&hint_store, &nodes, &test_ring(), 100).await;
        assert_eq!(delivered, 1);
        assert_eq!(hint_store.read().await.hint_count(), 0);
    }

    #[tokio::test]
    async fn test_targets_are_independent() {
        let nodes = MockNodes::default();
        nodes.set_down("a", true);
        let hint_store = hinted(&[("a", "k1", 1.0), ("b", "k2", 1.0)]);

        let delivered = deliver_hints(&hint_store, &nodes, &test_ring(), 100).await;
        assert_eq!(delivered, 1, "b's hint delivers even though a is down");
        assert_eq!(hint_store.read().await.hints_for_node("a").len(), 1);
        assert!(hint_store.read().await.hints_for_node("b").is_empty());
    }

    #[tokio::test]
    async fn test_cycle_budget_caps_deliveries() {
        let nodes = MockNodes::default();
        let hint_store = hinted(&[("a", "k1", 1.0), ("a", "k2", 1.0), ("a", "k3", 1.0)]);

        let delivered = deliver_hints(&hint_store, &nodes, &test_ring(), 2).await;
        assert_eq!(delivered, 2);
        assert_eq!(hint_store.read().await.hint_count(), 1);
    }

    /// Delivery confirms against the value it actually sent, so a hint
    /// re-queued with a newer timestamp while the send was in flight is
    /// not lost.
    struct RequeueDuringDelivery {
        inner: MockNodes,
        hint_store: Arc<RwLock<HintStore>>,
    }

    #[async_trait::async_trait]
    impl ReplicaClient for RequeueDuringDelivery {
        async fn replica_put(
            &self,
            target: &RingNode,
            key: &str,
            value: &VersionedValue,
        ) -> Result<(), ReplicaError> {
            // A fresher write for the same key lands mid-delivery
            self.hint_store.write().await.store_hint(
                &target.id,
                key,
                &VersionedValue::at(9.0, json!("fresher")),
            );
            self.inner.replica_put(target, key, value).await
        }

        async fn replica_get(
            &self,
            _target: &RingNode,
            _key: &str,
        ) -> Result<Option<VersionedValue>, ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }

        async fn replica_cas(
            &self,
            _target: &RingNode,
            _key: &str,
            _expected: Option<&VersionedValue>,
            _new: &VersionedValue,
        ) -> Result<CasReply, ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }

        async fn lock_acquire(
            &self,
            _target: &RingNode,
            _key: &str,
            _ttl_sec: f64,
        ) -> Result<LockReply, ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }

        async fn lock_release(&self, _target: &RingNode, _key: &str) -> Result<(), ReplicaError> {
            unimplemented!("not exercised by hint delivery")
        }
    }

    #[tokio::test]
    async fn test_hint_requeued_mid_delivery_survives_the_cycle() {
        let hint_store = hinted(&[("a", "k1", 1.0)]);
        let client = RequeueDuringDelivery {
            inner: MockNodes::default(),
            hint_store: hint_store.clone(),
        };

        let delivered = deliver_hints(&hint_store, &client, &test_ring(), 100).await;
        assert_eq!(delivered, 1);

        let pending = hint_store.read().await.hints_for_node("a");
        assert_eq!(pending.len(), 1, "fresher hint stays queued");
        assert_eq!(pending[0].value.ts, 9.0);
    }

    #[tokio::test]
    async fn test_hints_for_departed_node_are_dropped() {
        let nodes = MockNodes::default();
        let hint_store = hinted(&[("gone", "k1", 1.0)]);

        let delivered = deliver_hints(&hint_store, &nodes, &test_ring(), 100).await;
        assert_eq!(delivered, 0);
        assert_eq!(hint_store.read().await.hint_count(), 0);
    }
}
