//! Consistent hash ring: maps a key to its ordered replica set.
//!
//! Each physical node contributes a fixed number of virtual points on a
//! 64-bit ring. A key hashes to a point; walking clockwise from that point
//! and collecting the first RF distinct physical nodes yields its replica
//! set. The mapping depends only on the node list and RF, never on node
//! health or request order.

use meshkv_common::RingNode;
use sha1::{Digest, Sha1};

/// Virtual points per physical node. Internal balance knob, not a contract.
const VNODES: usize = 64;

/// An immutable consistent hash ring over a fixed node set.
///
/// Built once at startup from configuration and shared read-only; there is
/// no rebalancing protocol.
#[derive(Debug, Clone)]
pub struct Ring {
    nodes: Vec<RingNode>,
    /// Sorted (point, node index) pairs.
    points: Vec<(u64, usize)>,
    rf: usize,
}

/// Hash arbitrary bytes to a ring point (first 8 bytes of SHA-1, big-endian).
fn ring_point(data: &[u8]) -> u64 {
    let digest = Sha1::digest(data);
    u64::from_be_bytes(digest[..8].try_into().expect("sha1 digest >= 8 bytes"))
}

impl Ring {
    /// Build a ring. `rf` is clamped to the node count.
    pub fn new(nodes: Vec<RingNode>, rf: usize) -> Self {
        let rf = rf.min(nodes.len()).max(usize::from(!nodes.is_empty()));

        let mut points = Vec::with_capacity(nodes.len() * VNODES);
        for (idx, node) in nodes.iter().enumerate() {
            for vnode in 0..VNODES {
                points.push((ring_point(format!("{}#{}", node.id, vnode).as_bytes()), idx));
            }
        }
        points.sort_unstable();

        Self { nodes, points, rf }
    }

    /// The effective replication factor.
    pub fn rf(&self) -> usize {
        self.rf
    }

    /// All physical nodes, in configuration order.
    pub fn nodes(&self) -> &[RingNode] {
        &self.nodes
    }

    /// Look up a node by id.
    pub fn node_by_id(&self, id: &str) -> Option<&RingNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The ordered replica set for a key: RF distinct physical nodes,
    /// primary first. Deterministic for a fixed node set and RF.
    pub fn replicas_for(&self, key: &str) -> Vec<&RingNode> {
        if self.points.is_empty() {
            return Vec::new();
        }

        let hash = ring_point(key.as_bytes());
        // First point clockwise of the key's hash (wrapping).
        let start = self.points.partition_point(|&(p, _)| p < hash) % self.points.len();

        let mut seen = vec![false; self.nodes.len()];
        let mut replicas = Vec::with_capacity(self.rf);
        for i in 0..self.points.len() {
            let (_, idx) = self.points[(start + i) % self.points.len()];
            if !seen[idx] {
                seen[idx] = true;
                replicas.push(&self.nodes[idx]);
                if replicas.len() == self.rf {
                    break;
                }
            }
        }
        replicas
    }

    /// The primary replica for a key.
    pub fn primary_for(&self, key: &str) -> Option<&RingNode> {
        self.replicas_for(key).into_iter().next()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
