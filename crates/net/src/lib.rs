//! HTTP wire layer.
//!
//! Three pieces:
//! - `node_server`: the per-node replica API (storage, cache, locks)
//! - `front_server`: the client-facing coordinator API
//! - `replica_client`: the HTTP transport the coordinator uses to reach nodes

pub mod front_server;
pub mod node_server;
pub mod replica_client;
