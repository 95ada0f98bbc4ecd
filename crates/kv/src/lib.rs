//! Replicated KV layer: the coordinating front.
//!
//! Provides: key placement over the consistent hash ring, fan-out quorum
//! reads and writes with LWW reconciliation, read-repair, hinted handoff
//! with a background flusher, coordinator-driven CAS, and lock passthrough.

pub mod coordinator;
pub mod hint_flusher;
pub mod hint_store;
pub mod replica_client;
