//! Node-local storage for a meshkv replica.
//!
//! A storage node owns three pieces of state, all provided here:
//! a WAL-backed LWW key/value engine, a bounded LRU cache, and a TTL
//! lock table. The async boundary is at the caller (the HTTP layer);
//! everything in this crate is synchronous.

pub mod cache;
pub mod engine;
pub mod locks;
pub mod record;
pub mod table;
pub mod wal;
