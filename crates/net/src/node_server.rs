//! Per-node replica API.
//!
//! Endpoints:
//! - `GET  /health`
//! - `GET  /kv/:key`            read-through cache, then storage
//! - `PUT  /kv/:key`            LWW write, write-through cache
//! - `POST /kv/cas`             atomic envelope compare-and-swap
//! - `POST /lock/acquire/:key`  TTL lock
//! - `POST /lock/release/:key`
//!
//! Writes accept `{"value": ...}` where the value may be a full
//! `{_ts, data}` envelope (coordinator traffic) or any bare JSON value
//! (direct operator writes, normalized to timestamp 0.0 so they lose to
//! every coordinated write).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use meshkv_common::{now_ts, VersionedValue};
use meshkv_storage::cache::LruCache;
use meshkv_storage::engine::{CasOutcome, StorageEngine};
use meshkv_storage::locks::{AcquireOutcome, LockTable};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared state of one storage node.
pub struct NodeState {
    engine: Mutex<StorageEngine>,
    cache: Mutex<LruCache>,
    locks: Mutex<LockTable>,
}

impl NodeState {
    pub fn new(engine: StorageEngine, cache: LruCache) -> Self {
        Self {
            engine: Mutex::new(engine),
            cache: Mutex::new(cache),
            locks: Mutex::new(LockTable::new()),
        }
    }

    async fn sync_wal(&self) -> Result<(), meshkv_storage::engine::StorageError> {
        self.engine.lock().await.sync()
    }
}

/// Periodic WAL fsync for the batch policy. Without this, "batch" would
/// never actually reach the disk between appends.
pub fn spawn_wal_sync(
    state: Arc<NodeState>,
    interval: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = state.sync_wal().await {
                tracing::warn!("periodic WAL sync failed: {}", e);
            }
        }
    })
}

pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/kv/cas", post(cas_key))
        .route("/kv/:key", get(get_key).put(put_key))
        .route("/lock/acquire/:key", post(lock_acquire))
        .route("/lock/release/:key", post(lock_release))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn get_key(
    State(state): State<Arc<NodeState>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    let m = meshkv_metrics::metrics();

    if let Some(value) = state.cache.lock().await.get(&key) {
        m.cache_hits.inc();
        return (StatusCode::OK, Json(json!({"key": key, "value": value})));
    }
    m.cache_misses.inc();

    let found = state.engine.lock().await.get(&key).cloned();
    match found {
        Some(value) => {
            state.cache.lock().await.put(&key, value.clone());
            (StatusCode::OK, Json(json!({"key": key, "value": value})))
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "Key not found"})),
        ),
    }
}

#[derive(Deserialize)]
struct PutBody {
    value: Value,
}

async fn put_key(
    State(state): State<Arc<NodeState>>,
    Path(key): Path<String>,
    Json(body): Json<PutBody>,
) -> (StatusCode, Json<Value>) {
    let value = VersionedValue::from_wire(body.value);

    let applied = match state.engine.lock().await.put(&key, value.clone()) {
        Ok(applied) => applied,
        Err(e) => return storage_error(e),
    };

    // Cache only tracks applied writes; a stale write must not shadow
    // the newer stored value.
    if applied {
        state.cache.lock().await.put(&key, value);
    }
    (StatusCode::OK, Json(json!({"ok": true})))
}

#[derive(Deserialize)]
struct CasBody {
    key: String,
    expected: Option<VersionedValue>,
    new: VersionedValue,
}

async fn cas_key(
    State(state): State<Arc<NodeState>>,
    Json(body): Json<CasBody>,
) -> (StatusCode, Json<Value>) {
    let outcome = match state
        .engine
        .lock()
        .await
        .cas(&body.key, body.expected.as_ref(), body.new.clone())
    {
        Ok(outcome) => outcome,
        Err(e) => return storage_error(e),
    };

    match outcome {
        CasOutcome::Applied => {
            state.cache.lock().await.put(&body.key, body.new);
            (StatusCode::OK, Json(json!({"ok": true})))
        }
        CasOutcome::Mismatch(current) => (
            StatusCode::OK,
            Json(json!({"ok": false, "current": current})),
        ),
    }
}

#[derive(Deserialize)]
struct LockQuery {
    #[serde(default = "default_ttl")]
    ttl_sec: f64,
}

fn default_ttl() -> f64 {
    30.0
}

async fn lock_acquire(
    State(state): State<Arc<NodeState>>,
    Path(key): Path<String>,
    Query(query): Query<LockQuery>,
) -> Json<Value> {
    match state.locks.lock().await.acquire(&key, query.ttl_sec, now_ts()) {
        AcquireOutcome::Granted { expires_at } => {
            Json(json!({"ok": true, "expires_at": expires_at}))
        }
        AcquireOutcome::Held { expires_at } => {
            Json(json!({"ok": false, "expires_at": expires_at}))
        }
    }
}

async fn lock_release(
    State(state): State<Arc<NodeState>>,
    Path(key): Path<String>,
) -> Json<Value> {
    state.locks.lock().await.release(&key);
    Json(json!({"ok": true}))
}

fn storage_error(e: meshkv_storage::engine::StorageError) -> (StatusCode, Json<Value>) {
    tracing::error!("storage error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": e.to_string()})),
    )
}
