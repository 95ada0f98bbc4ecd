//! Client-facing coordinator API.
//!
//! Endpoints:
//! - `GET  /health`             backend count and replication factor
//! - `GET  /kv/:key`            coordinated read, returns the unwrapped payload
//! - `PUT  /kv/:key`            coordinated write, body `{"value": <payload>}`
//! - `POST /kv/cas`             coordinated compare-and-swap on payloads
//! - `POST /lock/acquire/:key`  forwarded to the lock primary
//! - `POST /lock/release/:key`
//!
//! Clients never see `{_ts, data}` envelopes; versioning is internal to
//! the replication path.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use meshkv_kv::coordinator::{Coordinator, KvError};
use meshkv_kv::replica_client::ReplicaClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn router<R: ReplicaClient>(coordinator: Arc<Coordinator<R>>) -> Router {
    Router::new()
        .route("/health", get(health::<R>))
        .route("/kv/cas", post(cas_key::<R>))
        .route("/kv/:key", get(get_key::<R>).put(put_key::<R>))
        .route("/lock/acquire/:key", post(lock_acquire::<R>))
        .route("/lock/release/:key", post(lock_release::<R>))
        .with_state(coordinator)
}

async fn health<R: ReplicaClient>(
    State(coordinator): State<Arc<Coordinator<R>>>,
) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backends": coordinator.ring().nodes().len(),
        "rf": coordinator.ring().rf(),
    }))
}

async fn get_key<R: ReplicaClient>(
    State(coordinator): State<Arc<Coordinator<R>>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    let m = meshkv_metrics::metrics();
    m.kv_gets.inc();
    let timer = meshkv_metrics::start_kv_timer("get");

    let result = coordinator.get(&key).await;
    timer.observe_duration();

    match result {
        Ok(value) => (StatusCode::OK, Json(json!({"key": key, "value": value.data}))),
        Err(e) => kv_error(e),
    }
}

#[derive(Deserialize)]
struct PutBody {
    value: Value,
}

async fn put_key<R: ReplicaClient>(
    State(coordinator): State<Arc<Coordinator<R>>>,
    Path(key): Path<String>,
    Json(body): Json<PutBody>,
) -> (StatusCode, Json<Value>) {
    let m = meshkv_metrics::metrics();
    m.kv_puts.inc();
    let timer = meshkv_metrics::start_kv_timer("put");

    let result = coordinator.put(&key, body.value).await;
    timer.observe_duration();

    match result {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({"ok": true, "written": receipt.written, "rf": receipt.rf})),
        ),
        Err(e) => kv_error(e),
    }
}

#[derive(Deserialize)]
struct CasBody {
    key: String,
    old: Value,
    new: Value,
}

async fn cas_key<R: ReplicaClient>(
    State(coordinator): State<Arc<Coordinator<R>>>,
    Json(body): Json<CasBody>,
) -> (StatusCode, Json<Value>) {
    meshkv_metrics::metrics().kv_cas.inc();
    let timer = meshkv_metrics::start_kv_timer("cas");

    let result = coordinator.cas(&body.key, body.old, body.new).await;
    timer.observe_duration();

    match result {
        Ok(outcome) if outcome.ok => (StatusCode::OK, Json(json!({"ok": true}))),
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({"ok": false, "current": outcome.current})),
        ),
        Err(e) => kv_error(e),
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

async fn lock_acquire<R: ReplicaClient>(
    State(coordinator): State<Arc<Coordinator<R>>>,
    Path(key): Path<String>,
    Query(query): Query<LockQuery>,
) -> (StatusCode, Json<Value>) {
    match coordinator.lock_acquire(&key, query.ttl_sec).await {
        Ok(reply) => (
            StatusCode::OK,
            Json(json!({"ok": reply.ok, "expires_at": reply.expires_at})),
        ),
        Err(e) => kv_error(e),
    }
}

async fn lock_release<R: ReplicaClient>(
    State(coordinator): State<Arc<Coordinator<R>>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    match coordinator.lock_release(&key).await {
        Ok(()) => (StatusCode::OK, Json(json!({"ok": true}))),
        Err(e) => kv_error(e),
    }
}

fn kv_error(e: KvError) -> (StatusCode, Json<Value>) {
    let status = match e {
        KvError::NotFound => StatusCode::NOT_FOUND,
        KvError::NoReplicas
        | KvError::AllReplicasFailed(_)
        | KvError::LockUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({"error": e.to_string()})))
}
