//! HTTP transport for coordinator-to-replica traffic.

use async_trait::async_trait;
use meshkv_common::{RingNode, VersionedValue};
use meshkv_kv::replica_client::{CasReply, LockReply, ReplicaClient, ReplicaError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// `ReplicaClient` backed by a shared `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct HttpReplicaClient {
    http: reqwest::Client,
}

impl HttpReplicaClient {
    /// Build a client with a per-request deadline. The coordinator layers
    /// its own fan-out deadline on top; this one bounds each replica call.
    pub fn new(request_timeout: Duration) -> Result<Self, ReplicaError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ReplicaError::RequestFailed(e.to_string()))?;
        Ok(Self { http })
    }
}

fn classify(e: reqwest::Error) -> ReplicaError {
    if e.is_timeout() {
        ReplicaError::Timeout
    } else {
        ReplicaError::RequestFailed(e.to_string())
    }
}

#[derive(Deserialize)]
struct GetReply {
    value: VersionedValue,
}

#[derive(Deserialize)]
struct OkReply {
    ok: bool,
    #[serde(default)]
    current: Option<VersionedValue>,
    #[serde(default)]
    expires_at: Option<f64>,
}

#[async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn replica_put(
        &self,
        target: &RingNode,
        key: &str,
        value: &VersionedValue,
    ) -> Result<(), ReplicaError> {
        self.http
            .put(format!("{}/kv/{}", target.url, key))
            .json(&json!({"value": value}))
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?;
        Ok(())
    }

    async fn replica_get(
        &self,
        target: &RingNode,
        key: &str,
    ) -> Result<Option<VersionedValue>, ReplicaError> {
        let resp = self
            .http
            .get(format!("{}/kv/{}", target.url, key))
            .send()
            .await
            .map_err(classify)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let reply: GetReply = resp
            .error_for_status()
            .map_err(classify)?
            .json()
            .await
            .map_err(classify)?;
        Ok(Some(reply.value))
    }

    async fn replica_cas(
        &self,
        target: &RingNode,
        key: &str,
        expected: Option<&VersionedValue>,
        new: &VersionedValue,
    ) -> Result<CasReply, ReplicaError> {
        let reply: OkReply = self
            .http
            .post(format!("{}/kv/cas", target.url))
            .json(&json!({"key": key, "expected": expected, "new": new}))
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?
            .json()
            .await
            .map_err(classify)?;
        Ok(CasReply {
            ok: reply.ok,
            current: reply.current,
        })
    }

    async fn lock_acquire(
        &self,
        target: &RingNode,
        key: &str,
        ttl_sec: f64,
    ) -> Result<LockReply, ReplicaError> {
        let reply: OkReply = self
            .http
            .post(format!("{}/lock/acquire/{}", target.url, key))
            .query(&[("ttl_sec", ttl_sec)])
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?
            .json()
            .await
            .map_err(classify)?;
        Ok(LockReply {
            ok: reply.ok,
            expires_at: reply.expires_at,
        })
    }

    async fn lock_release(&self, target: &RingNode, key: &str) -> Result<(), ReplicaError> {
        self.http
            .post(format!("{}/lock/release/{}", target.url, key))
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?;
        Ok(())
    }
}
