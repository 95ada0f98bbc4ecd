//! meshkv-front: entry point for the coordinating front.
//!
//! Loads config, builds the consistent hash ring over the configured
//! backends, wires the KV coordinator with hinted handoff, and serves
//! the client-facing HTTP API.

use meshkv_kv::coordinator::{Coordinator, QuorumConfig};
use meshkv_kv::hint_store::HintStore;
use meshkv_net::front_server;
use meshkv_net::replica_client::HttpReplicaClient;
use meshkv_ring::Ring;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    meshkv_metrics::init_tracing();

    // Load config: first CLI arg is the YAML config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "front.yaml".to_string());

    let config = meshkv_config::load_front_from_file(std::path::Path::new(&config_path))?;
    config.validate()?;

    let ring = Arc::new(Ring::new(config.ring_nodes(), config.effective_rf()));
    tracing::info!(
        "front listening on {} ({} backend(s), rf={})",
        config.listen,
        ring.nodes().len(),
        ring.rf()
    );

    let request_timeout = Duration::from_millis(config.kv.request_timeout_ms);
    let replica_client = Arc::new(HttpReplicaClient::new(request_timeout)?);

    let quorum_config = QuorumConfig {
        request_timeout,
        read_repair: config.kv.read_repair,
        hinted_handoff: config.kv.hinted_handoff,
    };

    // Hint store and delivery task (if hinted handoff is enabled)
    let hint_store = config
        .kv
        .hinted_handoff
        .then(|| Arc::new(RwLock::new(HintStore::new())));

    let mut coordinator = Coordinator::new(ring.clone(), replica_client.clone(), quorum_config);
    if let Some(ref hs) = hint_store {
        coordinator = coordinator.with_hint_store(hs.clone());
    }
    let coordinator = Arc::new(coordinator);

    if let Some(hs) = hint_store {
        meshkv_kv::hint_flusher::spawn_hint_flusher(
            hs,
            replica_client,
            ring,
            Duration::from_secs(config.kv.hint_flush_secs),
            config.kv.max_hints_per_cycle,
        );
    }

    // Spawn metrics HTTP server if configured
    if let Some(metrics_port) = config.metrics_port {
        let metrics_addr: std::net::SocketAddr = format!("0.0.0.0:{}", metrics_port)
            .parse()
            .expect("valid metrics address");
        tokio::spawn(async move {
            if let Err(e) = meshkv_metrics::serve_metrics(metrics_addr).await {
                tracing::warn!("metrics server failed: {}", e);
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    axum::serve(listener, front_server::router(coordinator))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("shutdown signal received");
}
