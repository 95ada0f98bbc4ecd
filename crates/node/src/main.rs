//! meshkv-node: entry point for a storage node.
//!
//! Loads config, opens the WAL-backed storage engine, and serves the
//! replica HTTP API (KV reads/writes, CAS, TTL locks) on the configured
//! listen address.

use meshkv_net::node_server::{self, NodeState};
use meshkv_storage::cache::LruCache;
use meshkv_storage::engine::StorageEngine;
use meshkv_storage::wal::FsyncPolicy;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    meshkv_metrics::init_tracing();

    // Load config: first CLI arg is the YAML config path
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "node.yaml".to_string());

    let config = meshkv_config::load_node_from_file(std::path::Path::new(&config_path))
        .unwrap_or_else(|e| {
            tracing::warn!(
                "failed to load config from {}: {}, using defaults",
                config_path,
                e
            );
            // Minimal default: listen on 127.0.0.1:9000
            meshkv_config::load_node_from_str("listen: \"127.0.0.1:9000\"\n")
                .expect("hardcoded default config must parse")
        });

    tracing::info!("node listening on {}", config.listen);

    // Open storage engine
    let fsync = FsyncPolicy::from_str_config(&config.storage.fsync);
    let engine = StorageEngine::open(&config.storage.data_dir, fsync)?;
    tracing::info!(
        "storage open at {} ({} key(s) recovered)",
        config.storage.data_dir.display(),
        engine.key_count()
    );

    let cache = LruCache::new(config.cache.max_items, config.cache.max_bytes);
    let state = Arc::new(NodeState::new(engine, cache));

    if fsync == FsyncPolicy::Batch {
        node_server::spawn_wal_sync(
            state.clone(),
            std::time::Duration::from_millis(config.storage.sync_interval_ms),
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
    axum::serve(listener, node_server::router(state))
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
