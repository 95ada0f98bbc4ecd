//! Metrics and tracing setup for meshkv.
//!
//! Provides a global [`StoreMetrics`] singleton backed by the `prometheus`
//! crate, plus an optional lightweight HTTP server for Prometheus scraping.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Initialize the tracing subscriber with env-filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

/// Global metrics instance.
static METRICS: OnceLock<StoreMetrics> = OnceLock::new();

/// Retrieve (or lazily create) the global metrics singleton.
pub fn metrics() -> &'static StoreMetrics {
    METRICS.get_or_init(StoreMetrics::new)
}

/// All Prometheus metrics for a meshkv process.
pub struct StoreMetrics {
    pub registry: Registry,

    // ── KV operation counters ──
    pub kv_puts: IntCounter,
    pub kv_gets: IntCounter,
    pub kv_cas: IntCounter,
    pub kv_cas_failed: IntCounter,

    // ── KV operation latency ──
    pub kv_latency_secs: HistogramVec,

    // ── Hints ──
    pub hints_stored: IntCounter,
    pub hints_delivered: IntCounter,

    // ── Read repair ──
    pub read_repairs: IntCounter,

    // ── Node-local cache ──
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,

    // ── Locks ──
    pub locks_granted: IntCounter,
    pub locks_rejected: IntCounter,
}

// Manual Debug impl because prometheus types don't derive Debug.
impl std::fmt::Debug for StoreMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreMetrics").finish_non_exhaustive()
    }
}

/// Default histogram buckets (seconds) for KV latency.
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

impl StoreMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let kv_puts = IntCounter::with_opts(Opts::new("meshkv_puts_total", "KV PUT operations"))
            .expect("kv_puts counter");
        let kv_gets = IntCounter::with_opts(Opts::new("meshkv_gets_total", "KV GET operations"))
            .expect("kv_gets counter");
        let kv_cas = IntCounter::with_opts(Opts::new("meshkv_cas_total", "KV CAS operations"))
            .expect("kv_cas counter");
        let kv_cas_failed = IntCounter::with_opts(Opts::new(
            "meshkv_cas_failed_total",
            "KV CAS operations that failed the compare",
        ))
        .expect("kv_cas_failed counter");

        let kv_latency_secs = HistogramVec::new(
            HistogramOpts::new(
                "meshkv_kv_latency_seconds",
                "KV operation latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["op_type"],
        )
        .expect("kv_latency_secs histogram");

        let hints_stored = IntCounter::with_opts(Opts::new(
            "meshkv_hints_stored_total",
            "Hints stored for hinted handoff",
        ))
        .expect("hints_stored counter");
        let hints_delivered = IntCounter::with_opts(Opts::new(
            "meshkv_hints_delivered_total",
            "Hints successfully delivered",
        ))
        .expect("hints_delivered counter");

        let read_repairs = IntCounter::with_opts(Opts::new(
            "meshkv_read_repairs_total",
            "Read repair operations triggered",
        ))
        .expect("read_repairs counter");

        let cache_hits = IntCounter::with_opts(Opts::new(
            "meshkv_cache_hits_total",
            "Node-local LRU cache hits",
        ))
        .expect("cache_hits counter");
        let cache_misses = IntCounter::with_opts(Opts::new(
            "meshkv_cache_misses_total",
            "Node-local LRU cache misses",
        ))
        .expect("cache_misses counter");

        let locks_granted = IntCounter::with_opts(Opts::new(
            "meshkv_locks_granted_total",
            "Lock acquisitions granted",
        ))
        .expect("locks_granted counter");
        let locks_rejected = IntCounter::with_opts(Opts::new(
            "meshkv_locks_rejected_total",
            "Lock acquisitions rejected (lock held)",
        ))
        .expect("locks_rejected counter");

        for c in [
            &kv_puts,
            &kv_gets,
            &kv_cas,
            &kv_cas_failed,
            &hints_stored,
            &hints_delivered,
            &read_repairs,
            &cache_hits,
            &cache_misses,
            &locks_granted,
            &locks_rejected,
        ] {
            registry
                .register(Box::new(c.clone()))
                .expect("register counter");
        }
        registry
            .register(Box::new(kv_latency_secs.clone()))
            .expect("register kv_latency_secs");

        Self {
            registry,
            kv_puts,
            kv_gets,
            kv_cas,
            kv_cas_failed,
            kv_latency_secs,
            hints_stored,
            hints_delivered,
            read_repairs,
            cache_hits,
            cache_misses,
            locks_granted,
            locks_rejected,
        }
    }
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&m.registry.gather(), &mut buf)
        .expect("prometheus text encoding");
    String::from_utf8(buf).expect("prometheus output is valid UTF-8")
}

/// Helper: start a KV operation latency timer. Returns a guard that records
/// elapsed time on drop.
pub fn start_kv_timer(op_type: &str) -> prometheus::HistogramTimer {
    metrics()
        .kv_latency_secs
        .with_label_values(&[op_type])
        .start_timer()
}

// ────────────────────────── Metrics HTTP server ──────────────────────────

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

async fn metrics_handler(
    _req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let body = encode_metrics();
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("valid HTTP response"))
}

/// Serve Prometheus metrics on the given address (`GET /metrics`).
///
/// This spawns a lightweight HTTP/1.1 server. Call from a `tokio::spawn`.
pub async fn serve_metrics(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}/metrics", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                tracing::debug!("metrics connection error: {}", e);
            }
        });
    }
}

// ────────────────────────── Tests ──────────────────────────
