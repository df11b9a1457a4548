// src/main.rs
//
// Minimal demo node that wires up the cortex library:
//
// - RocksDB-backed storage
// - configuration-selected embedding provider
// - Prometheus metrics exporter on /metrics
// - background maintenance loop that cuts due checkpoints and retries
//   pending embeddings at a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;

use cortex::{CortexConfig, DefaultEngine, MetricsRegistry, run_prometheus_http_server};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "cortex=info".to_string()))
        .init();

    if let Err(err) = run_node().await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    // For now, just use defaults. Later you can load from a file/CLI/env.
    let cfg = CortexConfig::default();

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::warn!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Engine (RocksDB + embedder)
    // ---------------------------

    let db_path = cfg.storage.path.clone();
    let engine = Arc::new(
        DefaultEngine::open(cfg).map_err(|e| format!("failed to open engine at {db_path}: {e}"))?,
    );

    match engine.stats() {
        Ok(stats) => tracing::info!(
            facts = stats.counts.facts_total,
            transactions = stats.counts.transactions,
            vectors = stats.index_vectors,
            "engine opened"
        ),
        Err(e) => tracing::warn!("failed to read engine stats: {e}"),
    }

    // ---------------------------
    // Maintenance loop
    // ---------------------------

    let maintenance_engine = engine.clone();
    let maintenance_metrics = metrics.clone();
    tokio::spawn(async move {
        run_maintenance(maintenance_engine, maintenance_metrics).await;
    });

    // ---------------------------
    // Wait for shutdown
    // ---------------------------

    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    Ok(())
}

/// Background maintenance loop.
///
/// Periodically cuts due checkpoints and retries pending embeddings. The
/// engine's operations are blocking, so each round runs on the blocking
/// thread pool.
async fn run_maintenance(engine: Arc<DefaultEngine>, metrics: Arc<MetricsRegistry>) {
    tracing::info!(
        interval_secs = MAINTENANCE_INTERVAL.as_secs(),
        "maintenance loop running"
    );

    loop {
        let engine_round = engine.clone();
        let metrics_round = metrics.clone();

        let round = tokio::task::spawn_blocking(move || {
            let start = std::time::Instant::now();
            match engine_round.checkpoint_if_due() {
                Ok(Some(cp)) => {
                    metrics_round
                        .engine
                        .checkpoint_seconds
                        .observe(start.elapsed().as_secs_f64());
                    tracing::info!(
                        id = %cp.id,
                        start = %cp.tx_start,
                        end = %cp.tx_end,
                        "checkpoint cut"
                    );
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("checkpoint pass failed: {e}"),
            }

            match engine_round.retry_pending_embeddings() {
                Ok(0) => {}
                Ok(n) => tracing::info!(recovered = n, "pending embeddings recovered"),
                Err(e) => tracing::warn!("embedding retry pass failed: {e}"),
            }

            if let Ok(stats) = engine_round.stats() {
                metrics_round
                    .engine
                    .embeddings_pending
                    .set(stats.counts.pending_embeddings as i64);
            }
        })
        .await;

        if let Err(e) = round {
            tracing::warn!("maintenance round panicked: {e}");
        }

        tokio::time::sleep(MAINTENANCE_INTERVAL).await;
    }
}
