//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed engine metrics, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Engine-related Prometheus metrics.
///
/// These are registered into a [`Registry`] and can be updated from the
/// code driving the engine.
#[derive(Clone)]
pub struct EngineMetrics {
    /// Total facts committed through `store`/`store_many`/`update`.
    pub facts_stored_total: IntCounter,
    /// Total votes accepted by the consensus engine.
    pub votes_cast_total: IntCounter,
    /// Latency of one store unit of work, in seconds.
    pub store_seconds: Histogram,
    /// Latency of a semantic search (embed + index + join), in seconds.
    pub search_seconds: Histogram,
    /// Latency of cutting one Merkle checkpoint, in seconds.
    pub checkpoint_seconds: Histogram,
    /// Facts currently queued for an embedding retry.
    pub embeddings_pending: IntGauge,
    /// Chain breaks observed by verification.
    pub integrity_breaks_total: IntCounter,
}

impl EngineMetrics {
    /// Registers engine metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let facts_stored_total = IntCounter::with_opts(Opts::new(
            "engine_facts_stored_total",
            "Total number of facts committed",
        ))?;
        registry.register(Box::new(facts_stored_total.clone()))?;

        let votes_cast_total = IntCounter::with_opts(Opts::new(
            "engine_votes_cast_total",
            "Total number of votes accepted",
        ))?;
        registry.register(Box::new(votes_cast_total.clone()))?;

        let store_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "engine_store_seconds",
                "Time to commit one store unit of work in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(store_seconds.clone()))?;

        let search_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "engine_search_seconds",
                "Time for one semantic search (embed + index + join) in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )?;
        registry.register(Box::new(search_seconds.clone()))?;

        let checkpoint_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "engine_checkpoint_seconds",
                "Time to cut one Merkle checkpoint in seconds",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )?;
        registry.register(Box::new(checkpoint_seconds.clone()))?;

        let embeddings_pending = IntGauge::with_opts(Opts::new(
            "engine_embeddings_pending",
            "Facts currently queued for an embedding retry",
        ))?;
        registry.register(Box::new(embeddings_pending.clone()))?;

        let integrity_breaks_total = IntCounter::with_opts(Opts::new(
            "engine_integrity_breaks_total",
            "Total number of ledger chain breaks observed by verification",
        ))?;
        registry.register(Box::new(integrity_breaks_total.clone()))?;

        Ok(Self {
            facts_stored_total,
            votes_cast_total,
            store_seconds,
            search_seconds,
            checkpoint_seconds,
            embeddings_pending,
            integrity_breaks_total,
        })
    }
}

/// Wrapper around a Prometheus registry and the engine metrics.
///
/// This is the main handle you pass around in a node. It can be wrapped in
/// an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub engine: EngineMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the engine metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("cortex".to_string()), None)?;
        let engine = EngineMetrics::register(&registry)?;
        Ok(Self { registry, engine })
    }

    /// Encodes all metrics in this registry into the Prometheus text
    /// format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::warn!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn engine_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = EngineMetrics::register(&registry).expect("register metrics");

        metrics.facts_stored_total.inc();
        metrics.votes_cast_total.inc();
        metrics.store_seconds.observe(0.012);
        metrics.search_seconds.observe(0.003);
        metrics.checkpoint_seconds.observe(0.045);
        metrics.embeddings_pending.set(2);
        metrics.integrity_breaks_total.inc();

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.engine.store_seconds.observe(0.01);
        let text = registry.gather_text();
        assert!(text.contains("engine_store_seconds"));
    }
}
