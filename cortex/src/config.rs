//! Top-level configuration for a CORTEX engine.
//!
//! This module aggregates configuration for:
//!
//! - storage (database path and creation flags),
//! - embedding (provider selection, API endpoint, timeout),
//! - checkpointing (window + minimum age),
//! - consensus (weights, thresholds, halflife),
//! - metrics exporter (enable flag + listen address).
//!
//! The goal is to have a single `CortexConfig` struct that higher-level
//! binaries (e.g. `main.rs`) can construct from defaults, config files, or
//! environment variables as needed.

use std::net::SocketAddr;

use crate::consensus::ConsensusParams;
use crate::embedding::EmbeddingConfig;
use crate::ledger::CheckpointConfig;
use crate::storage::StorageConfig;

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: this is a fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Top-level configuration for the engine.
#[derive(Clone, Debug)]
pub struct CortexConfig {
    pub storage: StorageConfig,
    /// When false, `store` never calls the embedder; queries can still be
    /// embedded for `search`.
    pub auto_embed: bool,
    pub embedding: EmbeddingConfig,
    pub checkpoint: CheckpointConfig,
    pub consensus: ConsensusParams,
    pub metrics: MetricsConfig,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            auto_embed: true,
            embedding: EmbeddingConfig::default(),
            checkpoint: CheckpointConfig::default(),
            consensus: ConsensusParams::default(),
            metrics: MetricsConfig::default(),
        }
    }
}
