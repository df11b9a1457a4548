//! Cortex library crate.
//!
//! This crate provides the core building blocks of a local-first,
//! tamper-evident memory substrate for autonomous agents:
//!
//! - strongly-typed domain rows (`types`),
//! - a canonical JSON serializer all hashing goes through (`canonical`),
//! - pluggable storage backends (`storage`),
//! - an append-only, hash-chained ledger with Merkle checkpoints
//!   (`ledger`),
//! - embedding providers (`embedding`) and a scoped vector index
//!   (`index`),
//! - a reputation-weighted consensus engine (`consensus`),
//! - Prometheus-based metrics (`metrics`),
//! - and the engine facade tying them together (`engine`).
//!
//! Higher-level binaries and adapters (CLIs, HTTP/MCP front-ends) compose
//! these pieces; the engine itself exposes blocking calls and owns no
//! network surface.

pub mod canonical;
pub mod config;
pub mod consensus;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-export top-level configuration types.
pub use config::{CortexConfig, MetricsConfig};

// Re-export the engine facade and its result types.
pub use engine::{CortexEngine, DefaultEngine, EngineStats, StoreReceipt};

// Re-export the error taxonomy.
pub use error::{CortexError, Result};

// Re-export storage backends.
pub use storage::{Backend, InMemoryBackend, RocksDbBackend, StorageConfig, StorageError};

// Re-export ledger verification and proof types.
pub use ledger::{
    Certificate, ChainCursor, Checkpoint, CheckpointConfig, VerifyOutcome, genesis_hash,
};

// Re-export embedding interfaces and providers.
pub use embedding::{
    AnyEmbedder, EMBEDDING_DIM, EmbedError, Embedder, EmbeddingConfig, EmbeddingProvider,
    HttpEmbedder, LocalEmbedder,
};

// Re-export the vector index.
pub use index::{SearchHit, VectorIndex};

// Re-export consensus types.
pub use consensus::{ConsensusEngine, ConsensusParams, VoteOutcome};

// Re-export metrics registry.
pub use metrics::{EngineMetrics, MetricsRegistry, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;
