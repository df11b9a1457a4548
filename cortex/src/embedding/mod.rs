//! Embedding providers.
//!
//! This module defines the [`Embedder`] trait that abstracts over vector
//! producers, together with two implementations:
//!
//! - [`local::LocalEmbedder`]: a deterministic hashed-feature model with
//!   bounded CPU cost, called synchronously in the store path,
//! - [`http::HttpEmbedder`]: an external provider reached over HTTP whose
//!   failures degrade to a pending-retry queue instead of failing writes.
//!
//! All vectors are 384-dimensional and unit-normalised at production time.

use std::time::Duration;

pub mod http;
pub mod local;

pub use http::HttpEmbedder;
pub use local::LocalEmbedder;

/// Fixed dimensionality of every embedding.
pub const EMBEDDING_DIM: usize = 384;

/// Errors that can occur while producing an embedding.
///
/// These are all non-fatal from the engine's point of view: a failed
/// embedding never fails the write that requested it.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Transport-level error (HTTP failure, timeout).
    #[error("transport: {0}")]
    Transport(String),
    /// The provider returned a malformed or unexpected response.
    #[error("protocol: {0}")]
    Protocol(String),
    /// The provider actively refused the request.
    #[error("service: {0}")]
    Service(String),
    /// The input carries no embeddable signal (empty or whitespace-only).
    #[error("empty input")]
    EmptyInput,
}

/// Abstract embedding producer.
///
/// Within a single provider and version the same input must yield the same
/// output; determinism across providers is not required.
pub trait Embedder: Send + Sync {
    /// Embeds `text` into a unit-normalised vector of [`EMBEDDING_DIM`]
    /// dimensions.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Which provider the engine should construct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EmbeddingProvider {
    #[default]
    Local,
    Api,
}

/// Configuration for the embedding subsystem.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Base URL of the external provider, used when `provider` is `Api`.
    pub api_base_url: String,
    /// Per-call timeout for external providers.
    pub timeout: Duration,
    /// Recency halflife knob carried for adapters that rank semantic
    /// results by age; no core operation consumes it.
    pub halflife_days: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Local,
            api_base_url: "http://127.0.0.1:8600".to_string(),
            timeout: Duration::from_secs(2),
            halflife_days: 30.0,
        }
    }
}

/// Runtime-selected embedder, so the engine can stay generic over one
/// concrete type while configuration picks the provider.
pub enum AnyEmbedder {
    Local(LocalEmbedder),
    Http(HttpEmbedder),
}

impl AnyEmbedder {
    /// Constructs the provider named by `cfg`.
    pub fn from_config(cfg: &EmbeddingConfig) -> Result<Self, EmbedError> {
        match cfg.provider {
            EmbeddingProvider::Local => Ok(AnyEmbedder::Local(LocalEmbedder::new())),
            EmbeddingProvider::Api => Ok(AnyEmbedder::Http(HttpEmbedder::new(
                cfg.api_base_url.clone(),
                cfg.timeout,
            )?)),
        }
    }
}

impl Embedder for AnyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        match self {
            AnyEmbedder::Local(e) => e.embed(text),
            AnyEmbedder::Http(e) => e.embed(text),
        }
    }
}

/// Scales `vector` to unit L2 norm in place. Returns `false` when the norm
/// is zero or non-finite, in which case the vector is left untouched.
pub fn normalize_in_place(vector: &mut [f32]) -> bool {
    let norm_sq: f32 = vector.iter().map(|v| v * v).sum();
    if !norm_sq.is_finite() || norm_sq <= 0.0 {
        return false;
    }
    let norm = norm_sq.sqrt();
    for value in vector.iter_mut() {
        *value /= norm;
    }
    true
}
