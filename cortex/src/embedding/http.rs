//! HTTP-based embedding provider.
//!
//! This implementation of [`Embedder`] talks to an external embedding
//! service over HTTP. It assumes the service exposes a JSON API of the
//! form:
//!
//! ```json
//! POST /embed
//! { "input": "text to embed" }
//!
//! Response:
//! { "embedding": [0.013, -0.221, ...] }
//! ```
//!
//! The response vector must carry exactly 384 values; it is re-normalised
//! locally so the index never depends on the remote service's norm
//! discipline. Every failure maps to a non-fatal [`EmbedError`]; the write
//! path that requested the embedding still commits and queues the fact for
//! a retry.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{EMBEDDING_DIM, EmbedError, Embedder, normalize_in_place};

/// HTTP-based embedder.
///
/// This client is thread-safe (`Send + Sync`) and can be shared across
/// engine handles. It uses the blocking `reqwest` client internally; async
/// callers should wrap engine operations that may embed in dedicated
/// blocking tasks.
pub struct HttpEmbedder {
    base_url: String,
    client: Client,
}

impl HttpEmbedder {
    /// Constructs a new HTTP embedder pointing at `base_url`, e.g.
    /// `"http://127.0.0.1:8600"` (without a trailing slash).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbedError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        // Avoid accidental double slashes.
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Request payload sent to the embedding service.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

/// Response payload returned by the embedding service.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = self.endpoint("/embed");

        let resp = self
            .client
            .post(&url)
            .json(&EmbedRequest { input: text })
            .send()
            .map_err(|e| EmbedError::Transport(format!("HTTP POST {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EmbedError::Service(format!(
                "embedding service returned HTTP status {status}"
            )));
        }

        let body = resp
            .json::<EmbedResponse>()
            .map_err(|e| EmbedError::Protocol(format!("failed to parse JSON response: {e}")))?;

        let mut vector = body.embedding;
        if vector.len() != EMBEDDING_DIM {
            return Err(EmbedError::Protocol(format!(
                "embedding has {} dimensions, expected {EMBEDDING_DIM}",
                vector.len()
            )));
        }
        if !normalize_in_place(&mut vector) {
            return Err(EmbedError::Protocol(
                "embedding has zero or non-finite norm".to_string(),
            ));
        }
        Ok(vector)
    }
}
