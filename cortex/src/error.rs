//! Engine error taxonomy.
//!
//! Public operations return one of these kinds; internal failure escalation
//! uses the same taxonomy. `Backend` failures roll back the surrounding
//! unit of work and may be retried by callers; `Integrity` is never
//! silently recovered: once raised, the engine refuses further writes
//! until explicitly reset.

use crate::storage::StorageError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CortexError>;

/// All error kinds surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    /// Malformed input: empty scope fields, oversize content, unknown
    /// enum names, vote values outside `{-1, 0, +1}`.
    #[error("validation: {0}")]
    Validation(String),

    /// Fact, agent, or checkpoint does not exist in the requested scope.
    #[error("not found: {0}")]
    NotFound(String),

    /// A fact exists but belongs to a different tenant.
    #[error("scope violation: {0}")]
    ScopeViolation(String),

    /// Storage or I/O failure; the unit of work rolled back.
    #[error("backend: {0}")]
    Backend(#[from] StorageError),

    /// The ledger's invariants cannot be maintained: chain break detected
    /// or canonical form mismatch.
    #[error("integrity: {0}")]
    Integrity(String),

    /// Embedding failed for a known non-fatal reason. On write paths the
    /// triggering mutation still commits and the fact is queued for a
    /// later embedding retry.
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),

    /// A concurrent mutation changed the row the caller intended to
    /// modify.
    #[error("conflict: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_convert_to_backend() {
        let err: CortexError = StorageError::Corrupted("tip hash length".into()).into();
        assert!(matches!(err, CortexError::Backend(_)));
        assert!(err.to_string().starts_with("backend:"));
    }
}
