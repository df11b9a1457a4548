//! Canonical JSON serialization.
//!
//! All hashing in the ledger goes through this single chokepoint to avoid
//! format drift: a value is serialized to JSON with object keys sorted,
//! no insignificant whitespace, UTF-8 output, numbers in shortest
//! round-trip form, and timestamps as ISO-8601 with millisecond precision
//! and a trailing `Z` (see [`crate::types::TimestampMs`]).
//!
//! Sorted keys fall out of routing the value through [`serde_json::Value`],
//! whose object representation is a `BTreeMap` ordered by key; shortest
//! round-trip numbers are serde_json's own integer/float formatting. Any
//! change to this module breaks existing chains.

use serde::Serialize;

use crate::error::CortexError;

/// Serializes `value` to its canonical JSON string.
///
/// Struct field order is erased by the `Value` round-trip, so two logically
/// equal values always produce identical bytes regardless of how they were
/// constructed.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, CortexError> {
    let tree = serde_json::to_value(value)
        .map_err(|e| CortexError::Integrity(format!("canonical serialization failed: {e}")))?;
    serde_json::to_string(&tree)
        .map_err(|e| CortexError::Integrity(format!("canonical serialization failed: {e}")))
}

/// Canonical JSON as raw bytes, for hashing.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CortexError> {
    to_canonical_json(value).map(String::into_bytes)
}
