//! Core domain types used by the engine.
//!
//! This module defines strongly-typed hashes, row identifiers, and the
//! millisecond-precision UTC timestamp shared across the fact store, ledger,
//! and consensus subsystems. The goal is to avoid "naked" integers, byte
//! buffers, and strings in public APIs and instead use domain-specific
//! newtypes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

pub mod agent;
pub mod fact;
pub mod tx;

pub use agent::{Agent, AgentType, ConsensusOutcome, ConsensusState, OutcomeDirection, Vote};
pub use fact::{Confidence, Fact, FactDraft, FactType, FactUpdate, MAX_CONTENT_BYTES};
pub use tx::{ActionKind, LedgerAction, Transaction};

/// Length in bytes of all 256-bit hash values used by the ledger.
pub const HASH_LEN: usize = 32;

/// Strongly-typed SHA-256 ledger hash.
///
/// This type backs every hash in the transaction chain and the Merkle
/// checkpoints. On the wire and in canonical JSON it is always rendered as
/// 64 lowercase hex characters, which is also the persisted column format.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LedgerHash([u8; HASH_LEN]);

impl LedgerHash {
    /// Computes a new [`LedgerHash`] as the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(&digest);
        LedgerHash(out)
    }

    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        LedgerHash(bytes)
    }

    /// Returns the underlying 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Renders the digest as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a 64-character lowercase hex digest.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; HASH_LEN] = bytes.try_into().ok()?;
        Some(LedgerHash(arr))
    }
}

impl fmt::Display for LedgerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for LedgerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerHash({})", self.to_hex())
    }
}

impl Serialize for LedgerHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for LedgerHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = LedgerHash;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-character lowercase hex SHA-256 digest")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LedgerHash, E> {
                LedgerHash::parse_hex(v)
                    .ok_or_else(|| E::custom(format!("invalid ledger hash: {v:?}")))
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// Stable fact row identifier, assigned monotonically by the backend.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct FactId(pub u64);

impl FactId {
    /// Returns the next identifier in allocation order.
    pub fn next(self) -> FactId {
        FactId(self.0 + 1)
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ledger entry identifier; the chain is totally ordered by this value.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TxId(pub u64);

impl TxId {
    /// Returns the next identifier in append order.
    pub fn next(self) -> TxId {
        TxId(self.0 + 1)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Merkle checkpoint identifier.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CheckpointId(pub u64);

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// UTC timestamp with millisecond precision.
///
/// Internally a signed millisecond count since the Unix epoch; in canonical
/// JSON (and therefore in every hashed payload) it renders as ISO-8601 with
/// exactly three fractional digits and a trailing `Z`, e.g.
/// `2026-01-15T09:30:00.250Z`. Hashing and storage must both go through this
/// type so the two never drift.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimestampMs(i64);

impl TimestampMs {
    /// Captures the current wall-clock time, truncated to milliseconds.
    pub fn now() -> Self {
        TimestampMs(Utc::now().timestamp_millis())
    }

    /// Wraps a raw millisecond count since the Unix epoch.
    pub fn from_millis(ms: i64) -> Self {
        TimestampMs(ms)
    }

    /// Returns the raw millisecond count since the Unix epoch.
    pub fn millis(&self) -> i64 {
        self.0
    }

    /// Renders the canonical ISO-8601 form with millisecond precision.
    ///
    /// # Panics
    ///
    /// Panics if the millisecond count is outside chrono's representable
    /// range. Values produced by [`TimestampMs::now`] or parsed from the
    /// canonical form are always representable.
    pub fn to_iso8601(&self) -> String {
        let dt: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.0)
            .single()
            .expect("millisecond timestamp should be within chrono's range");
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Parses the canonical ISO-8601 form, truncating to milliseconds.
    pub fn parse_iso8601(s: &str) -> Option<Self> {
        let dt = DateTime::parse_from_rfc3339(s).ok()?;
        Some(TimestampMs(dt.with_timezone(&Utc).timestamp_millis()))
    }

    /// Age of this timestamp relative to `now`, in fractional days.
    ///
    /// Negative ages (a timestamp in the future of `now`) clamp to zero so
    /// decay never amplifies a vote.
    pub fn age_days(&self, now: TimestampMs) -> f64 {
        const MS_PER_DAY: f64 = 86_400_000.0;
        ((now.0 - self.0) as f64 / MS_PER_DAY).max(0.0)
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Serialize for TimestampMs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for TimestampMs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IsoVisitor;

        impl Visitor<'_> for IsoVisitor {
            type Value = TimestampMs;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an ISO-8601 timestamp with millisecond precision")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TimestampMs, E> {
                TimestampMs::parse_iso8601(v)
                    .ok_or_else(|| E::custom(format!("invalid timestamp: {v:?}")))
            }
        }

        deserializer.deserialize_str(IsoVisitor)
    }
}

impl FromStr for TimestampMs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimestampMs::parse_iso8601(s).ok_or_else(|| format!("invalid timestamp: {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_hash_hex_roundtrip() {
        let h = LedgerHash::compute(b"GENESIS");
        let hex = h.to_hex();
        assert_eq!(hex.len(), HASH_LEN * 2);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(LedgerHash::parse_hex(&hex), Some(h));
    }

    #[test]
    fn ledger_hash_serde_uses_hex_string() {
        let h = LedgerHash::compute(b"abc");
        let json = serde_json::to_string(&h).expect("hash should serialize");
        assert_eq!(json, format!("\"{}\"", h.to_hex()));
        let back: LedgerHash = serde_json::from_str(&json).expect("hash should parse");
        assert_eq!(back, h);
    }

    #[test]
    fn timestamp_canonical_form_has_millis_and_z() {
        let ts = TimestampMs::from_millis(1_700_000_000_250);
        let iso = ts.to_iso8601();
        assert!(iso.ends_with('Z'), "unexpected form: {iso}");
        assert_eq!(iso, "2023-11-14T22:13:20.250Z");
        assert_eq!(TimestampMs::parse_iso8601(&iso), Some(ts));
    }

    #[test]
    fn timestamp_age_days_clamps_future_to_zero() {
        let now = TimestampMs::from_millis(1_000);
        let future = TimestampMs::from_millis(10_000);
        assert_eq!(future.age_days(now), 0.0);

        let day_ago = TimestampMs::from_millis(now.millis() - 86_400_000);
        let age = day_ago.age_days(now);
        assert!((age - 1.0).abs() < 1e-9, "age was {age}");
    }
}
