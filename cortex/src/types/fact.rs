//! Fact rows and their input forms.
//!
//! A fact is the unit of memory: a typed, timestamped, soft-deletable
//! statement scoped to a `(tenant_id, project)` pair. Rows are immutable
//! once written except for `valid_until` (soft delete) and the
//! consensus-owned columns (`consensus_score`, consensus-driven
//! `confidence`); every other "update" deprecates the old row and creates a
//! new one.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{FactId, TimestampMs, TxId};
use crate::error::CortexError;

/// Upper bound on `content`, in UTF-8 bytes.
pub const MAX_CONTENT_BYTES: usize = 50_000;

/// Category of a fact.
///
/// The ordering of variants is load-bearing: recall sorts equal-score facts
/// by this declaration order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FactType {
    Knowledge,
    Decision,
    Error,
    Ghost,
    Config,
    Bridge,
    Axiom,
    Rule,
}

impl FactType {
    /// Canonical lowercase name, as persisted and hashed.
    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Knowledge => "knowledge",
            FactType::Decision => "decision",
            FactType::Error => "error",
            FactType::Ghost => "ghost",
            FactType::Config => "config",
            FactType::Bridge => "bridge",
            FactType::Axiom => "axiom",
            FactType::Rule => "rule",
        }
    }
}

impl fmt::Display for FactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactType {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge" => Ok(FactType::Knowledge),
            "decision" => Ok(FactType::Decision),
            "error" => Ok(FactType::Error),
            "ghost" => Ok(FactType::Ghost),
            "config" => Ok(FactType::Config),
            "bridge" => Ok(FactType::Bridge),
            "axiom" => Ok(FactType::Axiom),
            "rule" => Ok(FactType::Rule),
            other => Err(CortexError::Validation(format!(
                "unknown fact_type: {other:?}"
            ))),
        }
    }
}

/// Caller- or consensus-assigned confidence of a fact.
///
/// `Verified` and `Disputed` are owned by the consensus engine; drafts
/// carrying them are rejected at the API edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Stated,
    Inferred,
    Observed,
    Verified,
    Disputed,
}

impl Confidence {
    /// Canonical lowercase name, as persisted and hashed.
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Stated => "stated",
            Confidence::Inferred => "inferred",
            Confidence::Observed => "observed",
            Confidence::Verified => "verified",
            Confidence::Disputed => "disputed",
        }
    }

    /// Returns `true` for the consensus-owned terminal values.
    pub fn is_consensus_owned(&self) -> bool {
        matches!(self, Confidence::Verified | Confidence::Disputed)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stated" => Ok(Confidence::Stated),
            "inferred" => Ok(Confidence::Inferred),
            "observed" => Ok(Confidence::Observed),
            "verified" => Ok(Confidence::Verified),
            "disputed" => Ok(Confidence::Disputed),
            other => Err(CortexError::Validation(format!(
                "unknown confidence: {other:?}"
            ))),
        }
    }
}

/// A stored fact row.
///
/// Collections use `BTreeMap`/`BTreeSet` so the canonical JSON form of a
/// fact (inside ledger `detail` payloads) is deterministic without extra
/// sorting passes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub tenant_id: String,
    pub project: String,
    pub content: String,
    pub fact_type: FactType,
    pub tags: BTreeSet<String>,
    pub confidence: Confidence,
    pub source: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    /// Creation instant; facts are valid from this point.
    pub valid_from: TimestampMs,
    /// Soft-delete marker; `None` means currently active.
    pub valid_until: Option<TimestampMs>,
    /// Reputation-weighted agreement in `[0, 2]`; 1.0 is neutral.
    pub consensus_score: f64,
    /// Ledger entry that created this row.
    pub created_tx_id: TxId,
}

impl Fact {
    /// Returns `true` while the fact has not been soft-deleted.
    pub fn is_active(&self) -> bool {
        self.valid_until.is_none()
    }

    /// Temporal validity test: valid at `t` iff `valid_from <= t` and the
    /// fact was not yet deprecated at `t` (half-open interval).
    pub fn valid_at(&self, t: TimestampMs) -> bool {
        self.valid_from <= t
            && match self.valid_until {
                None => true,
                Some(until) => until > t,
            }
    }
}

/// Input form for [`store`](crate::engine::CortexEngine::store) and
/// [`store_many`](crate::engine::CortexEngine::store_many).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FactDraft {
    pub tenant_id: String,
    pub project: String,
    pub content: String,
    pub fact_type: FactType,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FactDraft {
    /// Starts a draft with the required fields and empty extras.
    pub fn new(
        tenant_id: impl Into<String>,
        project: impl Into<String>,
        content: impl Into<String>,
        fact_type: FactType,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project: project.into(),
            content: content.into(),
            fact_type,
            tags: BTreeSet::new(),
            confidence: Confidence::Stated,
            source: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Replaces the tag set.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the caller-assigned confidence.
    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the originating agent or process.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Inserts a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Checks the draft against the input rules shared by all write paths.
    pub fn validate(&self) -> Result<(), CortexError> {
        if self.tenant_id.trim().is_empty() {
            return Err(CortexError::Validation("tenant_id must not be empty".into()));
        }
        if self.project.trim().is_empty() {
            return Err(CortexError::Validation("project must not be empty".into()));
        }
        if self.content.len() > MAX_CONTENT_BYTES {
            return Err(CortexError::Validation(format!(
                "content is {} bytes, exceeds limit of {MAX_CONTENT_BYTES}",
                self.content.len()
            )));
        }
        if self.confidence.is_consensus_owned() {
            return Err(CortexError::Validation(format!(
                "confidence {:?} is assigned by the consensus engine, not by callers",
                self.confidence.as_str()
            )));
        }
        Ok(())
    }
}

/// Field overrides for [`update`](crate::engine::CortexEngine::update).
///
/// `None` carries the old row's value forward; `Some` replaces it.
#[derive(Clone, Debug, Default)]
pub struct FactUpdate {
    pub content: String,
    pub fact_type: Option<FactType>,
    pub tags: Option<BTreeSet<String>>,
    pub confidence: Option<Confidence>,
    pub source: Option<String>,
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl FactUpdate {
    /// An update that only replaces the content.
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}
