//! Ledger entry types.
//!
//! This module defines the persisted transaction row together with the
//! tagged [`LedgerAction`] payload enum. Every mutation of the fact store
//! and consensus subsystem appends exactly one row here; rows are never
//! mutated or deleted afterwards.
//!
//! The `detail` column holds the canonical JSON form of the action payload
//! (see [`crate::canonical`]); the entry hash covers
//! `prev_hash || tenant_id || project || action || detail || timestamp`
//! as a plain UTF-8 concatenation, hashed with SHA-256 and rendered as
//! lowercase hex.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Fact, FactId, LedgerHash, TimestampMs, TxId};
use crate::canonical;
use crate::error::CortexError;

/// The action column of a ledger entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Deprecate,
    Update,
    Vote,
    Checkpoint,
}

impl ActionKind {
    /// Canonical lowercase name, as persisted and hashed.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Deprecate => "deprecate",
            ActionKind::Update => "update",
            ActionKind::Vote => "vote",
            ActionKind::Checkpoint => "checkpoint",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionKind::Create),
            "deprecate" => Ok(ActionKind::Deprecate),
            "update" => Ok(ActionKind::Update),
            "vote" => Ok(ActionKind::Vote),
            "checkpoint" => Ok(ActionKind::Checkpoint),
            other => Err(CortexError::Validation(format!("unknown action: {other:?}"))),
        }
    }
}

/// Tagged payload of a ledger entry, sufficient to reproduce the semantic
/// effect of the mutation it records.
///
/// The canonical JSON of a variant is internally tagged with an `op` field
/// matching the entry's action column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LedgerAction {
    Create {
        fact: Fact,
    },
    Deprecate {
        fact_id: FactId,
        reason: Option<String>,
    },
    Update {
        old_id: FactId,
        new_fact: Fact,
    },
    Vote {
        fact_id: FactId,
        agent_id: String,
        value: i8,
    },
    Checkpoint {
        tx_start: TxId,
        tx_end: TxId,
        root: LedgerHash,
    },
}

impl LedgerAction {
    /// The action column value matching this payload.
    pub fn kind(&self) -> ActionKind {
        match self {
            LedgerAction::Create { .. } => ActionKind::Create,
            LedgerAction::Deprecate { .. } => ActionKind::Deprecate,
            LedgerAction::Update { .. } => ActionKind::Update,
            LedgerAction::Vote { .. } => ActionKind::Vote,
            LedgerAction::Checkpoint { .. } => ActionKind::Checkpoint,
        }
    }

    /// Canonical JSON form used verbatim as the `detail` column.
    pub fn to_detail(&self) -> Result<String, CortexError> {
        canonical::to_canonical_json(self)
    }
}

/// A persisted ledger entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub tenant_id: String,
    pub project: String,
    pub action: ActionKind,
    /// Canonical JSON of the [`LedgerAction`] payload.
    pub detail: String,
    pub prev_hash: LedgerHash,
    pub hash: LedgerHash,
    pub timestamp: TimestampMs,
}

impl Transaction {
    /// Recomputes this entry's hash from its stored inputs.
    ///
    /// Verification compares the result against the stored `hash` column;
    /// any byte flipped in `detail`, `prev_hash`, the scope columns, or the
    /// timestamp changes the outcome.
    pub fn recompute_hash(&self) -> LedgerHash {
        entry_hash(
            &self.prev_hash,
            &self.tenant_id,
            &self.project,
            self.action,
            &self.detail,
            self.timestamp,
        )
    }

    /// Decodes the `detail` column back into its tagged payload.
    pub fn decode_detail(&self) -> Result<LedgerAction, CortexError> {
        serde_json::from_str(&self.detail).map_err(|e| {
            CortexError::Integrity(format!(
                "ledger entry {} carries undecodable detail: {e}",
                self.id
            ))
        })
    }
}

/// Computes an entry hash over the canonical concatenation of its inputs.
pub fn entry_hash(
    prev_hash: &LedgerHash,
    tenant_id: &str,
    project: &str,
    action: ActionKind,
    detail: &str,
    timestamp: TimestampMs,
) -> LedgerHash {
    let mut preimage = String::with_capacity(
        64 + tenant_id.len() + project.len() + detail.len() + 40,
    );
    preimage.push_str(&prev_hash.to_hex());
    preimage.push_str(tenant_id);
    preimage.push_str(project);
    preimage.push_str(action.as_str());
    preimage.push_str(detail);
    preimage.push_str(&timestamp.to_iso8601());
    LedgerHash::compute(preimage.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_kind_matches_detail_tag() {
        let action = LedgerAction::Deprecate {
            fact_id: FactId(7),
            reason: Some("stale".into()),
        };
        assert_eq!(action.kind(), ActionKind::Deprecate);

        let detail = action.to_detail().expect("detail should serialize");
        assert!(detail.contains("\"op\":\"deprecate\""), "detail: {detail}");

        let decoded: LedgerAction = serde_json::from_str(&detail).expect("detail should parse");
        assert_eq!(decoded, action);
    }

    #[test]
    fn entry_hash_changes_with_every_input() {
        let prev = LedgerHash::compute(b"prev");
        let ts = TimestampMs::from_millis(1_700_000_000_000);
        let base = entry_hash(&prev, "t1", "p", ActionKind::Create, "{}", ts);

        assert_ne!(
            base,
            entry_hash(&prev, "t2", "p", ActionKind::Create, "{}", ts)
        );
        assert_ne!(
            base,
            entry_hash(&prev, "t1", "q", ActionKind::Create, "{}", ts)
        );
        assert_ne!(
            base,
            entry_hash(&prev, "t1", "p", ActionKind::Vote, "{}", ts)
        );
        assert_ne!(
            base,
            entry_hash(&prev, "t1", "p", ActionKind::Create, "{\"a\":1}", ts)
        );
        assert_ne!(
            base,
            entry_hash(
                &prev,
                "t1",
                "p",
                ActionKind::Create,
                "{}",
                TimestampMs::from_millis(1_700_000_000_001)
            )
        );
    }

    #[test]
    fn recompute_hash_detects_detail_tampering() {
        let prev = LedgerHash::compute(b"genesis-ish");
        let ts = TimestampMs::from_millis(1_700_000_000_000);
        let detail = "{\"op\":\"vote\"}".to_string();
        let hash = entry_hash(&prev, "t1", "p", ActionKind::Vote, &detail, ts);

        let mut tx = Transaction {
            id: TxId(3),
            tenant_id: "t1".into(),
            project: "p".into(),
            action: ActionKind::Vote,
            detail,
            prev_hash: prev,
            hash,
            timestamp: ts,
        };
        assert_eq!(tx.recompute_hash(), tx.hash);

        tx.detail = "{\"op\":\"VOTE\"}".to_string();
        assert_ne!(tx.recompute_hash(), tx.hash);
    }
}
