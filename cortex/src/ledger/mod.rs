//! Append-only, hash-chained transaction ledger.
//!
//! Every mutation of the fact store and consensus subsystem is journalled
//! here. Entries are totally ordered by id, each entry's hash covers the
//! previous entry's hash, and periodic Merkle checkpoints summarise
//! contiguous ranges so inclusion of any single entry can be proven without
//! replaying the whole chain.
//!
//! The chain never depends on wall-clock ordering: two entries with equal
//! timestamps order by id.

use serde::{Deserialize, Serialize};

use crate::error::{CortexError, Result};
use crate::storage::Backend;
use crate::types::tx::entry_hash;
use crate::types::{CheckpointId, LedgerAction, LedgerHash, TimestampMs, Transaction, TxId};

pub mod checkpoint;
pub mod merkle;

pub use checkpoint::CheckpointConfig;
pub use merkle::{Certificate, MerkleStep, Side};

/// The well-known previous hash of the first ledger entry:
/// `SHA-256("GENESIS")`, rendered as lowercase hex wherever it is stored.
pub fn genesis_hash() -> LedgerHash {
    LedgerHash::compute(b"GENESIS")
}

/// A Merkle summary of the contiguous entry range `[tx_start, tx_end]`.
///
/// Consecutive checkpoints have no gap and no overlap; the creation of a
/// checkpoint is itself a ledger entry, so later checkpoints cover earlier
/// summaries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub root_hash: LedgerHash,
    pub tx_start: TxId,
    pub tx_end: TxId,
    pub created_at: TimestampMs,
}

impl Checkpoint {
    /// Returns `true` if `tx` falls inside this checkpoint's range.
    pub fn covers(&self, tx: TxId) -> bool {
        self.tx_start <= tx && tx <= self.tx_end
    }
}

/// Builder that threads the chain head through a unit of work.
///
/// A mutating operation reads the committed head once, then appends one or
/// more entries through the cursor; each entry's `prev_hash` is the hash of
/// the entry before it, whether that entry is already committed or staged
/// in the same batch.
#[derive(Clone, Debug)]
pub struct ChainCursor {
    next_id: TxId,
    prev_hash: LedgerHash,
}

impl ChainCursor {
    /// Positions the cursor after the committed head, or at the genesis
    /// when the chain is empty.
    pub fn from_head(head: Option<(TxId, LedgerHash)>) -> Self {
        match head {
            Some((id, hash)) => ChainCursor {
                next_id: id.next(),
                prev_hash: hash,
            },
            None => ChainCursor {
                next_id: TxId(1),
                prev_hash: genesis_hash(),
            },
        }
    }

    /// Id the next appended entry will receive.
    pub fn next_id(&self) -> TxId {
        self.next_id
    }

    /// Builds the next entry and advances the cursor.
    pub fn append(
        &mut self,
        tenant_id: &str,
        project: &str,
        action: &LedgerAction,
        timestamp: TimestampMs,
    ) -> Result<Transaction> {
        let detail = action.to_detail()?;
        let kind = action.kind();
        let hash = entry_hash(&self.prev_hash, tenant_id, project, kind, &detail, timestamp);

        let tx = Transaction {
            id: self.next_id,
            tenant_id: tenant_id.to_string(),
            project: project.to_string(),
            action: kind,
            detail,
            prev_hash: self.prev_hash,
            hash,
            timestamp,
        };

        self.next_id = self.next_id.next();
        self.prev_hash = hash;
        Ok(tx)
    }
}

/// Result of a chain verification walk.
#[derive(Clone, Debug, PartialEq)]
pub enum VerifyOutcome {
    /// Every entry in the range recomputed to its stored hash and linked
    /// to its predecessor.
    Ok { entries_checked: u64 },
    /// The chain is broken at entry `at`; `expected` is the hash the
    /// walker derived, `found` the value actually stored.
    Break {
        at: TxId,
        expected: String,
        found: String,
    },
}

impl VerifyOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, VerifyOutcome::Ok { .. })
    }
}

/// Walks entries `[from, to]` in order, recomputing each hash from its
/// stored inputs and checking the `prev_hash` linkage. O(n) over the range.
///
/// `from`/`to` default to the first entry and the committed head. Large
/// chains should be verified in explicit chunks rather than one unbounded
/// call.
pub fn verify_chain<B: Backend>(
    backend: &B,
    from: Option<TxId>,
    to: Option<TxId>,
) -> Result<VerifyOutcome> {
    let Some((head_id, _)) = backend.head()? else {
        return Ok(VerifyOutcome::Ok { entries_checked: 0 });
    };

    let from = from.unwrap_or(TxId(1));
    let to = to.unwrap_or(head_id);
    if from.0 == 0 || from > to {
        return Err(CortexError::Validation(format!(
            "invalid verification range [{from}, {to}]"
        )));
    }

    // Anchor the prev link: genesis for the chain start, otherwise the
    // stored hash of the entry just before the range.
    let mut expected_prev = if from == TxId(1) {
        genesis_hash()
    } else {
        let anchor_id = TxId(from.0 - 1);
        backend
            .get_transaction(anchor_id)?
            .ok_or_else(|| {
                CortexError::Integrity(format!("ledger entry {anchor_id} is missing"))
            })?
            .hash
    };

    let entries = backend.transactions_in_range(from, to)?;
    let mut expected_id = from;
    let mut checked = 0u64;

    for entry in &entries {
        if entry.id != expected_id {
            return Err(CortexError::Integrity(format!(
                "ledger entry {expected_id} is missing (next stored id is {})",
                entry.id
            )));
        }

        if entry.prev_hash != expected_prev {
            return Ok(VerifyOutcome::Break {
                at: entry.id,
                expected: expected_prev.to_hex(),
                found: entry.prev_hash.to_hex(),
            });
        }

        let recomputed = entry.recompute_hash();
        if recomputed != entry.hash {
            return Ok(VerifyOutcome::Break {
                at: entry.id,
                expected: recomputed.to_hex(),
                found: entry.hash.to_hex(),
            });
        }

        expected_prev = entry.hash;
        expected_id = expected_id.next();
        checked += 1;
    }

    if expected_id <= to {
        return Err(CortexError::Integrity(format!(
            "ledger entry {expected_id} is missing"
        )));
    }

    Ok(VerifyOutcome::Ok {
        entries_checked: checked,
    })
}
