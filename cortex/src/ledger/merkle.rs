//! Merkle trees over ledger entry hashes.
//!
//! Checkpoints summarise a contiguous entry range as a balanced binary
//! tree: leaves are the entries' SHA-256 hashes in id order, each parent is
//! `SHA-256(left || right)` over the raw 32-byte child digests, and an odd
//! node at the end of a level is paired with itself (left-duplication).
//! Inclusion proofs walk from a leaf to the root and are verifiable
//! without access to the other entries.

use serde::{Deserialize, Serialize};

use crate::types::{CheckpointId, FactId, LedgerHash, TxId};

/// Which side of the concatenation the sibling hash sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// One level of an inclusion proof: the sibling digest and its side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MerkleStep {
    pub hash: LedgerHash,
    pub side: Side,
}

/// Hashes two child digests into their parent.
fn parent(left: &LedgerHash, right: &LedgerHash) -> LedgerHash {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    LedgerHash::compute(&buf)
}

/// Computes the root of the tree over `leaves`.
///
/// A single leaf is its own root. Returns `None` for an empty slice;
/// checkpoint ranges are never empty.
pub fn compute_root(leaves: &[LedgerHash]) -> Option<LedgerHash> {
    if leaves.is_empty() {
        return None;
    }

    let mut level: Vec<LedgerHash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(parent(left, right));
        }
        level = next;
    }
    Some(level[0])
}

/// Builds the inclusion path for `leaves[index]`.
///
/// Returns `None` when the index is out of range. The path has one step
/// per tree level below the root; folding the leaf through it with
/// [`fold_path`] reproduces the root.
pub fn inclusion_path(leaves: &[LedgerHash], index: usize) -> Option<Vec<MerkleStep>> {
    if index >= leaves.len() {
        return None;
    }

    let mut path = Vec::new();
    let mut level: Vec<LedgerHash> = leaves.to_vec();
    let mut pos = index;

    while level.len() > 1 {
        let sibling_pos = pos ^ 1;
        let (sibling, side) = if sibling_pos < level.len() {
            let side = if pos % 2 == 0 { Side::Right } else { Side::Left };
            (level[sibling_pos], side)
        } else {
            // Odd tail: the node is its own right sibling.
            (level[pos], Side::Right)
        };
        path.push(MerkleStep {
            hash: sibling,
            side,
        });

        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(parent(left, right));
        }
        level = next;
        pos /= 2;
    }

    Some(path)
}

/// Folds a leaf digest through an inclusion path, producing the implied
/// root.
pub fn fold_path(leaf: LedgerHash, path: &[MerkleStep]) -> LedgerHash {
    path.iter().fold(leaf, |acc, step| match step.side {
        Side::Right => parent(&acc, &step.hash),
        Side::Left => parent(&step.hash, &acc),
    })
}

/// Proof that a fact's creating ledger entry is covered by a checkpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub fact_id: FactId,
    /// The entry that created the fact.
    pub tx_id: TxId,
    /// That entry's chain hash; the leaf of the inclusion path.
    pub ledger_hash: LedgerHash,
    pub checkpoint_id: CheckpointId,
    /// Root stored in the checkpoint row.
    pub merkle_root: LedgerHash,
    pub inclusion_path: Vec<MerkleStep>,
}

impl Certificate {
    /// Recomputes the root from the leaf and path and compares it against
    /// the stored checkpoint root.
    pub fn verify(&self) -> bool {
        fold_path(self.ledger_hash, &self.inclusion_path) == self.merkle_root
    }
}
