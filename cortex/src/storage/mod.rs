//! Storage backends for the engine.
//!
//! This module defines the narrow typed interface ([`Backend`]) that every
//! other component talks to, together with two concrete implementations:
//!
//! - an in-memory backend ([`mem::InMemoryBackend`]) suitable for tests,
//! - a RocksDB-backed store ([`rocksdb::RocksDbBackend`]) for persistent
//!   deployments.
//!
//! The interface is deliberately small: typed point reads, scope range
//! scans, chain head accessors, and a single atomic [`Backend::apply`] that
//! commits a batch of typed mutations all-or-nothing. Mutating engine
//! operations read committed state under the writer discipline, stage
//! [`WriteOp`]s, and commit once; readers never observe a partial batch.

use crate::ledger::Checkpoint;
use crate::types::{
    Agent, CheckpointId, ConsensusOutcome, Fact, FactId, LedgerHash, OutcomeDirection,
    TimestampMs, Transaction, TxId, Vote,
};
use crate::types::fact::Confidence;

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryBackend;
pub use self::rocksdb::{RocksDbBackend, StorageConfig};

/// Storage-level error type.
///
/// Engine code converts these into the `Backend` kind of the public
/// taxonomy; the variants exist so logs can tell an I/O failure from a
/// corrupted row.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Underlying store error (I/O, lock, compaction).
    #[error("store: {0}")]
    Store(String),
    /// Required column family was not found.
    #[error("missing column family: {0}")]
    MissingColumnFamily(&'static str),
    /// Corrupted or malformed row or metadata.
    #[error("corrupted: {0}")]
    Corrupted(String),
    /// Row failed to encode or decode.
    #[error("codec: {0}")]
    Codec(String),
}

impl From<::rocksdb::Error> for StorageError {
    fn from(e: ::rocksdb::Error) -> Self {
        StorageError::Store(e.to_string())
    }
}

/// One typed mutation inside a [`WriteBatch`].
///
/// The variants mirror exactly the mutations the data model permits: fact
/// rows are immutable except `valid_until` and the consensus columns,
/// ledger rows are append-only, and votes replace by `(fact_id, agent_id)`.
#[derive(Clone, Debug)]
pub enum WriteOp {
    InsertFact(Fact),
    SetFactValidUntil {
        id: FactId,
        valid_until: TimestampMs,
    },
    SetFactConsensus {
        id: FactId,
        score: f64,
        confidence: Confidence,
    },
    AppendTransaction(Transaction),
    PutAgent(Agent),
    PutVote(Vote),
    PutOutcome(ConsensusOutcome),
    PutRewardMark {
        fact_id: FactId,
        agent_id: String,
        direction: OutcomeDirection,
    },
    PutCheckpoint(Checkpoint),
    PutEmbedding {
        fact_id: FactId,
        vector: Vec<f32>,
    },
    DeleteEmbedding(FactId),
    MarkEmbeddingPending(FactId),
    ClearEmbeddingPending(FactId),
}

/// An ordered batch of mutations committed atomically by
/// [`Backend::apply`].
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Row counts reported by [`Backend::counts`], surfaced through the
/// engine's `stats` operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StorageCounts {
    pub facts_total: u64,
    pub facts_active: u64,
    pub transactions: u64,
    pub agents: u64,
    pub votes: u64,
    pub checkpoints: u64,
    pub outcomes: u64,
    pub embeddings: u64,
    pub pending_embeddings: u64,
}

/// Abstract storage interface consumed by the engine.
///
/// Implementations must make [`Backend::apply`] atomic: either every op in
/// the batch becomes visible or none does. Readers may run concurrently
/// with a commit but never observe a partial batch.
pub trait Backend: Send + Sync {
    // Facts

    fn get_fact(&self, id: FactId) -> Result<Option<Fact>, StorageError>;

    /// Highest allocated fact id, if any rows exist.
    fn max_fact_id(&self) -> Result<Option<FactId>, StorageError>;

    /// All fact rows (active and deprecated) in a scope, ordered by id.
    /// `project = None` scans the whole tenant.
    fn facts_in_scope(
        &self,
        tenant_id: &str,
        project: Option<&str>,
    ) -> Result<Vec<Fact>, StorageError>;

    // Ledger

    fn get_transaction(&self, id: TxId) -> Result<Option<Transaction>, StorageError>;

    /// Entries with `from <= id <= to`, ordered by id.
    fn transactions_in_range(
        &self,
        from: TxId,
        to: TxId,
    ) -> Result<Vec<Transaction>, StorageError>;

    /// Id and hash of the newest ledger entry, if the chain is non-empty.
    fn head(&self) -> Result<Option<(TxId, LedgerHash)>, StorageError>;

    // Agents and votes

    fn get_agent(&self, id: &str) -> Result<Option<Agent>, StorageError>;

    /// All votes currently attached to a fact (latest per agent), ordered
    /// by agent id.
    fn votes_for_fact(&self, fact_id: FactId) -> Result<Vec<Vote>, StorageError>;

    fn get_outcome(&self, fact_id: FactId) -> Result<Option<ConsensusOutcome>, StorageError>;

    fn has_reward_mark(
        &self,
        fact_id: FactId,
        agent_id: &str,
        direction: OutcomeDirection,
    ) -> Result<bool, StorageError>;

    // Checkpoints

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError>;

    fn get_checkpoint(&self, id: CheckpointId) -> Result<Option<Checkpoint>, StorageError>;

    /// The checkpoint whose `[tx_start, tx_end]` range contains `tx`, if
    /// one has been emitted.
    fn checkpoint_covering(&self, tx: TxId) -> Result<Option<Checkpoint>, StorageError>;

    // Embeddings

    fn get_embedding(&self, fact_id: FactId) -> Result<Option<Vec<f32>>, StorageError>;

    /// All stored embeddings, used to warm the vector index at open.
    fn embeddings(&self) -> Result<Vec<(FactId, Vec<f32>)>, StorageError>;

    /// Fact ids whose embedding is still pending a retry.
    fn pending_embeddings(&self) -> Result<Vec<FactId>, StorageError>;

    // Stats and commits

    fn counts(&self) -> Result<StorageCounts, StorageError>;

    /// Best-effort on-disk footprint in bytes, if the backend can estimate
    /// one.
    fn approximate_size_bytes(&self) -> Result<Option<u64>, StorageError>;

    /// Commits every op in `batch` atomically, in order.
    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError>;
}
