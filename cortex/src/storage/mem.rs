//! In-memory backend.
//!
//! This implementation is useful for unit tests and small throwaway
//! deployments. It keeps every table in a `BTreeMap` behind one `RwLock`,
//! so a committed batch becomes visible to readers in a single step and a
//! failed batch leaves no trace.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::RwLock;

use crate::ledger::Checkpoint;
use crate::types::{
    Agent, CheckpointId, ConsensusOutcome, Fact, FactId, LedgerHash, OutcomeDirection,
    Transaction, TxId, Vote,
};

use super::{Backend, StorageCounts, StorageError, WriteBatch, WriteOp};

#[derive(Default)]
struct Inner {
    facts: BTreeMap<u64, Fact>,
    txs: BTreeMap<u64, Transaction>,
    agents: BTreeMap<String, Agent>,
    votes: BTreeMap<(u64, String), Vote>,
    outcomes: BTreeMap<u64, ConsensusOutcome>,
    rewards: BTreeSet<(u64, u8, String)>,
    checkpoints: BTreeMap<u64, Checkpoint>,
    embeddings: BTreeMap<u64, Vec<f32>>,
    pending: BTreeSet<u64>,
}

/// In-memory implementation of [`Backend`].
#[derive(Default)]
pub struct InMemoryBackend {
    inner: RwLock<Inner>,
}

impl InMemoryBackend {
    /// Creates a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(_: impl std::fmt::Debug) -> StorageError {
    StorageError::Store("backend lock poisoned".to_string())
}

impl Backend for InMemoryBackend {
    fn get_fact(&self, id: FactId) -> Result<Option<Fact>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.facts.get(&id.0).cloned())
    }

    fn max_fact_id(&self) -> Result<Option<FactId>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.facts.keys().next_back().map(|id| FactId(*id)))
    }

    fn facts_in_scope(
        &self,
        tenant_id: &str,
        project: Option<&str>,
    ) -> Result<Vec<Fact>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .facts
            .values()
            .filter(|f| {
                f.tenant_id == tenant_id
                    && project.is_none_or(|p| f.project == p)
            })
            .cloned()
            .collect())
    }

    fn get_transaction(&self, id: TxId) -> Result<Option<Transaction>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.txs.get(&id.0).cloned())
    }

    fn transactions_in_range(
        &self,
        from: TxId,
        to: TxId,
    ) -> Result<Vec<Transaction>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.txs.range(from.0..=to.0).map(|(_, tx)| tx.clone()).collect())
    }

    fn head(&self) -> Result<Option<(TxId, LedgerHash)>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .txs
            .values()
            .next_back()
            .map(|tx| (tx.id, tx.hash)))
    }

    fn get_agent(&self, id: &str) -> Result<Option<Agent>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.agents.get(id).cloned())
    }

    fn votes_for_fact(&self, fact_id: FactId) -> Result<Vec<Vote>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .votes
            .range((fact_id.0, String::new())..)
            .take_while(|((fid, _), _)| *fid == fact_id.0)
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn get_outcome(&self, fact_id: FactId) -> Result<Option<ConsensusOutcome>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.outcomes.get(&fact_id.0).cloned())
    }

    fn has_reward_mark(
        &self,
        fact_id: FactId,
        agent_id: &str,
        direction: OutcomeDirection,
    ) -> Result<bool, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.rewards.contains(&(
            fact_id.0,
            direction.as_key_byte(),
            agent_id.to_string(),
        )))
    }

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.checkpoints.values().next_back().cloned())
    }

    fn get_checkpoint(&self, id: CheckpointId) -> Result<Option<Checkpoint>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.checkpoints.get(&id.0).cloned())
    }

    fn checkpoint_covering(&self, tx: TxId) -> Result<Option<Checkpoint>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .checkpoints
            .values()
            .find(|cp| cp.covers(tx))
            .cloned())
    }

    fn get_embedding(&self, fact_id: FactId) -> Result<Option<Vec<f32>>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.embeddings.get(&fact_id.0).cloned())
    }

    fn embeddings(&self) -> Result<Vec<(FactId, Vec<f32>)>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .embeddings
            .iter()
            .map(|(id, v)| (FactId(*id), v.clone()))
            .collect())
    }

    fn pending_embeddings(&self) -> Result<Vec<FactId>, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.pending.iter().map(|id| FactId(*id)).collect())
    }

    fn counts(&self) -> Result<StorageCounts, StorageError> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(StorageCounts {
            facts_total: inner.facts.len() as u64,
            facts_active: inner.facts.values().filter(|f| f.is_active()).count() as u64,
            transactions: inner.txs.len() as u64,
            agents: inner.agents.len() as u64,
            votes: inner.votes.len() as u64,
            checkpoints: inner.checkpoints.len() as u64,
            outcomes: inner.outcomes.len() as u64,
            embeddings: inner.embeddings.len() as u64,
            pending_embeddings: inner.pending.len() as u64,
        })
    }

    fn approximate_size_bytes(&self) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut inner = self.inner.write().map_err(poisoned)?;

        // Validate first so a bad batch leaves the store untouched: every
        // fact-column mutation must target a row that is either committed
        // or inserted earlier in the same batch.
        let mut will_exist: HashSet<u64> = HashSet::new();
        for op in batch.ops() {
            match op {
                WriteOp::InsertFact(fact) => {
                    if inner.facts.contains_key(&fact.id.0) || !will_exist.insert(fact.id.0) {
                        return Err(StorageError::Corrupted(format!(
                            "fact {} already exists",
                            fact.id
                        )));
                    }
                }
                WriteOp::SetFactValidUntil { id, .. }
                | WriteOp::SetFactConsensus { id, .. } => {
                    if !inner.facts.contains_key(&id.0) && !will_exist.contains(&id.0) {
                        return Err(StorageError::Corrupted(format!(
                            "fact {id} does not exist"
                        )));
                    }
                }
                WriteOp::AppendTransaction(tx) => {
                    if inner.txs.contains_key(&tx.id.0) {
                        return Err(StorageError::Corrupted(format!(
                            "ledger entry {} already exists",
                            tx.id
                        )));
                    }
                }
                _ => {}
            }
        }

        for op in batch.into_ops() {
            match op {
                WriteOp::InsertFact(fact) => {
                    inner.facts.insert(fact.id.0, fact);
                }
                WriteOp::SetFactValidUntil { id, valid_until } => {
                    if let Some(fact) = inner.facts.get_mut(&id.0) {
                        fact.valid_until = Some(valid_until);
                    }
                }
                WriteOp::SetFactConsensus {
                    id,
                    score,
                    confidence,
                } => {
                    if let Some(fact) = inner.facts.get_mut(&id.0) {
                        fact.consensus_score = score;
                        fact.confidence = confidence;
                    }
                }
                WriteOp::AppendTransaction(tx) => {
                    inner.txs.insert(tx.id.0, tx);
                }
                WriteOp::PutAgent(agent) => {
                    inner.agents.insert(agent.id.clone(), agent);
                }
                WriteOp::PutVote(vote) => {
                    inner
                        .votes
                        .insert((vote.fact_id.0, vote.agent_id.clone()), vote);
                }
                WriteOp::PutOutcome(outcome) => {
                    inner.outcomes.insert(outcome.fact_id.0, outcome);
                }
                WriteOp::PutRewardMark {
                    fact_id,
                    agent_id,
                    direction,
                } => {
                    inner
                        .rewards
                        .insert((fact_id.0, direction.as_key_byte(), agent_id));
                }
                WriteOp::PutCheckpoint(cp) => {
                    inner.checkpoints.insert(cp.id.0, cp);
                }
                WriteOp::PutEmbedding { fact_id, vector } => {
                    inner.embeddings.insert(fact_id.0, vector);
                }
                WriteOp::DeleteEmbedding(fact_id) => {
                    inner.embeddings.remove(&fact_id.0);
                }
                WriteOp::MarkEmbeddingPending(fact_id) => {
                    inner.pending.insert(fact_id.0);
                }
                WriteOp::ClearEmbeddingPending(fact_id) => {
                    inner.pending.remove(&fact_id.0);
                }
            }
        }

        Ok(())
    }
}
