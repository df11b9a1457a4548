//! Engine facade.
//!
//! [`CortexEngine`] composes the storage backend, ledger, embedding
//! provider, vector index, and consensus engine behind the public
//! operations. It is generic over:
//!
//! - `B`: storage backend implementing [`Backend`],
//! - `E`: embedding provider implementing [`Embedder`].
//!
//! Every mutating operation is one transactional unit of work: it takes
//! the writer mutex, reads committed state, stages typed writes, and
//! commits them through one atomic [`Backend::apply`]. Read operations
//! never take the writer mutex. The in-process vector index is refreshed
//! only after a successful commit, so index visibility trails the fact
//! store by at most one mutation, never the other way around.
//!
//! Once a chain break has been observed the engine latches into a
//! read-only mode: every further mutation fails with an integrity error
//! until an operator calls [`CortexEngine::reset_integrity`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::CortexConfig;
use crate::consensus::{ConsensusEngine, VoteOutcome};
use crate::embedding::{AnyEmbedder, EmbedError, Embedder};
use crate::error::{CortexError, Result};
use crate::index::VectorIndex;
use crate::ledger::{
    self, Certificate, ChainCursor, Checkpoint, VerifyOutcome, checkpoint, merkle,
};
use crate::storage::{
    Backend, RocksDbBackend, StorageCounts, WriteBatch, WriteOp,
};
use crate::types::fact::{Confidence, Fact, FactDraft, FactUpdate};
use crate::types::{
    Agent, FactId, LedgerAction, LedgerHash, TimestampMs, Transaction, TxId, Vote,
};

/// Scope columns of the ledger entries the engine appends on its own
/// behalf (checkpoints), which belong to no tenant.
const SYSTEM_TENANT: &str = "_system";
const SYSTEM_PROJECT: &str = "_ledger";

/// What `store` hands back: the new row id and the hash of the ledger
/// entry that recorded it.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreReceipt {
    pub fact_id: FactId,
    pub tx_hash: LedgerHash,
}

/// Snapshot of engine counters and sizes.
#[derive(Clone, Debug)]
pub struct EngineStats {
    pub counts: StorageCounts,
    /// Live vectors currently searchable.
    pub index_vectors: usize,
    /// Backend's own estimate of its on-disk footprint, when available.
    pub db_size_bytes: Option<u64>,
    /// Newest ledger entry, if the chain is non-empty.
    pub ledger_head: Option<(TxId, LedgerHash)>,
}

/// The transactional memory engine; see the module docs for semantics.
pub struct CortexEngine<B, E> {
    config: CortexConfig,
    backend: B,
    embedder: Option<E>,
    index: VectorIndex,
    consensus: ConsensusEngine,
    writer: Mutex<()>,
    chain_broken: AtomicBool,
}

/// Engine stack used by a "typical" node: RocksDB storage and the
/// configuration-selected embedding provider.
pub type DefaultEngine = CortexEngine<RocksDbBackend, AnyEmbedder>;

impl DefaultEngine {
    /// Opens a RocksDB-backed engine with the provider named in `config`.
    pub fn open(config: CortexConfig) -> Result<Self> {
        let backend = RocksDbBackend::open(&config.storage)?;
        let embedder = AnyEmbedder::from_config(&config.embedding)
            .map_err(|e| CortexError::EmbedderUnavailable(e.to_string()))?;
        Self::new(config, backend, Some(embedder))
    }
}

impl<B: Backend, E: Embedder> CortexEngine<B, E> {
    /// Assembles an engine over an opened backend, warming the vector
    /// index from the stored embeddings of active facts.
    pub fn new(config: CortexConfig, backend: B, embedder: Option<E>) -> Result<Self> {
        let index = VectorIndex::new(crate::embedding::EMBEDDING_DIM);

        for (fact_id, vector) in backend.embeddings()? {
            match backend.get_fact(fact_id)? {
                Some(fact) if fact.is_active() => {
                    index.insert(fact_id, &fact.tenant_id, &fact.project, vector);
                }
                _ => {
                    // Stale vector for a deprecated or missing fact; leave
                    // it out of the index, storage compaction is handled
                    // by the deprecation path.
                }
            }
        }

        tracing::info!(vectors = index.len(), "vector index warmed");

        Ok(Self {
            consensus: ConsensusEngine::new(config.consensus.clone()),
            config,
            backend,
            embedder,
            index,
            writer: Mutex::new(()),
            chain_broken: AtomicBool::new(false),
        })
    }

    /// Returns a reference to the underlying backend.
    ///
    /// This is mainly useful for tests and tooling; callers should
    /// normally go through the public operations.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &CortexConfig {
        &self.config
    }

    fn ensure_chain_usable(&self) -> Result<()> {
        if self.chain_broken.load(Ordering::Acquire) {
            return Err(CortexError::Integrity(
                "ledger chain is broken; writes are disabled until reset".into(),
            ));
        }
        Ok(())
    }

    fn latch_chain_broken(&self) {
        self.chain_broken.store(true, Ordering::Release);
    }

    /// Clears the integrity latch after operator intervention.
    pub fn reset_integrity(&self) {
        tracing::warn!("integrity latch reset by operator");
        self.chain_broken.store(false, Ordering::Release);
    }

    /// Looks a fact up and enforces tenant scoping.
    fn fact_in_scope(&self, tenant_id: &str, fact_id: FactId) -> Result<Fact> {
        let fact = self
            .backend
            .get_fact(fact_id)?
            .ok_or_else(|| CortexError::NotFound(format!("no fact with id {fact_id}")))?;
        if fact.tenant_id != tenant_id {
            return Err(CortexError::ScopeViolation(format!(
                "fact {fact_id} belongs to another tenant"
            )));
        }
        Ok(fact)
    }

    fn require_scope(tenant_id: &str, project: &str) -> Result<()> {
        if tenant_id.trim().is_empty() {
            return Err(CortexError::Validation("tenant_id must not be empty".into()));
        }
        if project.trim().is_empty() {
            return Err(CortexError::Validation("project must not be empty".into()));
        }
        Ok(())
    }

    /// Embeds `content` for the store path, translating failures into the
    /// degraded pending-retry protocol. Returns the vector to index after
    /// commit, if one was produced.
    fn stage_embedding(
        &self,
        fact_id: FactId,
        content: &str,
        batch: &mut WriteBatch,
    ) -> Option<Vec<f32>> {
        if !self.config.auto_embed {
            return None;
        }
        let embedder = self.embedder.as_ref()?;

        match embedder.embed(content) {
            Ok(vector) => {
                batch.push(WriteOp::PutEmbedding {
                    fact_id,
                    vector: vector.clone(),
                });
                Some(vector)
            }
            Err(EmbedError::EmptyInput) => {
                // Nothing to embed; a retry would fail the same way.
                None
            }
            Err(e) => {
                tracing::warn!(%fact_id, error = %e, "embedding failed, queueing retry");
                batch.push(WriteOp::MarkEmbeddingPending(fact_id));
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Fact store operations
    // ------------------------------------------------------------------

    /// Stores one fact: fact row, ledger entry, and (when configured) its
    /// embedding commit as a single unit.
    pub fn store(&self, draft: FactDraft) -> Result<StoreReceipt> {
        let mut receipts = self.store_many(vec![draft])?;
        Ok(receipts.pop().expect("store_many returned one receipt per draft"))
    }

    /// Stores a batch of facts in one atomic unit. Ordering within the
    /// batch is preserved in the ledger; on any failure nothing commits.
    pub fn store_many(&self, drafts: Vec<FactDraft>) -> Result<Vec<StoreReceipt>> {
        self.ensure_chain_usable()?;
        if drafts.is_empty() {
            return Ok(Vec::new());
        }
        for draft in &drafts {
            draft.validate()?;
        }

        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let now = TimestampMs::now();
        let mut cursor = ChainCursor::from_head(self.backend.head()?);
        let mut next_fact_id = self
            .backend
            .max_fact_id()?
            .map_or(FactId(1), FactId::next);

        let mut batch = WriteBatch::new();
        let mut receipts = Vec::with_capacity(drafts.len());
        let mut index_inserts = Vec::new();

        for draft in drafts {
            let fact = Fact {
                id: next_fact_id,
                tenant_id: draft.tenant_id,
                project: draft.project,
                content: draft.content,
                fact_type: draft.fact_type,
                tags: draft.tags,
                confidence: draft.confidence,
                source: draft.source,
                metadata: draft.metadata,
                valid_from: now,
                valid_until: None,
                consensus_score: 1.0,
                created_tx_id: cursor.next_id(),
            };
            next_fact_id = next_fact_id.next();

            let action = LedgerAction::Create { fact: fact.clone() };
            let tx = cursor.append(&fact.tenant_id, &fact.project, &action, now)?;

            if let Some(vector) = self.stage_embedding(fact.id, &fact.content, &mut batch) {
                index_inserts.push((fact.id, fact.tenant_id.clone(), fact.project.clone(), vector));
            }

            receipts.push(StoreReceipt {
                fact_id: fact.id,
                tx_hash: tx.hash,
            });
            batch.push(WriteOp::InsertFact(fact));
            batch.push(WriteOp::AppendTransaction(tx));
        }

        self.backend.apply(batch)?;

        for (fact_id, tenant, project, vector) in index_inserts {
            self.index.insert(fact_id, &tenant, &project, vector);
        }

        tracing::debug!(count = receipts.len(), "stored facts");
        Ok(receipts)
    }

    /// Soft-deletes a fact. Idempotent: deprecating an already-deprecated
    /// fact succeeds without appending a ledger entry.
    pub fn deprecate(
        &self,
        tenant_id: &str,
        fact_id: FactId,
        reason: Option<String>,
    ) -> Result<()> {
        self.ensure_chain_usable()?;
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let fact = self.fact_in_scope(tenant_id, fact_id)?;
        if !fact.is_active() {
            return Ok(());
        }

        // Clamp against a regressing clock so valid_from <= valid_until
        // holds on every row.
        let now = TimestampMs::now().max(fact.valid_from);
        let mut cursor = ChainCursor::from_head(self.backend.head()?);
        let action = LedgerAction::Deprecate { fact_id, reason };
        let tx = cursor.append(&fact.tenant_id, &fact.project, &action, now)?;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetFactValidUntil {
            id: fact_id,
            valid_until: now,
        });
        batch.push(WriteOp::AppendTransaction(tx));
        batch.push(WriteOp::DeleteEmbedding(fact_id));
        batch.push(WriteOp::ClearEmbeddingPending(fact_id));

        self.backend.apply(batch)?;
        self.index.remove(fact_id);

        tracing::debug!(%fact_id, "fact deprecated");
        Ok(())
    }

    /// Supersedes a fact: deprecates the old row and creates a new one
    /// carrying tags and metadata forward unless overridden. Appends the
    /// deprecation entry, then the update entry.
    pub fn update(
        &self,
        tenant_id: &str,
        fact_id: FactId,
        update: FactUpdate,
    ) -> Result<FactId> {
        self.ensure_chain_usable()?;
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let old = self.fact_in_scope(tenant_id, fact_id)?;
        if !old.is_active() {
            return Err(CortexError::Conflict(format!(
                "fact {fact_id} is already deprecated"
            )));
        }

        let draft = FactDraft {
            tenant_id: old.tenant_id.clone(),
            project: old.project.clone(),
            content: update.content,
            fact_type: update.fact_type.unwrap_or(old.fact_type),
            tags: update.tags.unwrap_or_else(|| old.tags.clone()),
            // Consensus-owned confidence belongs to the old row's vote
            // history; the superseding row starts over as a plain claim.
            confidence: update.confidence.unwrap_or(if old.confidence.is_consensus_owned() {
                Confidence::Stated
            } else {
                old.confidence
            }),
            source: update.source.or_else(|| old.source.clone()),
            metadata: update.metadata.unwrap_or_else(|| old.metadata.clone()),
        };
        draft.validate()?;

        let now = TimestampMs::now().max(old.valid_from);
        let mut cursor = ChainCursor::from_head(self.backend.head()?);
        let new_id = self
            .backend
            .max_fact_id()?
            .map_or(FactId(1), FactId::next);

        let deprecate_action = LedgerAction::Deprecate {
            fact_id,
            reason: Some("superseded".to_string()),
        };
        let deprecate_tx = cursor.append(&old.tenant_id, &old.project, &deprecate_action, now)?;

        let new_fact = Fact {
            id: new_id,
            tenant_id: draft.tenant_id,
            project: draft.project,
            content: draft.content,
            fact_type: draft.fact_type,
            tags: draft.tags,
            confidence: draft.confidence,
            source: draft.source,
            metadata: draft.metadata,
            valid_from: now,
            valid_until: None,
            consensus_score: 1.0,
            created_tx_id: cursor.next_id(),
        };
        let update_action = LedgerAction::Update {
            old_id: fact_id,
            new_fact: new_fact.clone(),
        };
        let update_tx =
            cursor.append(&new_fact.tenant_id, &new_fact.project, &update_action, now)?;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetFactValidUntil {
            id: fact_id,
            valid_until: now,
        });
        batch.push(WriteOp::AppendTransaction(deprecate_tx));
        batch.push(WriteOp::InsertFact(new_fact.clone()));
        batch.push(WriteOp::AppendTransaction(update_tx));
        batch.push(WriteOp::DeleteEmbedding(fact_id));
        batch.push(WriteOp::ClearEmbeddingPending(fact_id));

        let vector = self.stage_embedding(new_id, &new_fact.content, &mut batch);

        self.backend.apply(batch)?;
        self.index.remove(fact_id);
        if let Some(vector) = vector {
            self.index
                .insert(new_id, &new_fact.tenant_id, &new_fact.project, vector);
        }

        tracing::debug!(old = %fact_id, new = %new_id, "fact superseded");
        Ok(new_id)
    }

    /// Currently active facts in a scope, ordered by consensus score
    /// (descending), then fact type, then creation time (descending).
    pub fn recall(
        &self,
        tenant_id: &str,
        project: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Fact>> {
        Self::require_scope(tenant_id, project)?;

        let mut facts: Vec<Fact> = self
            .backend
            .facts_in_scope(tenant_id, Some(project))?
            .into_iter()
            .filter(Fact::is_active)
            .collect();

        facts.sort_by(|a, b| {
            b.consensus_score
                .total_cmp(&a.consensus_score)
                .then_with(|| a.fact_type.cmp(&b.fact_type))
                .then_with(|| b.valid_from.cmp(&a.valid_from))
                .then_with(|| b.id.cmp(&a.id))
        });

        if let Some(limit) = limit {
            facts.truncate(limit);
        }
        Ok(facts)
    }

    /// The scope's timeline. With `as_of`, only rows that were valid at
    /// that instant (half-open interval); otherwise every row including
    /// deprecated ones.
    pub fn history(
        &self,
        tenant_id: &str,
        project: &str,
        as_of: Option<TimestampMs>,
    ) -> Result<Vec<Fact>> {
        Self::require_scope(tenant_id, project)?;

        let facts = self.backend.facts_in_scope(tenant_id, Some(project))?;
        Ok(match as_of {
            None => facts,
            Some(t) => facts.into_iter().filter(|f| f.valid_at(t)).collect(),
        })
    }

    /// Scoped point lookup.
    pub fn get_fact(&self, tenant_id: &str, fact_id: FactId) -> Result<Fact> {
        self.fact_in_scope(tenant_id, fact_id)
    }

    /// Semantic recall: embeds the query, searches the vector index, and
    /// joins the hits back to fact rows, dropping any that raced with
    /// deprecation. With `as_of`, results are post-filtered by temporal
    /// validity; the index itself always reflects "now".
    pub fn search(
        &self,
        tenant_id: &str,
        project: Option<&str>,
        query: &str,
        k: Option<usize>,
        as_of: Option<TimestampMs>,
    ) -> Result<Vec<(Fact, f32)>> {
        if tenant_id.trim().is_empty() {
            return Err(CortexError::Validation("tenant_id must not be empty".into()));
        }
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            CortexError::Validation("search requires an embedding provider".into())
        })?;

        let query_vector = match embedder.embed(query) {
            Ok(v) => v,
            Err(EmbedError::EmptyInput) => {
                return Err(CortexError::Validation("query must not be empty".into()));
            }
            Err(e) => return Err(CortexError::EmbedderUnavailable(e.to_string())),
        };

        let k = k.unwrap_or(10);
        let hits = self.index.search(tenant_id, project, &query_vector, k);

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let Some(fact) = self.backend.get_fact(hit.fact_id)? else {
                continue;
            };
            if fact.tenant_id != tenant_id {
                continue;
            }
            let visible = match as_of {
                None => fact.is_active(),
                Some(t) => fact.valid_at(t),
            };
            if visible {
                results.push((fact, hit.score));
            }
        }
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Consensus operations
    // ------------------------------------------------------------------

    /// Casts (or replaces) a vote on a fact, appending the ledger entry
    /// and recomputing the fact's consensus columns in one unit of work.
    pub fn vote(
        &self,
        tenant_id: &str,
        fact_id: FactId,
        agent_id: &str,
        value: i8,
        reason: Option<String>,
    ) -> Result<VoteOutcome> {
        self.ensure_chain_usable()?;
        if agent_id.trim().is_empty() {
            return Err(CortexError::Validation("agent_id must not be empty".into()));
        }

        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let fact = self.fact_in_scope(tenant_id, fact_id)?;

        let now = TimestampMs::now();
        let mut cursor = ChainCursor::from_head(self.backend.head()?);
        let vote_tx_id = cursor.next_id();

        let mut batch = WriteBatch::new();
        let outcome = self.consensus.cast_vote(
            &self.backend,
            &fact,
            agent_id,
            value,
            reason,
            vote_tx_id,
            now,
            &mut batch,
        )?;

        let action = LedgerAction::Vote {
            fact_id,
            agent_id: agent_id.to_string(),
            value,
        };
        let tx = cursor.append(&fact.tenant_id, &fact.project, &action, now)?;
        batch.push(WriteOp::AppendTransaction(tx));

        self.backend.apply(batch)?;
        Ok(outcome)
    }

    /// All votes currently attached to a fact (latest per agent).
    pub fn get_votes(&self, tenant_id: &str, fact_id: FactId) -> Result<Vec<Vote>> {
        self.fact_in_scope(tenant_id, fact_id)?;
        Ok(self.backend.votes_for_fact(fact_id)?)
    }

    /// Explicitly registers an agent ahead of its first vote.
    pub fn register_agent(&self, agent: Agent) -> Result<()> {
        if agent.id.trim().is_empty() {
            return Err(CortexError::Validation("agent id must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&agent.reputation_score) {
            return Err(CortexError::Validation(format!(
                "reputation_score {} is outside [0, 1]",
                agent.reputation_score
            )));
        }

        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        if self.backend.get_agent(&agent.id)?.is_some() {
            return Err(CortexError::Conflict(format!(
                "agent {:?} is already registered",
                agent.id
            )));
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutAgent(agent));
        self.backend.apply(batch)?;
        Ok(())
    }

    /// Agent point lookup.
    pub fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>> {
        Ok(self.backend.get_agent(agent_id)?)
    }

    // ------------------------------------------------------------------
    // Ledger operations
    // ------------------------------------------------------------------

    /// Walks the chain (or the given range) recomputing every hash. A
    /// detected break latches the engine read-only.
    pub fn verify_ledger(
        &self,
        from: Option<TxId>,
        to: Option<TxId>,
    ) -> Result<VerifyOutcome> {
        let outcome = ledger::verify_chain(&self.backend, from, to)?;
        if let VerifyOutcome::Break { at, expected, found } = &outcome {
            tracing::error!(%at, %expected, %found, "ledger chain break detected");
            self.latch_chain_broken();
        }
        Ok(outcome)
    }

    /// Produces a Merkle inclusion certificate for the ledger entry that
    /// created `fact_id`. Fails with `NotFound` until a checkpoint covers
    /// that entry.
    pub fn verify_fact(&self, tenant_id: &str, fact_id: FactId) -> Result<Certificate> {
        let fact = self.fact_in_scope(tenant_id, fact_id)?;
        let tx_id = fact.created_tx_id;

        let cp = self.backend.checkpoint_covering(tx_id)?.ok_or_else(|| {
            CortexError::NotFound(format!(
                "ledger entry {tx_id} is not covered by a checkpoint yet"
            ))
        })?;

        let entries = self
            .backend
            .transactions_in_range(cp.tx_start, cp.tx_end)?;
        if entries.len() as u64 != cp.tx_end.0 - cp.tx_start.0 + 1 {
            self.latch_chain_broken();
            return Err(CortexError::Integrity(format!(
                "checkpoint {} claims range [{}, {}] but only {} entries are stored",
                cp.id,
                cp.tx_start,
                cp.tx_end,
                entries.len()
            )));
        }
        let leaves: Vec<LedgerHash> = entries.iter().map(|tx| tx.hash).collect();
        let position = (tx_id.0 - cp.tx_start.0) as usize;

        let leaf = leaves.get(position).copied().ok_or_else(|| {
            CortexError::Integrity(format!(
                "checkpoint {} claims range [{}, {}] but entry {tx_id} is missing",
                cp.id, cp.tx_start, cp.tx_end
            ))
        })?;
        let path = merkle::inclusion_path(&leaves, position).ok_or_else(|| {
            CortexError::Integrity(format!("inclusion path for entry {tx_id} out of range"))
        })?;

        let certificate = Certificate {
            fact_id,
            tx_id,
            ledger_hash: leaf,
            checkpoint_id: cp.id,
            merkle_root: cp.root_hash,
            inclusion_path: path,
        };

        if !certificate.verify() {
            self.latch_chain_broken();
            return Err(CortexError::Integrity(format!(
                "stored root of checkpoint {} does not match its entries",
                cp.id
            )));
        }
        Ok(certificate)
    }

    /// Cuts a checkpoint if the configured window and age thresholds are
    /// both exceeded. Intended to be driven by a background loop.
    pub fn checkpoint_if_due(&self) -> Result<Option<Checkpoint>> {
        self.ensure_chain_usable()?;
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let now = TimestampMs::now();
        let head = self.backend.head()?.map(|(id, _)| id);
        let last = self.backend.latest_checkpoint()?;

        let reference = match &last {
            Some(cp) => Some(cp.created_at),
            None => match checkpoint::uncovered_range(head, None) {
                Some((start, _)) => self
                    .backend
                    .get_transaction(start)?
                    .map(|tx| tx.timestamp),
                None => None,
            },
        };

        let Some((start, end)) =
            checkpoint::due_range(head, last.as_ref(), reference, now, &self.config.checkpoint)
        else {
            return Ok(None);
        };

        self.cut_checkpoint(start, end, now).map(Some)
    }

    /// Cuts a checkpoint over everything uncovered, ignoring the window
    /// and age thresholds. Returns `None` when the chain is fully covered.
    pub fn force_checkpoint(&self) -> Result<Option<Checkpoint>> {
        self.ensure_chain_usable()?;
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let head = self.backend.head()?.map(|(id, _)| id);
        let last = self.backend.latest_checkpoint()?;
        let Some((start, end)) = checkpoint::uncovered_range(head, last.as_ref()) else {
            return Ok(None);
        };

        self.cut_checkpoint(start, end, TimestampMs::now()).map(Some)
    }

    fn cut_checkpoint(&self, start: TxId, end: TxId, now: TimestampMs) -> Result<Checkpoint> {
        let entries = self.backend.transactions_in_range(start, end)?;
        let expected = end.0 - start.0 + 1;
        if entries.len() as u64 != expected {
            self.latch_chain_broken();
            return Err(CortexError::Integrity(format!(
                "range [{start}, {end}] holds {} entries, expected {expected}",
                entries.len()
            )));
        }

        let leaves: Vec<LedgerHash> = entries.iter().map(|tx| tx.hash).collect();
        let root = merkle::compute_root(&leaves)
            .ok_or_else(|| CortexError::Integrity("checkpoint over empty range".into()))?;

        let id = self
            .backend
            .latest_checkpoint()?
            .map_or(crate::types::CheckpointId(1), |cp| {
                crate::types::CheckpointId(cp.id.0 + 1)
            });
        let cp = Checkpoint {
            id,
            root_hash: root,
            tx_start: start,
            tx_end: end,
            created_at: now,
        };

        let action = LedgerAction::Checkpoint {
            tx_start: start,
            tx_end: end,
            root,
        };
        let mut cursor = ChainCursor::from_head(self.backend.head()?);
        let tx = cursor.append(SYSTEM_TENANT, SYSTEM_PROJECT, &action, now)?;

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutCheckpoint(cp.clone()));
        batch.push(WriteOp::AppendTransaction(tx));
        self.backend.apply(batch)?;

        tracing::info!(
            id = %cp.id,
            start = %start,
            end = %end,
            root = %root,
            "checkpoint cut"
        );
        Ok(cp)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Retries embeddings that failed at store time. Returns how many
    /// facts became searchable.
    pub fn retry_pending_embeddings(&self) -> Result<usize> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(0);
        };
        let _writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let pending = self.backend.pending_embeddings()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        let mut index_inserts = Vec::new();

        for fact_id in pending {
            let Some(fact) = self.backend.get_fact(fact_id)? else {
                batch.push(WriteOp::ClearEmbeddingPending(fact_id));
                continue;
            };
            if !fact.is_active() {
                batch.push(WriteOp::ClearEmbeddingPending(fact_id));
                continue;
            }

            match embedder.embed(&fact.content) {
                Ok(vector) => {
                    batch.push(WriteOp::PutEmbedding {
                        fact_id,
                        vector: vector.clone(),
                    });
                    batch.push(WriteOp::ClearEmbeddingPending(fact_id));
                    index_inserts.push((fact_id, fact.tenant_id, fact.project, vector));
                }
                Err(EmbedError::EmptyInput) => {
                    batch.push(WriteOp::ClearEmbeddingPending(fact_id));
                }
                Err(e) => {
                    tracing::debug!(%fact_id, error = %e, "embedding retry failed");
                }
            }
        }

        let recovered = index_inserts.len();
        if !batch.is_empty() {
            self.backend.apply(batch)?;
            for (fact_id, tenant, project, vector) in index_inserts {
                self.index.insert(fact_id, &tenant, &project, vector);
            }
        }
        Ok(recovered)
    }

    /// Counters and sizes for operators and tests.
    pub fn stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            counts: self.backend.counts()?,
            index_vectors: self.index.len(),
            db_size_bytes: self.backend.approximate_size_bytes()?,
            ledger_head: self.backend.head()?,
        })
    }

    /// Raw ledger entry lookup, for tooling and audits.
    pub fn get_transaction(&self, id: TxId) -> Result<Option<Transaction>> {
        Ok(self.backend.get_transaction(id)?)
    }
}
