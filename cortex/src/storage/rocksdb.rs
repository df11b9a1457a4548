//! RocksDB-backed storage.
//!
//! This implementation persists every table in a dedicated column family:
//!
//! - `"facts"`:       fact id (8-byte BE) -> fact row (JSON; metadata is
//!   free-form JSON, which rules out non-self-describing codecs),
//! - `"scope"`:       length-prefixed `(tenant, project, fact id)` key ->
//!   empty, the secondary index behind scope range scans,
//! - `"txs"`:         ledger entry id (BE) -> entry row (bincode 2),
//! - `"agents"`:      agent id bytes -> agent row (bincode 2),
//! - `"votes"`:       `(fact id BE, agent id)` -> vote row (bincode 2),
//! - `"outcomes"`:    fact id (BE) -> outcome row (bincode 2),
//! - `"rewards"`:     `(fact id BE, direction, agent id)` -> empty,
//! - `"checkpoints"`: checkpoint id (BE) -> checkpoint row (bincode 2),
//! - `"embeddings"`:  fact id (BE) -> 384 little-endian IEEE-754 f32,
//! - `"pending"`:     fact id (BE) -> empty, the embedding retry queue,
//! - `"meta"`:        schema version under a fixed key.
//!
//! Batches commit through a single RocksDB `WriteBatch`, which together
//! with the write-ahead log gives the all-or-nothing semantics the
//! [`Backend`] contract requires. Big-endian id keys make iteration order
//! equal id order.

use std::path::Path;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ledger::Checkpoint;
use crate::types::{
    Agent, CheckpointId, ConsensusOutcome, Fact, FactId, LedgerHash, OutcomeDirection,
    Transaction, TxId, Vote,
};

use super::{Backend, StorageCounts, StorageError, WriteBatch, WriteOp};

const CF_FACTS: &str = "facts";
const CF_SCOPE: &str = "scope";
const CF_TXS: &str = "txs";
const CF_AGENTS: &str = "agents";
const CF_VOTES: &str = "votes";
const CF_OUTCOMES: &str = "outcomes";
const CF_REWARDS: &str = "rewards";
const CF_CHECKPOINTS: &str = "checkpoints";
const CF_EMBEDDINGS: &str = "embeddings";
const CF_PENDING: &str = "pending";
const CF_META: &str = "meta";

const ALL_CFS: [&str; 11] = [
    CF_FACTS,
    CF_SCOPE,
    CF_TXS,
    CF_AGENTS,
    CF_VOTES,
    CF_OUTCOMES,
    CF_REWARDS,
    CF_CHECKPOINTS,
    CF_EMBEDDINGS,
    CF_PENDING,
    CF_META,
];

const META_SCHEMA_KEY: &[u8] = b"schema_version";
const SCHEMA_VERSION: u32 = 1;

/// Configuration for [`RocksDbBackend`].
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Filesystem path to the database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/cortex-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// RocksDB-backed implementation of [`Backend`].
pub struct RocksDbBackend {
    db: DB,
}

fn be_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_be(bytes: &[u8]) -> Result<u64, StorageError> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupted("id key with wrong length".into()))?;
    Ok(u64::from_be_bytes(arr))
}

fn vote_key(fact_id: FactId, agent_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + agent_id.len());
    key.extend_from_slice(&be_key(fact_id.0));
    key.extend_from_slice(agent_id.as_bytes());
    key
}

fn reward_key(fact_id: FactId, direction: OutcomeDirection, agent_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(9 + agent_id.len());
    key.extend_from_slice(&be_key(fact_id.0));
    key.push(direction.as_key_byte());
    key.extend_from_slice(agent_id.as_bytes());
    key
}

fn push_len_prefixed(key: &mut Vec<u8>, part: &str) -> Result<(), StorageError> {
    let len = u16::try_from(part.len())
        .map_err(|_| StorageError::Codec(format!("scope component too long: {} bytes", part.len())))?;
    key.extend_from_slice(&len.to_be_bytes());
    key.extend_from_slice(part.as_bytes());
    Ok(())
}

fn scope_prefix(tenant_id: &str, project: Option<&str>) -> Result<Vec<u8>, StorageError> {
    let mut key = Vec::with_capacity(4 + tenant_id.len() + project.map_or(0, str::len));
    push_len_prefixed(&mut key, tenant_id)?;
    if let Some(project) = project {
        push_len_prefixed(&mut key, project)?;
    }
    Ok(key)
}

fn scope_key(tenant_id: &str, project: &str, fact_id: FactId) -> Result<Vec<u8>, StorageError> {
    let mut key = scope_prefix(tenant_id, Some(project))?;
    key.extend_from_slice(&be_key(fact_id.0));
    Ok(key)
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, StorageError> {
    if bytes.len() % 4 != 0 {
        return Err(StorageError::Corrupted(
            "embedding with non-multiple-of-4 length".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

fn encode_row<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| StorageError::Codec(e.to_string()))
}

fn decode_row<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| StorageError::Codec(e.to_string()))
}

fn encode_fact(fact: &Fact) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(fact).map_err(|e| StorageError::Codec(e.to_string()))
}

fn decode_fact(bytes: &[u8]) -> Result<Fact, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::Codec(e.to_string()))
}

impl RocksDbBackend {
    /// Opens (or creates) a RocksDB-backed store at the configured path and
    /// checks the schema version.
    pub fn open(cfg: &StorageConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let mut cfs = vec![ColumnFamilyDescriptor::new("default", Options::default())];
        for name in ALL_CFS {
            cfs.push(ColumnFamilyDescriptor::new(name, Options::default()));
        }

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;
        let backend = Self { db };
        backend.check_schema()?;
        Ok(backend)
    }

    fn check_schema(&self) -> Result<(), StorageError> {
        let cf = self.cf(CF_META)?;
        match self.db.get_cf(cf, META_SCHEMA_KEY)? {
            None => {
                self.db
                    .put_cf(cf, META_SCHEMA_KEY, SCHEMA_VERSION.to_le_bytes())?;
                Ok(())
            }
            Some(bytes) => {
                let arr: [u8; 4] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corrupted("schema version with wrong length".into())
                })?;
                let found = u32::from_le_bytes(arr);
                if found != SCHEMA_VERSION {
                    return Err(StorageError::Corrupted(format!(
                        "schema version {found} is not supported (expected {SCHEMA_VERSION})"
                    )));
                }
                Ok(())
            }
        }
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    /// Last key/value of a column family, in BE-key order.
    fn last_row(&self, name: &'static str) -> Result<Option<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(name)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            None => Ok(None),
            Some(item) => {
                let (k, v) = item?;
                Ok(Some((k.into_vec(), v.into_vec())))
            }
        }
    }

    fn count_rows(&self, name: &'static str) -> Result<u64, StorageError> {
        let cf = self.cf(name)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

impl Backend for RocksDbBackend {
    fn get_fact(&self, id: FactId) -> Result<Option<Fact>, StorageError> {
        let cf = self.cf(CF_FACTS)?;
        match self.db.get_cf(cf, be_key(id.0))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_fact(&bytes)?)),
        }
    }

    fn max_fact_id(&self) -> Result<Option<FactId>, StorageError> {
        match self.last_row(CF_FACTS)? {
            None => Ok(None),
            Some((key, _)) => Ok(Some(FactId(decode_be(&key)?))),
        }
    }

    fn facts_in_scope(
        &self,
        tenant_id: &str,
        project: Option<&str>,
    ) -> Result<Vec<Fact>, StorageError> {
        let prefix = scope_prefix(tenant_id, project)?;
        let cf = self.cf(CF_SCOPE)?;
        let mut facts = Vec::new();

        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() < 8 {
                return Err(StorageError::Corrupted("scope key too short".into()));
            }
            let fact_id = FactId(decode_be(&key[key.len() - 8..])?);
            let fact = self.get_fact(fact_id)?.ok_or_else(|| {
                StorageError::Corrupted(format!("scope index points at missing fact {fact_id}"))
            })?;
            facts.push(fact);
        }

        // Scope keys interleave facts from different projects when scanning
        // a whole tenant; hand rows back in id order either way.
        facts.sort_by_key(|f| f.id);
        Ok(facts)
    }

    fn get_transaction(&self, id: TxId) -> Result<Option<Transaction>, StorageError> {
        let cf = self.cf(CF_TXS)?;
        match self.db.get_cf(cf, be_key(id.0))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
        }
    }

    fn transactions_in_range(
        &self,
        from: TxId,
        to: TxId,
    ) -> Result<Vec<Transaction>, StorageError> {
        let cf = self.cf(CF_TXS)?;
        let start = be_key(from.0);
        let mut out = Vec::new();

        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(start.as_slice(), Direction::Forward))
        {
            let (key, value) = item?;
            if decode_be(&key)? > to.0 {
                break;
            }
            out.push(decode_row::<Transaction>(&value)?);
        }
        Ok(out)
    }

    fn head(&self) -> Result<Option<(TxId, LedgerHash)>, StorageError> {
        match self.last_row(CF_TXS)? {
            None => Ok(None),
            Some((_, value)) => {
                let tx: Transaction = decode_row(&value)?;
                Ok(Some((tx.id, tx.hash)))
            }
        }
    }

    fn get_agent(&self, id: &str) -> Result<Option<Agent>, StorageError> {
        let cf = self.cf(CF_AGENTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
        }
    }

    fn votes_for_fact(&self, fact_id: FactId) -> Result<Vec<Vote>, StorageError> {
        let cf = self.cf(CF_VOTES)?;
        let prefix = be_key(fact_id.0);
        let mut votes = Vec::new();

        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            votes.push(decode_row::<Vote>(&value)?);
        }
        Ok(votes)
    }

    fn get_outcome(&self, fact_id: FactId) -> Result<Option<ConsensusOutcome>, StorageError> {
        let cf = self.cf(CF_OUTCOMES)?;
        match self.db.get_cf(cf, be_key(fact_id.0))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
        }
    }

    fn has_reward_mark(
        &self,
        fact_id: FactId,
        agent_id: &str,
        direction: OutcomeDirection,
    ) -> Result<bool, StorageError> {
        let cf = self.cf(CF_REWARDS)?;
        Ok(self
            .db
            .get_cf(cf, reward_key(fact_id, direction, agent_id))?
            .is_some())
    }

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, StorageError> {
        match self.last_row(CF_CHECKPOINTS)? {
            None => Ok(None),
            Some((_, value)) => Ok(Some(decode_row(&value)?)),
        }
    }

    fn get_checkpoint(&self, id: CheckpointId) -> Result<Option<Checkpoint>, StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        match self.db.get_cf(cf, be_key(id.0))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_row(&bytes)?)),
        }
    }

    fn checkpoint_covering(&self, tx: TxId) -> Result<Option<Checkpoint>, StorageError> {
        let cf = self.cf(CF_CHECKPOINTS)?;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let cp: Checkpoint = decode_row(&value)?;
            if cp.covers(tx) {
                return Ok(Some(cp));
            }
        }
        Ok(None)
    }

    fn get_embedding(&self, fact_id: FactId) -> Result<Option<Vec<f32>>, StorageError> {
        let cf = self.cf(CF_EMBEDDINGS)?;
        match self.db.get_cf(cf, be_key(fact_id.0))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_vector(&bytes)?)),
        }
    }

    fn embeddings(&self) -> Result<Vec<(FactId, Vec<f32>)>, StorageError> {
        let cf = self.cf(CF_EMBEDDINGS)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            out.push((FactId(decode_be(&key)?), decode_vector(&value)?));
        }
        Ok(out)
    }

    fn pending_embeddings(&self) -> Result<Vec<FactId>, StorageError> {
        let cf = self.cf(CF_PENDING)?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            out.push(FactId(decode_be(&key)?));
        }
        Ok(out)
    }

    fn counts(&self) -> Result<StorageCounts, StorageError> {
        let cf_facts = self.cf(CF_FACTS)?;
        let mut facts_total = 0u64;
        let mut facts_active = 0u64;
        for item in self.db.iterator_cf(cf_facts, IteratorMode::Start) {
            let (_, value) = item?;
            facts_total += 1;
            if decode_fact(&value)?.is_active() {
                facts_active += 1;
            }
        }

        Ok(StorageCounts {
            facts_total,
            facts_active,
            transactions: self.count_rows(CF_TXS)?,
            agents: self.count_rows(CF_AGENTS)?,
            votes: self.count_rows(CF_VOTES)?,
            checkpoints: self.count_rows(CF_CHECKPOINTS)?,
            outcomes: self.count_rows(CF_OUTCOMES)?,
            embeddings: self.count_rows(CF_EMBEDDINGS)?,
            pending_embeddings: self.count_rows(CF_PENDING)?,
        })
    }

    fn approximate_size_bytes(&self) -> Result<Option<u64>, StorageError> {
        Ok(self
            .db
            .property_int_value("rocksdb.estimate-live-data-size")?)
    }

    fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let cf_facts = self.cf(CF_FACTS)?;
        let cf_scope = self.cf(CF_SCOPE)?;
        let cf_txs = self.cf(CF_TXS)?;
        let cf_agents = self.cf(CF_AGENTS)?;
        let cf_votes = self.cf(CF_VOTES)?;
        let cf_outcomes = self.cf(CF_OUTCOMES)?;
        let cf_rewards = self.cf(CF_REWARDS)?;
        let cf_checkpoints = self.cf(CF_CHECKPOINTS)?;
        let cf_embeddings = self.cf(CF_EMBEDDINGS)?;
        let cf_pending = self.cf(CF_PENDING)?;

        let mut wb = rocksdb::WriteBatch::default();
        // Fact rows touched earlier in this batch, so read-modify-write ops
        // see staged values instead of the committed ones.
        let mut staged: std::collections::HashMap<u64, Fact> = std::collections::HashMap::new();

        for op in batch.into_ops() {
            match op {
                WriteOp::InsertFact(fact) => {
                    wb.put_cf(cf_facts, be_key(fact.id.0), encode_fact(&fact)?);
                    wb.put_cf(
                        cf_scope,
                        scope_key(&fact.tenant_id, &fact.project, fact.id)?,
                        b"",
                    );
                    staged.insert(fact.id.0, fact);
                }
                WriteOp::SetFactValidUntil { id, valid_until } => {
                    let mut fact = match staged.get(&id.0) {
                        Some(fact) => fact.clone(),
                        None => self.get_fact(id)?.ok_or_else(|| {
                            StorageError::Corrupted(format!("fact {id} does not exist"))
                        })?,
                    };
                    fact.valid_until = Some(valid_until);
                    wb.put_cf(cf_facts, be_key(id.0), encode_fact(&fact)?);
                    staged.insert(id.0, fact);
                }
                WriteOp::SetFactConsensus {
                    id,
                    score,
                    confidence,
                } => {
                    let mut fact = match staged.get(&id.0) {
                        Some(fact) => fact.clone(),
                        None => self.get_fact(id)?.ok_or_else(|| {
                            StorageError::Corrupted(format!("fact {id} does not exist"))
                        })?,
                    };
                    fact.consensus_score = score;
                    fact.confidence = confidence;
                    wb.put_cf(cf_facts, be_key(id.0), encode_fact(&fact)?);
                    staged.insert(id.0, fact);
                }
                WriteOp::AppendTransaction(tx) => {
                    wb.put_cf(cf_txs, be_key(tx.id.0), encode_row(&tx)?);
                }
                WriteOp::PutAgent(agent) => {
                    wb.put_cf(cf_agents, agent.id.as_bytes(), encode_row(&agent)?);
                }
                WriteOp::PutVote(vote) => {
                    wb.put_cf(
                        cf_votes,
                        vote_key(vote.fact_id, &vote.agent_id),
                        encode_row(&vote)?,
                    );
                }
                WriteOp::PutOutcome(outcome) => {
                    wb.put_cf(cf_outcomes, be_key(outcome.fact_id.0), encode_row(&outcome)?);
                }
                WriteOp::PutRewardMark {
                    fact_id,
                    agent_id,
                    direction,
                } => {
                    wb.put_cf(cf_rewards, reward_key(fact_id, direction, &agent_id), b"");
                }
                WriteOp::PutCheckpoint(cp) => {
                    wb.put_cf(cf_checkpoints, be_key(cp.id.0), encode_row(&cp)?);
                }
                WriteOp::PutEmbedding { fact_id, vector } => {
                    wb.put_cf(cf_embeddings, be_key(fact_id.0), encode_vector(&vector));
                }
                WriteOp::DeleteEmbedding(fact_id) => {
                    wb.delete_cf(cf_embeddings, be_key(fact_id.0));
                }
                WriteOp::MarkEmbeddingPending(fact_id) => {
                    wb.put_cf(cf_pending, be_key(fact_id.0), b"");
                }
                WriteOp::ClearEmbeddingPending(fact_id) => {
                    wb.delete_cf(cf_pending, be_key(fact_id.0));
                }
            }
        }

        self.db.write(wb)?;
        Ok(())
    }
}
