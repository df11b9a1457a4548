//! End-to-end engine tests.
//!
//! Every test drives the public engine surface against a production
//! failure mode or a contract the adapters rely on:
//!
//! - chain integrity from genesis, and tamper detection at the first
//!   affected entry,
//! - Merkle inclusion certificates for checkpointed facts,
//! - temporal validity and idempotent deprecation,
//! - batch atomicity and tenant scope isolation,
//! - consensus scoring, re-vote replacement, reputation bounds,
//! - semantic recall and deprecation visibility in search.

use std::sync::Mutex;
use std::time::Duration;

use cortex::storage::{StorageCounts, WriteBatch};
use cortex::types::fact::{Confidence, FactDraft, FactType, FactUpdate};
use cortex::{
    Agent, AgentType, Backend, CheckpointConfig, CheckpointId, ConsensusOutcome, ConsensusParams,
    ConsensusState, CortexConfig, CortexEngine, CortexError, Fact, FactId, InMemoryBackend,
    LedgerHash, LocalEmbedder, OutcomeDirection, TimestampMs, Transaction, TxId, VerifyOutcome,
    Vote, genesis_hash,
};

type TestEngine = CortexEngine<InMemoryBackend, LocalEmbedder>;

fn config() -> CortexConfig {
    CortexConfig {
        checkpoint: CheckpointConfig {
            window: 1024,
            min_age: Duration::from_secs(0),
        },
        ..CortexConfig::default()
    }
}

fn engine() -> TestEngine {
    CortexEngine::new(config(), InMemoryBackend::new(), Some(LocalEmbedder::new()))
        .expect("engine should assemble")
}

fn engine_with(consensus: ConsensusParams) -> TestEngine {
    let cfg = CortexConfig {
        consensus,
        ..config()
    };
    CortexEngine::new(cfg, InMemoryBackend::new(), Some(LocalEmbedder::new()))
        .expect("engine should assemble")
}

fn draft(tenant: &str, project: &str, content: &str) -> FactDraft {
    FactDraft::new(tenant, project, content, FactType::Knowledge)
}

fn register(engine: &TestEngine, id: &str, reputation: f64) {
    let mut agent = Agent::auto_registered(id, "t1", TimestampMs::now());
    agent.agent_type = AgentType::Ai;
    agent.reputation_score = reputation;
    engine.register_agent(agent).expect("register agent");
}

// ---------------------------------------------------------------------
// Chain integrity from an empty store
// ---------------------------------------------------------------------

#[test]
fn first_store_chains_from_genesis() {
    let engine = engine();

    let receipt = engine
        .store(draft(
            "T1",
            "P",
            "Redis uses skip lists for sorted sets",
        ))
        .expect("store");
    assert_eq!(receipt.fact_id, FactId(1));

    let entry = engine
        .get_transaction(TxId(1))
        .expect("read")
        .expect("entry 1 exists");
    assert_eq!(entry.prev_hash, genesis_hash());
    assert_eq!(entry.hash, receipt.tx_hash);

    match engine.verify_ledger(None, None).expect("verify") {
        VerifyOutcome::Ok { entries_checked } => assert_eq!(entries_checked, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn every_entry_links_to_its_predecessor() {
    let engine = engine();
    for i in 0..20 {
        engine
            .store(draft("T1", "P", &format!("observation number {i}")))
            .expect("store");
    }

    let outcome = engine.verify_ledger(None, None).expect("verify");
    assert!(outcome.is_ok(), "outcome: {outcome:?}");

    // Walk manually as well: prev_hash linkage is pairwise.
    let mut prev = genesis_hash();
    for id in 1..=20u64 {
        let entry = engine
            .get_transaction(TxId(id))
            .expect("read")
            .expect("entry exists");
        assert_eq!(entry.prev_hash, prev, "entry {id} mislinked");
        prev = entry.hash;
    }
}

// ---------------------------------------------------------------------
// Tamper detection through a corrupting backend
// ---------------------------------------------------------------------

/// Wrapper backend that serves one ledger entry with a corrupted column,
/// simulating on-disk tampering below the engine.
struct TamperingBackend {
    inner: InMemoryBackend,
    corrupt: Mutex<Option<TxId>>,
}

impl TamperingBackend {
    fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            corrupt: Mutex::new(None),
        }
    }

    fn corrupt_from_now_on(&self, id: TxId) {
        *self.corrupt.lock().expect("lock") = Some(id);
    }

    fn mangle(&self, tx: Transaction) -> Transaction {
        let target = *self.corrupt.lock().expect("lock");
        if target == Some(tx.id) {
            Transaction {
                detail: tx.detail.to_lowercase(),
                ..tx
            }
        } else {
            tx
        }
    }
}

impl Backend for TamperingBackend {
    fn get_fact(&self, id: FactId) -> Result<Option<Fact>, cortex::StorageError> {
        self.inner.get_fact(id)
    }
    fn max_fact_id(&self) -> Result<Option<FactId>, cortex::StorageError> {
        self.inner.max_fact_id()
    }
    fn facts_in_scope(
        &self,
        tenant_id: &str,
        project: Option<&str>,
    ) -> Result<Vec<Fact>, cortex::StorageError> {
        self.inner.facts_in_scope(tenant_id, project)
    }
    fn get_transaction(&self, id: TxId) -> Result<Option<Transaction>, cortex::StorageError> {
        Ok(self.inner.get_transaction(id)?.map(|tx| self.mangle(tx)))
    }
    fn transactions_in_range(
        &self,
        from: TxId,
        to: TxId,
    ) -> Result<Vec<Transaction>, cortex::StorageError> {
        Ok(self
            .inner
            .transactions_in_range(from, to)?
            .into_iter()
            .map(|tx| self.mangle(tx))
            .collect())
    }
    fn head(&self) -> Result<Option<(TxId, LedgerHash)>, cortex::StorageError> {
        self.inner.head()
    }
    fn get_agent(&self, id: &str) -> Result<Option<Agent>, cortex::StorageError> {
        self.inner.get_agent(id)
    }
    fn votes_for_fact(&self, fact_id: FactId) -> Result<Vec<Vote>, cortex::StorageError> {
        self.inner.votes_for_fact(fact_id)
    }
    fn get_outcome(
        &self,
        fact_id: FactId,
    ) -> Result<Option<ConsensusOutcome>, cortex::StorageError> {
        self.inner.get_outcome(fact_id)
    }
    fn has_reward_mark(
        &self,
        fact_id: FactId,
        agent_id: &str,
        direction: OutcomeDirection,
    ) -> Result<bool, cortex::StorageError> {
        self.inner.has_reward_mark(fact_id, agent_id, direction)
    }
    fn latest_checkpoint(&self) -> Result<Option<cortex::Checkpoint>, cortex::StorageError> {
        self.inner.latest_checkpoint()
    }
    fn get_checkpoint(
        &self,
        id: CheckpointId,
    ) -> Result<Option<cortex::Checkpoint>, cortex::StorageError> {
        self.inner.get_checkpoint(id)
    }
    fn checkpoint_covering(
        &self,
        tx: TxId,
    ) -> Result<Option<cortex::Checkpoint>, cortex::StorageError> {
        self.inner.checkpoint_covering(tx)
    }
    fn get_embedding(&self, fact_id: FactId) -> Result<Option<Vec<f32>>, cortex::StorageError> {
        self.inner.get_embedding(fact_id)
    }
    fn embeddings(&self) -> Result<Vec<(FactId, Vec<f32>)>, cortex::StorageError> {
        self.inner.embeddings()
    }
    fn pending_embeddings(&self) -> Result<Vec<FactId>, cortex::StorageError> {
        self.inner.pending_embeddings()
    }
    fn counts(&self) -> Result<StorageCounts, cortex::StorageError> {
        self.inner.counts()
    }
    fn approximate_size_bytes(&self) -> Result<Option<u64>, cortex::StorageError> {
        self.inner.approximate_size_bytes()
    }
    fn apply(&self, batch: WriteBatch) -> Result<(), cortex::StorageError> {
        self.inner.apply(batch)
    }
}

#[test]
fn tampered_detail_breaks_verification_at_the_first_affected_entry() {
    let backend = TamperingBackend::new();
    let engine = CortexEngine::new(config(), backend, Some(LocalEmbedder::new()))
        .expect("engine should assemble");

    for i in 0..4 {
        engine
            .store(draft("T1", "P", &format!("Fact Number {i} With Capitals")))
            .expect("store");
    }
    assert!(engine.verify_ledger(None, None).expect("verify").is_ok());

    engine.backend().corrupt_from_now_on(TxId(2));

    match engine.verify_ledger(None, None).expect("verify") {
        VerifyOutcome::Break { at, expected, found } => {
            assert_eq!(at, TxId(2));
            assert_ne!(expected, found);
        }
        other => panic!("tampering went undetected: {other:?}"),
    }

    // A detected break latches the engine read-only until reset.
    let err = engine.store(draft("T1", "P", "after the break")).unwrap_err();
    assert!(matches!(err, CortexError::Integrity(_)));

    engine.backend().corrupt_from_now_on(TxId(0)); // stop tampering (id 0 never exists)
    engine.reset_integrity();
    assert!(engine.verify_ledger(None, None).expect("verify").is_ok());
    engine.store(draft("T1", "P", "writes work again")).expect("store");
}

// ---------------------------------------------------------------------
// Checkpoints and Merkle inclusion
// ---------------------------------------------------------------------

#[test]
fn checkpoint_covers_backlog_and_certificates_verify() {
    let engine = engine();

    let drafts: Vec<FactDraft> = (0..1500)
        .map(|i| draft("T1", "P", &format!("bulk fact {i} topic{i}")))
        .collect();
    engine.store_many(drafts).expect("bulk store");

    let cp = engine
        .checkpoint_if_due()
        .expect("checkpoint pass")
        .expect("1500 entries exceed the window");
    assert_eq!(cp.tx_start, TxId(1));
    assert_eq!(cp.tx_end, TxId(1500));

    let cert = engine.verify_fact("T1", FactId(42)).expect("certificate");
    assert_eq!(cert.checkpoint_id, cp.id);
    assert_eq!(cert.merkle_root, cp.root_hash);
    assert!(cert.verify(), "inclusion path must fold to the stored root");

    // The checkpoint's own ledger entry is not yet covered.
    let newest = engine
        .store(draft("T1", "P", "after the checkpoint"))
        .expect("store");
    let err = engine.verify_fact("T1", newest.fact_id).unwrap_err();
    assert!(matches!(err, CortexError::NotFound(_)));

    // The next checkpoint starts right after the previous one (no gap, no
    // overlap) and covers both the checkpoint entry and the new fact.
    let second = engine
        .force_checkpoint()
        .expect("checkpoint pass")
        .expect("uncovered entries exist");
    assert_eq!(second.tx_start, cp.tx_end.next());
    assert!(engine.verify_fact("T1", newest.fact_id).expect("cert").verify());
}

// ---------------------------------------------------------------------
// Temporal validity and idempotent deprecation
// ---------------------------------------------------------------------

#[test]
fn history_windows_follow_the_half_open_interval() {
    let engine = engine();
    let receipt = engine.store(draft("T1", "P", "ephemeral truth")).expect("store");

    std::thread::sleep(Duration::from_millis(5));
    engine
        .deprecate("T1", receipt.fact_id, Some("expired".into()))
        .expect("deprecate");

    let fact = engine
        .backend()
        .get_fact(receipt.fact_id)
        .expect("read")
        .expect("fact exists");
    let t1 = fact.valid_from;
    let t2 = fact.valid_until.expect("deprecated");
    assert!(t1 < t2);

    let at = |t: TimestampMs| {
        engine
            .history("T1", "P", Some(t))
            .expect("history")
            .iter()
            .any(|f| f.id == receipt.fact_id)
    };

    assert!(!at(TimestampMs::from_millis(t1.millis() - 1)));
    assert!(at(t1), "inclusive at valid_from");
    assert!(at(TimestampMs::from_millis(t2.millis() - 1)));
    assert!(!at(t2), "exclusive at valid_until");

    // Without as_of, history returns the whole timeline.
    assert_eq!(engine.history("T1", "P", None).expect("history").len(), 1);
    // Recall only serves active facts.
    assert!(engine.recall("T1", "P", None).expect("recall").is_empty());
}

#[test]
fn second_deprecation_is_a_no_op() {
    let engine = engine();
    let receipt = engine.store(draft("T1", "P", "soft-deletable")).expect("store");

    engine.deprecate("T1", receipt.fact_id, None).expect("first");
    let fact = engine
        .backend()
        .get_fact(receipt.fact_id)
        .expect("read")
        .expect("fact exists");
    let first_until = fact.valid_until.expect("deprecated");
    let entries_before = engine.stats().expect("stats").counts.transactions;

    std::thread::sleep(Duration::from_millis(3));
    engine.deprecate("T1", receipt.fact_id, None).expect("second");

    let fact = engine
        .backend()
        .get_fact(receipt.fact_id)
        .expect("read")
        .expect("fact exists");
    assert_eq!(fact.valid_until, Some(first_until), "valid_until must not move");
    assert_eq!(
        engine.stats().expect("stats").counts.transactions,
        entries_before,
        "no new ledger entry on repeat deprecation"
    );
}

// ---------------------------------------------------------------------
// Batch atomicity
// ---------------------------------------------------------------------

#[test]
fn failed_batch_commits_nothing() {
    let engine = engine();

    let mut drafts = vec![
        draft("T1", "P", "first of a doomed batch"),
        draft("T1", "P", "second of a doomed batch"),
    ];
    drafts.push(draft("T1", "", "empty project sinks the batch"));

    let err = engine.store_many(drafts).unwrap_err();
    assert!(matches!(err, CortexError::Validation(_)));

    let stats = engine.stats().expect("stats");
    assert_eq!(stats.counts.facts_total, 0);
    assert_eq!(stats.counts.transactions, 0);
    assert!(engine.history("T1", "P", None).expect("history").is_empty());
}

#[test]
fn batch_order_is_preserved_in_the_ledger() {
    let engine = engine();
    let receipts = engine
        .store_many(vec![
            draft("T1", "P", "alpha"),
            draft("T1", "P", "beta"),
            draft("T1", "P", "gamma"),
        ])
        .expect("bulk store");

    assert_eq!(
        receipts.iter().map(|r| r.fact_id.0).collect::<Vec<_>>(),
        [1, 2, 3]
    );
    for (i, receipt) in receipts.iter().enumerate() {
        let entry = engine
            .get_transaction(TxId(i as u64 + 1))
            .expect("read")
            .expect("entry exists");
        assert_eq!(entry.hash, receipt.tx_hash);
    }
    assert!(engine.verify_ledger(None, None).expect("verify").is_ok());
}

// ---------------------------------------------------------------------
// Scope isolation
// ---------------------------------------------------------------------

#[test]
fn tenants_never_see_each_other() {
    let engine = engine();
    let t1 = engine.store(draft("T1", "P", "tenant one secret")).expect("store");
    let t2 = engine.store(draft("T2", "P", "tenant two secret")).expect("store");

    for fact in engine.recall("T1", "P", None).expect("recall") {
        assert_eq!(fact.tenant_id, "T1");
    }
    for fact in engine.history("T2", "P", None).expect("history") {
        assert_eq!(fact.tenant_id, "T2");
    }

    // Cross-tenant point access is a scope violation, not a not-found.
    let err = engine.get_fact("T1", t2.fact_id).unwrap_err();
    assert!(matches!(err, CortexError::ScopeViolation(_)));
    let err = engine.deprecate("T2", t1.fact_id, None).unwrap_err();
    assert!(matches!(err, CortexError::ScopeViolation(_)));
    let err = engine.vote("T2", t1.fact_id, "agent-x", 1, None).unwrap_err();
    assert!(matches!(err, CortexError::ScopeViolation(_)));

    // Semantic search stays inside the tenant too.
    for (fact, _) in engine
        .search("T1", None, "secret", Some(10), None)
        .expect("search")
    {
        assert_eq!(fact.tenant_id, "T1");
    }
}

// ---------------------------------------------------------------------
// Consensus behaviour
// ---------------------------------------------------------------------

#[test]
fn weight_floor_then_verification_then_rewards() {
    let engine = engine();
    let fact = engine.store(draft("t1", "P", "the sky is blue")).expect("store");
    for i in 0..7 {
        register(&engine, &format!("agent-{i}"), 0.8);
    }

    // Five then six agents at 0.8: weight 4.0 / 4.8, still below 5.0.
    for i in 0..6 {
        let outcome = engine
            .vote("t1", fact.fact_id, &format!("agent-{i}"), 1, None)
            .expect("vote");
        assert_eq!(
            outcome.confidence,
            ConsensusState::InsufficientData,
            "vote {i} crossed the floor early"
        );
    }

    // The seventh crosses the floor: weight 5.6, unanimity, variance ~0.
    let outcome = engine
        .vote("t1", fact.fact_id, "agent-6", 1, None)
        .expect("vote");
    assert_eq!(outcome.confidence, ConsensusState::Verified);
    assert!((outcome.new_score - 2.0).abs() < 1e-6);

    // Every participant lands on 0.82.
    for i in 0..7 {
        let agent = engine
            .get_agent(&format!("agent-{i}"))
            .expect("read")
            .expect("registered");
        assert!(
            (agent.reputation_score - 0.82).abs() < 1e-9,
            "agent-{i} rep {}",
            agent.reputation_score
        );
    }

    let stored = engine.get_fact("t1", fact.fact_id).expect("fact");
    assert_eq!(stored.confidence, Confidence::Verified);
    assert!((stored.consensus_score - 2.0).abs() < 1e-6);
}

#[test]
fn revote_replaces_and_the_unique_constraint_holds() {
    let engine = engine();
    let fact = engine.store(draft("t1", "P", "contested claim")).expect("store");

    let up = engine
        .vote("t1", fact.fact_id, "agent-x", 1, None)
        .expect("vote");
    assert!(up.new_score > 1.0);

    let down = engine
        .vote("t1", fact.fact_id, "agent-x", -1, Some("changed my mind".into()))
        .expect("re-vote");
    assert!(down.new_score < 1.0, "prior +1 must be removed first");

    let votes = engine.get_votes("t1", fact.fact_id).expect("votes");
    assert_eq!(votes.len(), 1, "unique (fact, agent) constraint");
    assert_eq!(votes[0].agent_id, "agent-x");
    assert_eq!(votes[0].value, -1);
    assert_eq!(votes[0].reason.as_deref(), Some("changed my mind"));
}

#[test]
fn agreement_is_monotone_up_to_the_cap() {
    let engine = engine();
    let fact = engine.store(draft("t1", "P", "slowly accepted claim")).expect("store");

    // One dissenter, then a parade of supporters: each +1 strictly
    // increases the score until it saturates at the cap.
    register(&engine, "dissenter", 0.6);
    engine
        .vote("t1", fact.fact_id, "dissenter", -1, None)
        .expect("vote");

    let mut last = engine.get_fact("t1", fact.fact_id).expect("fact").consensus_score;
    for i in 0..8 {
        let agent = format!("supporter-{i}");
        register(&engine, &agent, 0.7);
        let outcome = engine
            .vote("t1", fact.fact_id, &agent, 1, None)
            .expect("vote");
        assert!(
            outcome.new_score > last || (outcome.new_score - 2.0).abs() < 1e-9,
            "score regressed: {last} -> {}",
            outcome.new_score
        );
        assert!(outcome.new_score <= 2.0);
        last = outcome.new_score;
    }
}

#[test]
fn reputation_stays_bounded_through_outcome_swings() {
    let params = ConsensusParams {
        min_weight: 1.0,
        ..ConsensusParams::default()
    };
    let engine = engine_with(params);
    let fact = engine.store(draft("t1", "P", "whipsawed claim")).expect("store");

    register(&engine, "alpha", 0.9);
    register(&engine, "beta", 0.7);

    // Whipsaw the fact between verified and disputed: both agents agree
    // each round, flipping direction, so each round crosses a terminal
    // threshold and triggers reputation accounting.
    let mut seen_states = Vec::new();
    for round in 0..4 {
        let value = if round % 2 == 0 { 1 } else { -1 };
        engine
            .vote("t1", fact.fact_id, "alpha", value, None)
            .expect("vote");
        let outcome = engine
            .vote("t1", fact.fact_id, "beta", value, None)
            .expect("vote");
        seen_states.push(outcome.confidence);

        for id in ["alpha", "beta"] {
            let agent = engine.get_agent(id).expect("read").expect("registered");
            assert!(
                (0.0..=1.0).contains(&agent.reputation_score),
                "{id} escaped [0,1]: {}",
                agent.reputation_score
            );
        }
    }

    // Both terminal directions were actually exercised.
    assert!(seen_states.contains(&ConsensusState::Verified));
    assert!(seen_states.contains(&ConsensusState::Disputed));
}

// ---------------------------------------------------------------------
// Semantic recall and deprecation visibility
// ---------------------------------------------------------------------

#[test]
fn stored_content_is_its_own_best_query() {
    let engine = engine();

    let drafts: Vec<FactDraft> = (0..1000)
        .map(|i| {
            draft(
                "T1",
                "P",
                &format!("note {i} covers subject{i} within area{} of the corpus", i % 7),
            )
        })
        .collect();
    let receipts = engine.store_many(drafts).expect("bulk store");
    assert_eq!(engine.stats().expect("stats").index_vectors, 1000);

    let mut hits = 0usize;
    let mut trials = 0usize;
    for (i, receipt) in receipts.iter().enumerate().step_by(10) {
        let query = format!("note {i} covers subject{i} within area{} of the corpus", i % 7);
        let results = engine
            .search("T1", Some("P"), &query, Some(1), None)
            .expect("search");
        trials += 1;
        if results.first().map(|(f, _)| f.id) == Some(receipt.fact_id) {
            hits += 1;
        }
    }

    assert!(
        hits * 100 >= trials * 99,
        "top-1 recall {hits}/{trials} below 99%"
    );
}

#[test]
fn search_never_returns_deprecated_facts() {
    let engine = engine();
    let keep = engine
        .store(draft("T1", "P", "persistent observation about caching"))
        .expect("store");
    let drop = engine
        .store(draft("T1", "P", "transient observation about caching"))
        .expect("store");

    engine.deprecate("T1", drop.fact_id, None).expect("deprecate");

    let results = engine
        .search("T1", Some("P"), "observation about caching", Some(10), None)
        .expect("search");
    assert!(!results.is_empty());
    assert!(results.iter().all(|(f, _)| f.id != drop.fact_id));
    assert!(results.iter().any(|(f, _)| f.id == keep.fact_id));
}

#[test]
fn update_supersedes_and_redirects_search() {
    let engine = engine();
    let original = engine
        .store(
            draft("T1", "P", "the cache eviction policy is LRU")
                .with_tags(["cache"])
                .with_source("agent-7"),
        )
        .expect("store");

    let new_id = engine
        .update(
            "T1",
            original.fact_id,
            FactUpdate::content("the cache eviction policy is LFU since release 2"),
        )
        .expect("update");
    assert_ne!(new_id, original.fact_id);

    // Old row is deprecated with the superseded reason in the ledger; two
    // entries were appended in deprecate-then-update order.
    let old = engine
        .backend()
        .get_fact(original.fact_id)
        .expect("read")
        .expect("exists");
    assert!(!old.is_active());

    let dep_entry = engine
        .get_transaction(TxId(2))
        .expect("read")
        .expect("exists");
    let upd_entry = engine
        .get_transaction(TxId(3))
        .expect("read")
        .expect("exists");
    assert!(dep_entry.detail.contains("superseded"), "{}", dep_entry.detail);
    assert!(upd_entry.detail.contains("\"op\":\"update\""), "{}", upd_entry.detail);

    // Tags and source carry forward; the new row is the searchable one.
    let new = engine.get_fact("T1", new_id).expect("fact");
    assert!(new.tags.contains("cache"));
    assert_eq!(new.source.as_deref(), Some("agent-7"));

    let results = engine
        .search("T1", Some("P"), "cache eviction policy", Some(5), None)
        .expect("search");
    assert!(results.iter().any(|(f, _)| f.id == new_id));
    assert!(results.iter().all(|(f, _)| f.id != original.fact_id));

    // Updating the superseded row again is a conflict.
    let err = engine
        .update("T1", original.fact_id, FactUpdate::content("too late"))
        .unwrap_err();
    assert!(matches!(err, CortexError::Conflict(_)));

    assert!(engine.verify_ledger(None, None).expect("verify").is_ok());
}

// ---------------------------------------------------------------------
// Recall ordering
// ---------------------------------------------------------------------

#[test]
fn recall_orders_by_score_then_type_then_recency() {
    let engine = engine();

    let a = engine.store(draft("T1", "P", "plain knowledge")).expect("store");
    std::thread::sleep(Duration::from_millis(3));
    let b = engine
        .store(FactDraft::new("T1", "P", "a recorded decision", FactType::Decision))
        .expect("store");
    std::thread::sleep(Duration::from_millis(3));
    let c = engine.store(draft("T1", "P", "endorsed knowledge")).expect("store");

    // Upvote c so it outranks everything.
    engine.vote("T1", c.fact_id, "agent-up", 1, None).expect("vote");

    let order: Vec<FactId> = engine
        .recall("T1", "P", None)
        .expect("recall")
        .iter()
        .map(|f| f.id)
        .collect();

    // c first (score), then a (knowledge sorts before decision), then b.
    assert_eq!(order, vec![c.fact_id, a.fact_id, b.fact_id]);

    let limited = engine.recall("T1", "P", Some(2)).expect("recall");
    assert_eq!(limited.len(), 2);
}
