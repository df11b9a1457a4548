//! Vote engine.
//!
//! [`ConsensusEngine`] turns one incoming vote into the set of typed
//! mutations the backend must commit: the replaced vote row, the fact's
//! recomputed consensus columns, agent bookkeeping, and, when the vote
//! pushes the fact across a terminal threshold, the edge-triggered
//! reputation updates together with the outcome record. Everything lands
//! in the caller's batch so the whole effect commits atomically.

use std::collections::BTreeMap;

use crate::error::{CortexError, Result};
use crate::storage::{Backend, WriteBatch, WriteOp};
use crate::types::fact::Confidence;
use crate::types::{
    Agent, ConsensusOutcome, ConsensusState, Fact, TimestampMs, TxId, Vote,
};

use super::config::ConsensusParams;
use super::score;

/// What a `vote` call hands back to the caller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoteOutcome {
    /// The fact's recomputed consensus score.
    pub new_score: f64,
    /// The derived consensus state after this vote.
    pub confidence: ConsensusState,
}

/// Reputation-weighted vote processing over a [`Backend`].
#[derive(Clone, Debug)]
pub struct ConsensusEngine {
    params: ConsensusParams,
}

impl ConsensusEngine {
    pub fn new(params: ConsensusParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Loads the voting agent, auto-registering a neutral one when allowed.
    fn load_or_register_agent<B: Backend>(
        &self,
        backend: &B,
        agent_id: &str,
        tenant_id: &str,
        now: TimestampMs,
    ) -> Result<Agent> {
        match backend.get_agent(agent_id)? {
            Some(agent) => Ok(agent),
            None if self.params.require_registration => Err(CortexError::NotFound(format!(
                "agent {agent_id:?} is not registered and auto-registration is disabled"
            ))),
            None => {
                tracing::debug!(agent_id, tenant_id, "auto-registering agent");
                Ok(Agent::auto_registered(agent_id, tenant_id, now))
            }
        }
    }

    /// Processes one vote against `fact`, staging every resulting mutation
    /// into `batch`.
    ///
    /// `vote_tx_id` is the id of the ledger entry recording the vote; the
    /// caller appends that entry to the same batch.
    #[allow(clippy::too_many_arguments)]
    pub fn cast_vote<B: Backend>(
        &self,
        backend: &B,
        fact: &Fact,
        agent_id: &str,
        value: i8,
        reason: Option<String>,
        vote_tx_id: TxId,
        now: TimestampMs,
        batch: &mut WriteBatch,
    ) -> Result<VoteOutcome> {
        if !(-1..=1).contains(&value) {
            return Err(CortexError::Validation(format!(
                "vote value must be -1, 0, or +1 (got {value})"
            )));
        }

        let mut agent = self.load_or_register_agent(backend, agent_id, &fact.tenant_id, now)?;

        // Snapshot reputation before any update this vote may trigger.
        let rep_at_vote = agent.reputation_score;
        let new_vote = Vote {
            id: vote_tx_id,
            fact_id: fact.id,
            agent_id: agent_id.to_string(),
            value,
            vote_weight: f64::from(value.abs()) * rep_at_vote,
            agent_rep_at_vote: rep_at_vote,
            decay_factor: 1.0,
            created_at: now,
            reason,
        };

        // Replace-by-(fact, agent): the prior vote drops out of the set
        // before the new one is evaluated.
        let committed = backend.votes_for_fact(fact.id)?;
        let previous = score::evaluate(&committed, &self.params, now);

        let mut votes: Vec<Vote> = committed
            .into_iter()
            .filter(|v| v.agent_id != agent_id)
            .collect();
        votes.push(new_vote.clone());
        let current = score::evaluate(&votes, &self.params, now);

        tracing::debug!(
            fact_id = %fact.id,
            agent_id,
            value,
            score = current.score,
            state = %current.state,
            weight = current.total_weight,
            "vote recorded"
        );

        batch.push(WriteOp::PutVote(new_vote));
        batch.push(WriteOp::SetFactConsensus {
            id: fact.id,
            score: current.score,
            confidence: derived_confidence(current.state, fact.confidence),
        });

        // Agents mutated by this vote; flushed once so the voter's
        // bookkeeping and a possible reputation update land as one row.
        let mut dirty: BTreeMap<String, Agent> = BTreeMap::new();
        agent.total_votes += 1;
        agent.last_active_at = now;
        dirty.insert(agent.id.clone(), agent);

        if let Some(direction) = current.state.terminal_direction()
            && previous.state != current.state
        {
            tracing::info!(
                fact_id = %fact.id,
                state = %current.state,
                score = current.score,
                "fact crossed a terminal consensus threshold"
            );

            for vote in &votes {
                if backend.has_reward_mark(fact.id, &vote.agent_id, direction)? {
                    continue;
                }
                let mut participant = match dirty.remove(&vote.agent_id) {
                    Some(agent) => agent,
                    None => match backend.get_agent(&vote.agent_id)? {
                        Some(agent) => agent,
                        None => {
                            // A vote row implies the agent existed when it
                            // was cast; a missing row is a backend anomaly,
                            // not a reason to abort the outcome.
                            tracing::warn!(
                                agent_id = %vote.agent_id,
                                "skipping reputation update for missing agent"
                            );
                            continue;
                        }
                    },
                };

                let correctness = score::correctness(vote.value, direction);
                participant.reputation_score = score::updated_reputation(
                    correctness,
                    vote.agent_rep_at_vote,
                    self.params.alpha,
                );
                if correctness > 0 {
                    participant.successful_votes += 1;
                }
                dirty.insert(participant.id.clone(), participant);

                batch.push(WriteOp::PutRewardMark {
                    fact_id: fact.id,
                    agent_id: vote.agent_id.clone(),
                    direction,
                });
            }

            batch.push(WriteOp::PutOutcome(ConsensusOutcome {
                fact_id: fact.id,
                final_state: current.state,
                final_score: current.score,
                resolved_at: now,
            }));
        }

        for agent in dirty.into_values() {
            batch.push(WriteOp::PutAgent(agent));
        }

        Ok(VoteOutcome {
            new_score: current.score,
            confidence: current.state,
        })
    }
}

/// Maps a derived state onto the fact row's confidence column.
///
/// Terminal states mirror into the column; a fact leaving a terminal state
/// falls back to `stated`. Non-terminal states never overwrite a
/// caller-assigned confidence.
fn derived_confidence(state: ConsensusState, current: Confidence) -> Confidence {
    match state {
        ConsensusState::Verified => Confidence::Verified,
        ConsensusState::Disputed => Confidence::Disputed,
        _ if current.is_consensus_owned() => Confidence::Stated,
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryBackend;
    use crate::types::fact::{FactDraft, FactType};
    use crate::types::FactId;

    fn fact(id: u64) -> Fact {
        let draft = FactDraft::new("t1", "p", format!("fact {id}"), FactType::Knowledge);
        Fact {
            id: FactId(id),
            tenant_id: draft.tenant_id,
            project: draft.project,
            content: draft.content,
            fact_type: draft.fact_type,
            tags: draft.tags,
            confidence: draft.confidence,
            source: draft.source,
            metadata: draft.metadata,
            valid_from: TimestampMs::from_millis(0),
            valid_until: None,
            consensus_score: 1.0,
            created_tx_id: TxId(id),
        }
    }

    fn seed_fact(backend: &InMemoryBackend, fact: &Fact) {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::InsertFact(fact.clone()));
        backend.apply(batch).expect("seed fact");
    }

    fn seed_agent(backend: &InMemoryBackend, id: &str, reputation: f64) {
        let mut agent = Agent::auto_registered(id, "t1", TimestampMs::from_millis(0));
        agent.reputation_score = reputation;
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::PutAgent(agent));
        backend.apply(batch).expect("seed agent");
    }

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ConsensusParams::default())
    }

    fn cast(
        engine: &ConsensusEngine,
        backend: &InMemoryBackend,
        fact: &Fact,
        agent: &str,
        value: i8,
        tx: u64,
    ) -> VoteOutcome {
        let mut batch = WriteBatch::new();
        let outcome = engine
            .cast_vote(
                backend,
                fact,
                agent,
                value,
                None,
                TxId(tx),
                TimestampMs::from_millis(tx as i64),
                &mut batch,
            )
            .expect("vote");
        backend.apply(batch).expect("apply");
        outcome
    }

    #[test]
    fn rejects_out_of_range_values() {
        let backend = InMemoryBackend::new();
        let f = fact(1);
        seed_fact(&backend, &f);

        let mut batch = WriteBatch::new();
        let err = engine()
            .cast_vote(
                &backend,
                &f,
                "a",
                2,
                None,
                TxId(1),
                TimestampMs::from_millis(0),
                &mut batch,
            )
            .unwrap_err();
        assert!(matches!(err, CortexError::Validation(_)));
    }

    #[test]
    fn unknown_agent_is_rejected_when_registration_is_required() {
        let backend = InMemoryBackend::new();
        let f = fact(1);
        seed_fact(&backend, &f);

        let engine = ConsensusEngine::new(ConsensusParams {
            require_registration: true,
            ..ConsensusParams::default()
        });

        let mut batch = WriteBatch::new();
        let err = engine
            .cast_vote(
                &backend,
                &f,
                "ghost",
                1,
                None,
                TxId(1),
                TimestampMs::from_millis(0),
                &mut batch,
            )
            .unwrap_err();
        assert!(matches!(err, CortexError::NotFound(_)));
    }

    #[test]
    fn revote_replaces_the_prior_vote() {
        let backend = InMemoryBackend::new();
        let f = fact(1);
        seed_fact(&backend, &f);

        cast(&engine(), &backend, &f, "x", 1, 1);
        cast(&engine(), &backend, &f, "x", -1, 2);

        let votes = backend.votes_for_fact(f.id).expect("votes");
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].value, -1);
        assert_eq!(votes[0].id, TxId(2));
    }

    #[test]
    fn seven_strong_agents_verify_a_fact_and_get_rewarded() {
        let backend = InMemoryBackend::new();
        let f = fact(10);
        seed_fact(&backend, &f);
        for i in 0..7 {
            seed_agent(&backend, &format!("agent-{i}"), 0.8);
        }

        let engine = engine();
        let mut last = None;
        for i in 0..7 {
            last = Some(cast(&engine, &backend, &f, &format!("agent-{i}"), 1, i + 1));
        }
        let last = last.expect("at least one vote");
        assert_eq!(last.confidence, ConsensusState::Verified);
        assert!((last.new_score - 2.0).abs() < 1e-9);

        // Each participant blends toward the verified outcome:
        // 0.1 * 1.0 + 0.9 * 0.8 = 0.82.
        for i in 0..7 {
            let agent = backend
                .get_agent(&format!("agent-{i}"))
                .expect("get")
                .expect("present");
            assert!(
                (agent.reputation_score - 0.82).abs() < 1e-9,
                "agent-{i} rep {}",
                agent.reputation_score
            );
            assert_eq!(agent.successful_votes, 1);
        }

        let outcome = backend.get_outcome(f.id).expect("get").expect("present");
        assert_eq!(outcome.final_state, ConsensusState::Verified);

        // The stored fact mirrors the terminal state.
        let stored = backend.get_fact(f.id).expect("get").expect("present");
        assert_eq!(stored.confidence, Confidence::Verified);
    }

    #[test]
    fn rewards_fire_once_per_direction() {
        let backend = InMemoryBackend::new();
        let f = fact(10);
        seed_fact(&backend, &f);
        for i in 0..7 {
            seed_agent(&backend, &format!("agent-{i}"), 0.8);
        }

        let engine = engine();
        for i in 0..7 {
            cast(&engine, &backend, &f, &format!("agent-{i}"), 1, i + 1);
        }

        // agent-0 abstains (fact drops out of verified), then re-affirms
        // (fact re-enters verified). No second reward may fire.
        let refreshed = backend.get_fact(f.id).expect("get").expect("present");
        cast(&engine, &backend, &refreshed, "agent-0", 0, 8);
        let refreshed = backend.get_fact(f.id).expect("get").expect("present");
        cast(&engine, &backend, &refreshed, "agent-0", 1, 9);

        let agent1 = backend.get_agent("agent-1").expect("get").expect("present");
        assert!(
            (agent1.reputation_score - 0.82).abs() < 1e-9,
            "reward applied twice: rep {}",
            agent1.reputation_score
        );
    }

    #[test]
    fn leaving_a_terminal_state_restores_stated_confidence() {
        let backend = InMemoryBackend::new();
        let f = fact(10);
        seed_fact(&backend, &f);
        for i in 0..7 {
            seed_agent(&backend, &format!("agent-{i}"), 0.8);
        }

        let engine = engine();
        for i in 0..7 {
            cast(&engine, &backend, &f, &format!("agent-{i}"), 1, i + 1);
        }
        let verified = backend.get_fact(f.id).expect("get").expect("present");
        assert_eq!(verified.confidence, Confidence::Verified);

        // Enough abstentions drain the weight below the judgement floor.
        for i in 0..3 {
            let refreshed = backend.get_fact(f.id).expect("get").expect("present");
            cast(&engine, &backend, &refreshed, &format!("agent-{i}"), 0, 8 + i);
        }

        let after = backend.get_fact(f.id).expect("get").expect("present");
        assert_eq!(after.confidence, Confidence::Stated);
    }
}
