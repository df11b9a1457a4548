//! Agents, votes, and consensus outcome records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{FactId, TimestampMs, TxId};
use crate::error::CortexError;

/// Kind of entity casting votes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    Ai,
    Human,
    Oracle,
    System,
    Legacy,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Ai => "ai",
            AgentType::Human => "human",
            AgentType::Oracle => "oracle",
            AgentType::System => "system",
            AgentType::Legacy => "legacy",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(AgentType::Ai),
            "human" => Ok(AgentType::Human),
            "oracle" => Ok(AgentType::Oracle),
            "system" => Ok(AgentType::System),
            "legacy" => Ok(AgentType::Legacy),
            other => Err(CortexError::Validation(format!(
                "unknown agent_type: {other:?}"
            ))),
        }
    }
}

/// A registered voting agent.
///
/// Agents are auto-registered with neutral reputation on first vote unless
/// the engine is configured to require explicit registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Caller-supplied stable identifier (UUIDs by convention).
    pub id: String,
    /// Opaque public key material; the engine never interprets it.
    pub public_key: Option<String>,
    pub name: String,
    pub agent_type: AgentType,
    pub tenant_id: String,
    /// Historical agreement with terminal outcomes, in `[0, 1]`.
    pub reputation_score: f64,
    pub total_votes: u64,
    pub successful_votes: u64,
    pub last_active_at: TimestampMs,
    pub is_active: bool,
}

impl Agent {
    /// The reputation assigned to agents the engine has never seen.
    pub const NEUTRAL_REPUTATION: f64 = 0.5;

    /// Builds the auto-registration row used on an unknown agent's first
    /// vote.
    pub fn auto_registered(id: &str, tenant_id: &str, now: TimestampMs) -> Self {
        Agent {
            id: id.to_string(),
            public_key: None,
            name: id.to_string(),
            agent_type: AgentType::Ai,
            tenant_id: tenant_id.to_string(),
            reputation_score: Self::NEUTRAL_REPUTATION,
            total_votes: 0,
            successful_votes: 0,
            last_active_at: now,
            is_active: true,
        }
    }
}

/// A recorded vote on a fact.
///
/// Unique over `(fact_id, agent_id)`; re-voting replaces the prior row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Ledger entry that recorded this vote.
    pub id: TxId,
    pub fact_id: FactId,
    pub agent_id: String,
    /// `-1`, `0` (abstain), or `+1`.
    pub value: i8,
    /// `|value| * agent reputation`, snapshotted at cast time.
    pub vote_weight: f64,
    /// Agent reputation snapshotted at cast time.
    pub agent_rep_at_vote: f64,
    /// Policy damping knob captured at cast time; no background process
    /// rewrites it.
    pub decay_factor: f64,
    pub created_at: TimestampMs,
    pub reason: Option<String>,
}

/// Derived consensus state of a fact, recomputed from its live vote set.
///
/// `Verified` and `Disputed` are terminal for reputation accounting but not
/// absorbing: later votes or decay can move a fact back through the
/// `Likely*` band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusState {
    InsufficientData,
    Contested,
    Verified,
    Disputed,
    LikelyVerified,
    LikelyDisputed,
    Uncertain,
}

impl ConsensusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusState::InsufficientData => "insufficient_data",
            ConsensusState::Contested => "contested",
            ConsensusState::Verified => "verified",
            ConsensusState::Disputed => "disputed",
            ConsensusState::LikelyVerified => "likely_verified",
            ConsensusState::LikelyDisputed => "likely_disputed",
            ConsensusState::Uncertain => "uncertain",
        }
    }

    /// Direction of the terminal transition this state represents, if any.
    pub fn terminal_direction(&self) -> Option<OutcomeDirection> {
        match self {
            ConsensusState::Verified => Some(OutcomeDirection::Verified),
            ConsensusState::Disputed => Some(OutcomeDirection::Disputed),
            _ => None,
        }
    }
}

impl fmt::Display for ConsensusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a terminal consensus transition.
///
/// Reputation rewards are edge-triggered per `(fact, agent, direction)`;
/// this is the third component of that key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeDirection {
    Verified,
    Disputed,
}

impl OutcomeDirection {
    /// Single-byte storage key component.
    pub fn as_key_byte(&self) -> u8 {
        match self {
            OutcomeDirection::Verified => b'v',
            OutcomeDirection::Disputed => b'd',
        }
    }
}

/// Terminal record capturing the state at which reputation updates were
/// applied for a fact. Overwritten if the fact later crosses the opposite
/// terminal threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusOutcome {
    pub fact_id: FactId,
    pub final_state: ConsensusState,
    pub final_score: f64,
    pub resolved_at: TimestampMs,
}
