//! Score recomputation and the confidence state machine.
//!
//! The score of a fact is derived from its live vote set:
//!
//! ```text
//! weight_i   = vote_weight_i * decay_factor_i * exp(-age_days_i / halflife)
//! normalised = sum(vote_i * weight_i) / sum(weight_i)   // 0 if no weight
//! score      = 1.0 + normalised                          // in [0, 2]
//! ```
//!
//! Abstentions carry zero weight but stay recorded. The derived state
//! gates on total weight first, then on the variance of participating
//! reputations, then on the score bands.

use super::config::ConsensusParams;
use crate::types::{ConsensusState, OutcomeDirection, TimestampMs, Vote};

/// Result of one score evaluation over a vote set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreBreakdown {
    /// `1.0 + normalised`, clamped to `[0, 2]`.
    pub score: f64,
    pub state: ConsensusState,
    /// Sum of effective weights.
    pub total_weight: f64,
    /// Population variance of participating reputations.
    pub reputation_variance: f64,
}

/// Effective weight of one vote at evaluation time.
fn effective_weight(vote: &Vote, params: &ConsensusParams, now: TimestampMs) -> f64 {
    let age_decay = (-vote.created_at.age_days(now) / params.halflife_days).exp();
    vote.vote_weight * vote.decay_factor * age_decay
}

/// Evaluates the score and derived state of a vote set.
pub fn evaluate(votes: &[Vote], params: &ConsensusParams, now: TimestampMs) -> ScoreBreakdown {
    let mut weight_sum = 0.0f64;
    let mut signal_sum = 0.0f64;

    for vote in votes {
        let weight = effective_weight(vote, params, now);
        weight_sum += weight;
        signal_sum += f64::from(vote.value) * weight;
    }

    let normalised = if weight_sum > 0.0 {
        signal_sum / weight_sum
    } else {
        0.0
    };
    let score = (1.0 + normalised).clamp(0.0, 2.0);
    let variance = reputation_variance(votes);

    let state = if weight_sum < params.min_weight {
        ConsensusState::InsufficientData
    } else if variance > params.contested_variance {
        ConsensusState::Contested
    } else if score >= params.verified_threshold {
        ConsensusState::Verified
    } else if score <= params.disputed_threshold {
        ConsensusState::Disputed
    } else if score >= params.likely_verified_threshold {
        ConsensusState::LikelyVerified
    } else if score <= params.likely_disputed_threshold {
        ConsensusState::LikelyDisputed
    } else {
        ConsensusState::Uncertain
    };

    ScoreBreakdown {
        score,
        state,
        total_weight: weight_sum,
        reputation_variance: variance,
    }
}

/// Population variance of the reputation snapshots of participating
/// (non-abstaining) votes.
fn reputation_variance(votes: &[Vote]) -> f64 {
    let reps: Vec<f64> = votes
        .iter()
        .filter(|v| v.vote_weight > 0.0)
        .map(|v| v.agent_rep_at_vote)
        .collect();
    if reps.is_empty() {
        return 0.0;
    }
    let mean = reps.iter().sum::<f64>() / reps.len() as f64;
    reps.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / reps.len() as f64
}

/// Agreement of a vote with a terminal outcome: `+1` agreed, `-1` opposed,
/// `0` abstained.
pub fn correctness(value: i8, direction: OutcomeDirection) -> i8 {
    match (value.signum(), direction) {
        (1, OutcomeDirection::Verified) | (-1, OutcomeDirection::Disputed) => 1,
        (1, OutcomeDirection::Disputed) | (-1, OutcomeDirection::Verified) => -1,
        _ => 0,
    }
}

/// Blends a terminal outcome into an agent's reputation:
/// `clamp(0,1)(alpha * (0.5 + 0.5 * correctness) + (1 - alpha) * rep_at_vote)`.
pub fn updated_reputation(correctness: i8, rep_at_vote: f64, alpha: f64) -> f64 {
    let target = 0.5 + 0.5 * f64::from(correctness);
    (alpha * target + (1.0 - alpha) * rep_at_vote).clamp(0.0, 1.0)
}
