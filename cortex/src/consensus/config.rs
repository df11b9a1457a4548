//! Consensus tuning parameters.

/// Parameters of the reputation-weighted consensus formula and its
/// confidence state machine.
#[derive(Clone, Debug)]
pub struct ConsensusParams {
    /// Minimum total effective weight before any judgement is made.
    pub min_weight: f64,
    /// Halflife of a vote's temporal decay, in days.
    pub halflife_days: f64,
    /// Blend factor of the reputation update on terminal outcomes.
    pub alpha: f64,
    /// Score at or above which a fact becomes `verified`.
    pub verified_threshold: f64,
    /// Score at or below which a fact becomes `disputed`.
    pub disputed_threshold: f64,
    /// Lower bound of the `likely_verified` band.
    pub likely_verified_threshold: f64,
    /// Upper bound of the `likely_disputed` band.
    pub likely_disputed_threshold: f64,
    /// Reputation variance above which the vote set counts as contested.
    pub contested_variance: f64,
    /// When set, votes from unknown agents are rejected instead of
    /// auto-registering them with neutral reputation.
    pub require_registration: bool,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            min_weight: 5.0,
            halflife_days: 30.0,
            alpha: 0.1,
            verified_threshold: 1.6,
            disputed_threshold: 0.4,
            likely_verified_threshold: 1.3,
            likely_disputed_threshold: 0.7,
            contested_variance: 0.1,
            require_registration: false,
        }
    }
}
