//! Reputation-weighted consensus over facts.
//!
//! This module provides a modular consensus layer consisting of:
//!
//! - tuning parameters ([`config::ConsensusParams`]),
//! - the pure score/state math ([`score`]),
//! - the vote engine ([`engine::ConsensusEngine`]) that loads agents,
//!   replaces prior votes, recomputes scores, and applies edge-triggered
//!   reputation updates.

pub mod config;
pub mod engine;
pub mod score;

pub use config::ConsensusParams;
pub use engine::{ConsensusEngine, VoteOutcome};
pub use score::ScoreBreakdown;
