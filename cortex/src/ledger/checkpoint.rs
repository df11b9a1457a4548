//! Checkpoint policy.
//!
//! A checkpoint becomes due when enough entries have accumulated since the
//! last summary and the backlog has had time to settle. The evaluation is
//! pure; the engine's background loop feeds it the committed head and the
//! latest checkpoint and commits the summary it proposes.

use std::time::Duration;

use super::Checkpoint;
use crate::types::{TimestampMs, TxId};

/// Tuning for the background checkpointer.
#[derive(Clone, Debug)]
pub struct CheckpointConfig {
    /// Number of uncovered entries that triggers a new checkpoint.
    pub window: u64,
    /// Minimum time since the reference instant (last checkpoint, or the
    /// oldest uncovered entry when none exists) before a checkpoint may be
    /// cut.
    pub min_age: Duration,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            window: 1024,
            min_age: Duration::from_secs(60),
        }
    }
}

/// Range a new checkpoint would cover: from just past the last summary to
/// the committed head. `None` when nothing is uncovered.
pub fn uncovered_range(
    head: Option<TxId>,
    last: Option<&Checkpoint>,
) -> Option<(TxId, TxId)> {
    let head = head?;
    let start = match last {
        Some(cp) => cp.tx_end.next(),
        None => TxId(1),
    };
    (start <= head).then_some((start, head))
}

/// Policy decision: returns the range to summarise when both the window
/// and the age condition hold.
///
/// `reference` is the instant the age is measured from; the engine passes
/// the last checkpoint's `created_at`, falling back to the oldest
/// uncovered entry's timestamp.
pub fn due_range(
    head: Option<TxId>,
    last: Option<&Checkpoint>,
    reference: Option<TimestampMs>,
    now: TimestampMs,
    cfg: &CheckpointConfig,
) -> Option<(TxId, TxId)> {
    let (start, end) = uncovered_range(head, last)?;
    let pending = end.0 - start.0 + 1;
    if pending <= cfg.window {
        return None;
    }

    let age_ms = match reference {
        Some(t) => now.millis().saturating_sub(t.millis()),
        None => return None,
    };
    if age_ms < cfg.min_age.as_millis() as i64 {
        return None;
    }

    Some((start, end))
}
