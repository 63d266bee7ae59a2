//! Best-effort removal of stale address sets.
//!
//! A set created by an older run may carry different attributes (element
//! type, flags), and `add set` refuses to change those in place. Deleting the
//! set first lets the batch recreate it. The delete runs as its own nft
//! invocation, never inside the batch: deleting a missing set is an error and
//! would roll the whole transaction back.

use std::fmt;
use tracing::debug;

use super::statement::SetId;
use crate::cmd_abstraction::CommandExecutor;

/// nft reports ENOENT for a missing table or set.
const NOT_FOUND_MARKER: &str = "No such file or directory";
/// nft reports EBUSY for a set still referenced by a rule.
const BUSY_MARKER: &str = "Device or resource busy";

/// Result of a single reclaim attempt. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimOutcome {
    Deleted,
    NotFound,
    /// Referenced by a rule; the batch flushes and refills it in place.
    Busy,
    Failed(String),
}

impl fmt::Display for ReclaimOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReclaimOutcome::Deleted => f.write_str("deleted"),
            ReclaimOutcome::NotFound => f.write_str("not present"),
            ReclaimOutcome::Busy => f.write_str("in use, will be updated in place"),
            ReclaimOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Classify nft's diagnostic output for a failed `delete set`.
///
/// nft exits 1 for every error, so the errno text is the only signal.
/// Anything unrecognised is `Failed`, which callers treat the same way.
pub fn classify_failure(output: &str) -> ReclaimOutcome {
    if output.contains(NOT_FOUND_MARKER) {
        ReclaimOutcome::NotFound
    } else if output.contains(BUSY_MARKER) {
        ReclaimOutcome::Busy
    } else {
        ReclaimOutcome::Failed(output.trim().to_string())
    }
}

/// Issues standalone `nft delete set` commands.
pub struct Reclaimer<'a, E: CommandExecutor> {
    executor: &'a E,
    nft: &'a str,
}

impl<'a, E: CommandExecutor> Reclaimer<'a, E> {
    pub fn new(executor: &'a E, nft: &'a str) -> Self {
        Self { executor, nft }
    }

    pub async fn reclaim(&self, set: &SetId) -> ReclaimOutcome {
        debug!("Attempting to delete stale set {}", set);

        let outcome = match self.executor.execute(self.nft, &set.delete_args()).await {
            Ok(output) if output.success => ReclaimOutcome::Deleted,
            Ok(output) => classify_failure(&output.combined()),
            Err(e) => ReclaimOutcome::Failed(e.to_string()),
        };

        debug!("Reclaim {}: {}", set.name, outcome);
        outcome
    }
}
