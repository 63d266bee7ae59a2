//! Runs one reconciliation: reclaim → fetch → classify → compile → apply.
//!
//! Each run is a single attempt with no internal retry. Runs do not lock
//! against each other; overlapping invocations must be prevented by whatever
//! schedules them (a systemd timer does this by default).

use std::fmt;
use tracing::{debug, info, warn};

use crate::classifier::{classify, EmptyFamilyPolicy, Family};
use crate::cmd_abstraction::CommandExecutor;
use crate::config::Config;
use crate::enforcer::{compile, Applier, ReclaimOutcome, Reclaimer, SetId, TargetState};
use crate::error::{Stage, SyncError};
use crate::fetcher::RangeSource;
use crate::utils::format_count;

/// What to do with the compiled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Reclaim stale sets and commit the batch.
    #[default]
    Apply,
    /// Render the batch only. Nothing is sent to nft.
    DryRun,
    /// Let nft validate the batch without committing it. No reclaim.
    Check,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Reclaiming,
    Fetching,
    Classifying,
    Compiling,
    Applying,
    Done,
    Failed { stage: Stage, reason: String },
}

impl RunState {
    fn stage(&self) -> Stage {
        match self {
            RunState::Fetching => Stage::Fetching,
            RunState::Classifying => Stage::Classifying,
            RunState::Compiling => Stage::Compiling,
            RunState::Applying => Stage::Applying,
            RunState::Failed { stage, .. } => *stage,
            RunState::Idle | RunState::Reclaiming | RunState::Done => Stage::Startup,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Failed { stage, .. } => write!(f, "failed during {}", stage),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: RunMode,
    pub v4: usize,
    pub v6: usize,
    pub rejected: usize,
    pub reclaimed: Vec<(SetId, ReclaimOutcome)>,
    /// The rendered nft script.
    pub script: String,
}

pub struct Reconciler<E, S> {
    config: Config,
    executor: E,
    source: S,
    mode: RunMode,
    state: RunState,
}

impl<E: CommandExecutor, S: RangeSource> Reconciler<E, S> {
    pub fn new(config: Config, executor: E, source: S, mode: RunMode) -> Self {
        Self {
            config,
            executor,
            source,
            mode,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn transition(&mut self, next: RunState) {
        debug!("{} -> {}", self.state, next);
        self.state = next;
    }

    /// Run the pipeline once.
    pub async fn run(&mut self) -> Result<RunReport, SyncError> {
        match self.run_stages().await {
            Ok(report) => {
                self.transition(RunState::Done);
                Ok(report)
            }
            Err(e) => {
                let stage = self.state.stage();
                self.transition(RunState::Failed {
                    stage,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self) -> Result<RunReport, SyncError> {
        let table = self.config.table();
        let v4_set = SetId::new(table.clone(), self.config.ipv4_set.clone());
        let v6_set = SetId::new(table, self.config.ipv6_set.clone());

        let mut reclaimed = Vec::new();
        if self.mode == RunMode::Apply && self.config.reclaim {
            self.transition(RunState::Reclaiming);
            let reclaimer = Reclaimer::new(&self.executor, &self.config.nft_path);
            for set in [&v4_set, &v6_set] {
                let outcome = reclaimer.reclaim(set).await;
                reclaimed.push((set.clone(), outcome));
            }
        }

        self.transition(RunState::Fetching);
        let raw = self.source.fetch_ranges().await?;

        self.transition(RunState::Classifying);
        let classified = classify(&raw);
        info!(
            "Fetched {} ranges (IPv4: {}, IPv6: {}, invalid: {})",
            format_count(raw.len()),
            format_count(classified.v4.len()),
            format_count(classified.v6.len()),
            classified.rejected
        );
        let policy = self.config.empty_family_policy;
        classified.enforce(policy)?;
        if policy == EmptyFamilyPolicy::Preserve {
            for (family, set, empty) in [
                (Family::V4, &v4_set, classified.v4.is_empty()),
                (Family::V6, &v6_set, classified.v6.is_empty()),
            ] {
                if empty {
                    preserve_family(family, set, &reclaimed)?;
                }
            }
        }
        let (v4, v6, rejected) = (classified.v4.len(), classified.v6.len(), classified.rejected);

        self.transition(RunState::Compiling);
        let target = TargetState::new(&self.config, classified);
        let batch = compile(&target)?;
        debug!("Compiled {} statements", batch.len());

        self.transition(RunState::Applying);
        let applier = Applier::new(&self.executor, &self.config.nft_path);
        match self.mode {
            RunMode::Apply => applier.apply(&batch).await?,
            RunMode::Check => applier.check(&batch).await?,
            RunMode::DryRun => debug!("Dry run: not submitting batch"),
        }

        Ok(RunReport {
            mode: self.mode,
            v4,
            v6,
            rejected,
            reclaimed,
            script: batch.script(),
        })
    }
}

/// Check that an empty family's set still holds its previous contents.
///
/// Preserving only works for a set reclaim did not delete: a `Deleted` set is
/// gone, and the batch would recreate it empty.
fn preserve_family(
    family: Family,
    set: &SetId,
    reclaimed: &[(SetId, ReclaimOutcome)],
) -> Result<(), SyncError> {
    let deleted = reclaimed
        .iter()
        .any(|(id, outcome)| id == set && *outcome == ReclaimOutcome::Deleted);
    if deleted {
        return Err(SyncError::Unpreservable {
            family: family.to_string(),
            set: set.to_string(),
        });
    }
    warn!("No {} ranges fetched; leaving {} unchanged", family, set);
    Ok(())
}
