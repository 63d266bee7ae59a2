//! Submits a mutation batch to nft as a single transaction.
//!
//! `nft -f -` commits a script atomically: if any statement fails nothing is
//! changed, so there is no partial state to clean up here.

use tracing::{debug, info};

use super::compiler::MutationBatch;
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput};
use crate::error::SyncError;

const PERMISSION_MARKERS: &[&str] = &["Operation not permitted", "Permission denied"];

pub struct Applier<'a, E: CommandExecutor> {
    executor: &'a E,
    nft: &'a str,
}

impl<'a, E: CommandExecutor> Applier<'a, E> {
    pub fn new(executor: &'a E, nft: &'a str) -> Self {
        Self { executor, nft }
    }

    /// Apply the batch.
    pub async fn apply(&self, batch: &MutationBatch) -> Result<(), SyncError> {
        debug!("Executing nft script:\n{}", batch);
        self.submit(&["-f", "-"], batch).await?;
        info!("Applied {} nft statements", batch.len());
        Ok(())
    }

    /// Have nft parse and evaluate the batch without committing it.
    pub async fn check(&self, batch: &MutationBatch) -> Result<(), SyncError> {
        debug!("Checking nft script:\n{}", batch);
        self.submit(&["--check", "-f", "-"], batch).await?;
        info!("nft accepted {} statements (not committed)", batch.len());
        Ok(())
    }

    async fn submit(&self, args: &[&str], batch: &MutationBatch) -> Result<(), SyncError> {
        let output = self
            .executor
            .execute_with_stdin(self.nft, &args_to_strings(args), &batch.script())
            .await?;

        if output.success {
            let echoed = output.combined();
            if !echoed.trim().is_empty() {
                debug!("nft output: {}", echoed.trim_end());
            }
            return Ok(());
        }

        Err(rejection(self.nft, &output))
    }
}

fn rejection(nft: &str, output: &CommandOutput) -> SyncError {
    let combined = output.combined();
    if PERMISSION_MARKERS.iter().any(|m| combined.contains(m)) {
        return SyncError::Permission(format!(
            "{} refused the batch ({})\nOutput: {}",
            nft,
            output.status(),
            combined
        ));
    }
    SyncError::Engine {
        message: format!("{} failed with {}", nft, output.status()),
        output: combined,
    }
}
