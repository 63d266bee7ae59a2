//! nftables enforcement: typed statements, batch compilation, stale-set
//! reclaim and transactional application.

mod applier;
mod compiler;
mod reclaim;
pub mod statement;

#[cfg(test)]
pub mod mock;

pub use applier::Applier;
pub use compiler::{compile, CompileError, MutationBatch, TargetState};
pub use reclaim::{classify_failure, ReclaimOutcome, Reclaimer};
pub use statement::{ElementList, Phase, SetId, SetSpec, Statement, TableFamily, TableId};

use crate::error::SyncError;

/// Check if running as root (effective UID == 0)
///
/// Changing nftables state needs CAP_NET_ADMIN. Checking the effective UID
/// covers the usual case of running from a root timer or with sudo.
pub fn check_root() -> Result<(), SyncError> {
    // SAFETY: geteuid() has no preconditions, never fails and touches no state.
    let euid = unsafe { libc::geteuid() };

    if euid != 0 {
        return Err(SyncError::Permission(
            "This operation requires root privileges. Please run with sudo.\n\
             Alternatively, ensure the process has the CAP_NET_ADMIN capability."
                .to_string(),
        ));
    }
    Ok(())
}
