//! CLI argument parsing with clap.

use clap::Parser;
use std::path::PathBuf;

use crate::classifier::EmptyFamilyPolicy;
use crate::config::Config;
use crate::reconciler::RunMode;

#[derive(Parser, Debug)]
#[command(name = "nftsync")]
#[command(author, version, about = "Sync nftables address sets with GitHub's published IP ranges")]
#[command(
    after_help = "Each invocation is one idempotent attempt. Runs are not locked against each \
                  other: schedule them so they cannot overlap (e.g. a systemd timer)."
)]
pub struct Cli {
    /// Config file path (YAML). Built-in defaults are used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose mode (debug output, including reclaim results and the nft script)
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet mode (errors only, for cron/systemd timer)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the nft script instead of applying it
    #[arg(long, conflicts_with = "check")]
    pub dry_run: bool,

    /// Have nft validate the script without committing it
    #[arg(long)]
    pub check: bool,

    /// Abort when either address family comes back empty
    #[arg(long)]
    pub strict: bool,

    /// Do not try to delete the sets before updating them
    #[arg(long)]
    pub no_reclaim: bool,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else if self.check {
            RunMode::Check
        } else {
            RunMode::Apply
        }
    }

    /// Apply command-line overrides on top of the loaded config.
    pub fn apply_overrides(&self, config: &mut Config) {
        if self.strict {
            config.empty_family_policy = EmptyFamilyPolicy::Strict;
        }
        if self.no_reclaim {
            config.reclaim = false;
        }
    }
}
