//! nftsync - keep nftables address sets in sync with published IP ranges.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use nftsync::cli::Cli;
use nftsync::cmd_abstraction::RealCommandExecutor;
use nftsync::config::Config;
use nftsync::enforcer::check_root;
use nftsync::error::{Stage, SyncError};
use nftsync::fetcher::MetaFetcher;
use nftsync::reconciler::{Reconciler, RunMode, RunReport, RunState};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    match run(&cli).await {
        Ok(report) => {
            match report.mode {
                RunMode::Apply => println!("Successfully updated nftables sets."),
                RunMode::Check => println!("nft accepted the update (not committed)."),
                RunMode::DryRun => print!("{}", report.script),
            }
            ExitCode::SUCCESS
        }
        Err((stage, e)) => {
            error!("ERROR during {}: {}", stage, e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: &Cli) -> Result<RunReport, (Stage, SyncError)> {
    let startup = |e: SyncError| (Stage::Startup, e);

    let mut config = Config::load_or_default(cli.config.as_deref())
        .map_err(|e| startup(SyncError::Config(format!("{:#}", e))))?;
    cli.apply_overrides(&mut config);

    let mode = cli.mode();
    if mode != RunMode::DryRun {
        check_root().map_err(startup)?;
    }

    let executor = RealCommandExecutor::new(config.engine_timeout());
    let source = MetaFetcher::new(&config).map_err(startup)?;

    let mut reconciler = Reconciler::new(config, executor, source, mode);
    let result = reconciler.run().await;
    result.map_err(|e| {
        let stage = match reconciler.state() {
            RunState::Failed { stage, .. } => *stage,
            _ => e.stage(),
        };
        (stage, e)
    })
}
