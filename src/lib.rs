//! # nftsync - nftables allow-list sync for published IP ranges
//!
//! Keeps a pair of nftables address sets (IPv4 + IPv6) equal to a list of
//! CIDR ranges published over HTTP, by default the GitHub Actions ranges from
//! `https://api.github.com/meta`. Rules that reference the sets are left
//! alone; only the set contents are managed.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        nftsync                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap) + Config (serde_yaml)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Reconciler                                                 │
//! │    Reclaiming → Fetching → Classifying → Compiling →        │
//! │    Applying → Done            (any fatal step → Failed)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fetcher (reqwest + rustls)                                 │
//! │  Classifier (ipnet)          v4 / v6 buckets                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer                                                   │
//! │    ├── Statement / MutationBatch  typed, phase-ordered      │
//! │    ├── Reclaimer                  standalone delete set     │
//! │    └── Applier                    nft -f - (one transaction)│
//! ├─────────────────────────────────────────────────────────────┤
//! │  CommandExecutor (tokio::process, per-call deadline)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use nftsync::cmd_abstraction::RealCommandExecutor;
//! use nftsync::config::Config;
//! use nftsync::enforcer::check_root;
//! use nftsync::fetcher::MetaFetcher;
//! use nftsync::reconciler::{Reconciler, RunMode};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     check_root()?;
//!
//!     let config = Config::default();
//!     let executor = RealCommandExecutor::new(config.engine_timeout());
//!     let source = MetaFetcher::new(&config)?;
//!
//!     let mut reconciler = Reconciler::new(config, executor, source, RunMode::Apply);
//!     let report = reconciler.run().await?;
//!     println!("{} IPv4 / {} IPv6 ranges applied", report.v4, report.v6);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`classifier`] - CIDR validation and v4/v6 partitioning
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Mockable command execution with deadlines
//! - [`config`] - Configuration parsing and validation
//! - [`enforcer`] - nft statements, batch compilation, reclaim and apply
//! - [`error`] - Error taxonomy
//! - [`fetcher`] - HTTP client for the published range list
//! - [`reconciler`] - The run state machine
//! - [`utils`] - Formatting helpers

pub mod classifier;
pub mod cli;
pub mod cmd_abstraction;
pub mod config;
pub mod enforcer;
pub mod error;
pub mod fetcher;
pub mod reconciler;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use error::SyncError;
