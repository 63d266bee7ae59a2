//! Error types for nftsync.

use std::fmt;
use thiserror::Error;

use crate::enforcer::CompileError;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Startup,
    Fetching,
    Classifying,
    Compiling,
    Applying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Startup => "startup",
            Stage::Fetching => "fetch",
            Stage::Classifying => "classify",
            Stage::Compiling => "compile",
            Stage::Applying => "apply",
        };
        f.write_str(name)
    }
}

/// Fatal errors. Every variant terminates the run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Invalid metadata response: {0}")]
    Decode(String),

    #[error("No usable ranges (IPv4: {v4}, IPv6: {v6})")]
    EmptyRanges { v4: usize, v6: usize },

    /// A family came back empty after reclaim had already deleted its set, so
    /// its previous contents can no longer be kept.
    #[error("No {family} ranges fetched and set {set} was already reclaimed; refusing to recreate it empty")]
    Unpreservable { family: String, set: String },

    #[error("Batch rendering failed: {0}")]
    Compile(#[from] CompileError),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("{program} did not finish within {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("Failed to run {program}: {message}")]
    Spawn { program: String, message: String },

    /// The engine rejected the batch. `output` is its combined output, unmodified.
    #[error("{message}\nOutput: {output}")]
    Engine { message: String, output: String },
}

impl SyncError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            SyncError::Config(_) | SyncError::Permission(_) => Stage::Startup,
            SyncError::Fetch(_) | SyncError::Decode(_) => Stage::Fetching,
            SyncError::EmptyRanges { .. } | SyncError::Unpreservable { .. } => {
                Stage::Classifying
            }
            SyncError::Compile(_) => Stage::Compiling,
            SyncError::Timeout { .. } | SyncError::Spawn { .. } | SyncError::Engine { .. } => {
                Stage::Applying
            }
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Config(_) | SyncError::Permission(_) => 2,
            _ => 1,
        }
    }
}
