//! Command execution abstraction for testability.
//!
//! This module provides a trait-based abstraction over command execution,
//! allowing unit tests to mock the firewall engine without actually running it.
//! The real implementation puts an explicit deadline on every call.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

use crate::error::SyncError;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Successful output with nothing printed.
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }

    /// Failed output with the given stderr and exit code.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stderr: stderr.into(),
            success: false,
            code: Some(code),
            ..Self::default()
        }
    }

    /// Stdout followed by stderr, the way an operator would see it on a terminal.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }

    /// Human readable exit status.
    pub fn status(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Trait for command execution, allowing dependency injection for testing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments.
    ///
    /// A command that runs and exits non-zero is `Ok` with `success == false`.
    /// Only failing to run it at all (or running out of time) is an `Err`.
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput, SyncError>;

    /// Execute a command with stdin input.
    async fn execute_with_stdin(
        &self,
        cmd: &str,
        args: &[String],
        stdin: &str,
    ) -> Result<CommandOutput, SyncError>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone)]
pub struct RealCommandExecutor {
    timeout: Duration,
}

impl RealCommandExecutor {
    /// Create an executor that kills any command still running after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(
        &self,
        cmd: &str,
        args: &[String],
        stdin_data: Option<&str>,
    ) -> Result<CommandOutput, SyncError> {
        let mut command = Command::new(cmd);
        command
            .args(args)
            .stdin(if stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| spawn_error(cmd, e))?;

        let finished = async move {
            if let (Some(data), Some(mut stdin)) = (stdin_data, child.stdin.take()) {
                stdin.write_all(data.as_bytes()).await?;
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(self.timeout, finished).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                success: output.status.success(),
                code: output.status.code(),
            }),
            Ok(Err(e)) => Err(SyncError::Spawn {
                program: cmd.to_string(),
                message: e.to_string(),
            }),
            // Dropping the future drops the child, which kills it.
            Err(_) => Err(SyncError::Timeout {
                program: cmd.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

impl Default for RealCommandExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CommandExecutor for RealCommandExecutor {
    async fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput, SyncError> {
        self.run(cmd, args, None).await
    }

    async fn execute_with_stdin(
        &self,
        cmd: &str,
        args: &[String],
        stdin: &str,
    ) -> Result<CommandOutput, SyncError> {
        self.run(cmd, args, Some(stdin)).await
    }
}

fn spawn_error(cmd: &str, err: std::io::Error) -> SyncError {
    match err.kind() {
        ErrorKind::PermissionDenied => {
            SyncError::Permission(format!("cannot execute {}: {}", cmd, err))
        }
        _ => SyncError::Spawn {
            program: cmd.to_string(),
            message: err.to_string(),
        },
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// mockall has issues with lifetimes in `&[&str]`, so the trait takes
/// `&[String]` instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Compare mock-captured arguments against expected literals.
#[cfg(test)]
pub(crate) fn args_eq(args: &[String], expected: &[&str]) -> bool {
    args.len() == expected.len() && args.iter().zip(expected).all(|(a, e)| a == e)
}
