//! External command execution for pimon collectors
//!
//! Telemetry readings and image captioning both shell out to small
//! platform tools (`vcgencmd`, `df`, `python3 caption.py`). This module
//! runs them asynchronously with:
//! - shell-words parsing of configured command lines (no shell involved)
//! - a bounded wait; the child is killed when the wait expires or the
//!   caller drops the future
//! - a typed error so callers can pick their own fallback

use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

/// Why a command could not produce usable output
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("empty command line")]
    Empty,
    #[error("invalid command line: {0}")]
    Parse(#[from] shell_words::ParseError),
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` timed out after {secs}s")]
    Timeout { program: String, secs: u64 },
    #[error("`{program}` exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u128,
}

/// Runs external commands with a timeout
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    timeout: Duration,
}

impl CommandExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Split a configured command line (e.g. `df -k /`) and run it
    pub async fn run_line(&self, line: &str) -> Result<CommandOutput, CommandError> {
        let argv = shell_words::split(line)?;
        self.run(&argv).await
    }

    /// Run `argv[0]` with the remaining arguments.
    ///
    /// A non-zero exit status is an error; stdout of such a run is discarded.
    pub async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;
        let start_time = Instant::now();
        debug!("Executing command: {:?} (timeout: {:?})", argv, self.timeout);

        let child = AsyncCommand::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| CommandError::Timeout {
                program: program.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.clone(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_command_line() {
        let executor = CommandExecutor::default();
        let err = executor.run_line("   ").await.unwrap_err();
        assert!(matches!(err, CommandError::Empty));
    }

    #[tokio::test]
    async fn test_unbalanced_quotes_rejected() {
        let executor = CommandExecutor::default();
        let err = executor.run_line("echo 'oops").await.unwrap_err();
        assert!(matches!(err, CommandError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let executor = CommandExecutor::default();
        let err = executor
            .run_line("pimon-definitely-not-installed --version")
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_captured() {
        let executor = CommandExecutor::default();
        let output = executor.run_line("echo 'temp=48.3'").await.unwrap();
        assert_eq!(output.stdout.trim(), "temp=48.3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let executor = CommandExecutor::default();
        let err = executor.run_line("sh -c 'echo boom >&2; exit 3'").await.unwrap_err();
        match err {
            CommandError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_child() {
        let executor = CommandExecutor::new(Duration::from_millis(200));
        let start = Instant::now();
        let err = executor.run_line("sleep 5").await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
