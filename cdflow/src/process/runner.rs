//! Command runner trait and the shell-backed implementation.

use crate::errors::CdflowError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::debug;

/// A single external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Shell command line.
    pub command: String,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
    /// Extra environment variables, applied on top of the inherited ones.
    pub env: Vec<(String, String)>,
}

impl Invocation {
    /// Creates an invocation with no extra environment.
    #[must_use]
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
            env: Vec::new(),
        }
    }

    /// Adds environment variables.
    #[must_use]
    pub fn with_env(mut self, env: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(env);
        self
    }
}

/// What an external command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl CommandOutput {
    /// Returns true if the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Capability to invoke an external command and capture its result.
///
/// An `Err` means the command could not be run at all. A command that runs
/// and exits non-zero is an `Ok` with that exit code.
#[async_trait]
pub trait CommandRunner: Send + Sync + Debug {
    /// Runs the command to completion.
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CdflowError>;
}

/// Runs command lines through the platform shell.
///
/// Children are killed if the returned future is dropped, which is how an
/// operator interrupt stops an in-flight stage.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
    flag: String,
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("cmd", "/C")
        } else {
            Self::new("sh", "-c")
        }
    }
}

impl ShellCommandRunner {
    /// Creates a runner that executes `shell flag <command>`.
    #[must_use]
    pub fn new(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            flag: flag.into(),
        }
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CdflowError> {
        let start = Instant::now();
        let mut cmd = tokio::process::Command::new(&self.shell);
        cmd.arg(&self.flag)
            .arg(&invocation.command)
            .current_dir(&invocation.working_dir)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| CdflowError::spawn(&invocation.command, e))?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        };

        debug!(
            exit_code = ?result.exit_code,
            duration_ms = result.duration.as_secs_f64() * 1000.0,
            "Command finished"
        );

        Ok(result)
    }
}
