//! Stage output type with factory methods.

use super::{StageArtifact, StageStatus};
use serde::{Deserialize, Serialize};

/// One external command a stage ran, with its captured output.
///
/// Everything in a record has already been passed through the run's
/// redactor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// The command line as it was handed to the shell.
    pub command: String,
    /// Process exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error.
    #[serde(default)]
    pub stderr: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
}

impl CommandRecord {
    /// Returns true if the command exited with status zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The output of a stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,

    /// Commands run by the stage, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandRecord>,

    /// Reports the stage declared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StageArtifact>,

    /// Error message (for anything but a pass).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutput {
    fn with_status(status: StageStatus, error: Option<String>) -> Self {
        Self {
            status,
            commands: Vec::new(),
            artifacts: Vec::new(),
            error,
        }
    }

    /// Creates a passing output.
    #[must_use]
    pub fn passed() -> Self {
        Self::with_status(StageStatus::Passed, None)
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self::with_status(StageStatus::Failed, Some(error.into()))
    }

    /// Creates a timeout output.
    #[must_use]
    pub fn timed_out(error: impl Into<String>) -> Self {
        Self::with_status(StageStatus::TimedOut, Some(error.into()))
    }

    /// Creates an output for a process that could not be spawned.
    #[must_use]
    pub fn errored(error: impl Into<String>) -> Self {
        Self::with_status(StageStatus::Errored, Some(error.into()))
    }

    /// Creates a cancel output with a reason.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::with_status(StageStatus::Cancelled, Some(reason.into()))
    }

    /// Attaches the commands the stage ran.
    #[must_use]
    pub fn with_commands(mut self, commands: Vec<CommandRecord>) -> Self {
        self.commands = commands;
        self
    }

    /// Attaches report artifacts.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<StageArtifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Returns true if the stage passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the last command's exit code, if any command ran.
    #[must_use]
    pub fn last_exit_code(&self) -> Option<i32> {
        self.commands.last().and_then(|c| c.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(exit_code: Option<i32>) -> CommandRecord {
        CommandRecord {
            command: "mvn test".to_string(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1.0,
        }
    }

    #[test]
    fn test_factories() {
        assert!(StageOutput::passed().is_success());
        assert!(StageOutput::passed().error.is_none());

        let failed = StageOutput::failed("exit 1");
        assert_eq!(failed.status, StageStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("exit 1"));

        assert_eq!(StageOutput::timed_out("t").status, StageStatus::TimedOut);
        assert_eq!(StageOutput::errored("e").status, StageStatus::Errored);
        assert_eq!(StageOutput::cancelled("c").status, StageStatus::Cancelled);
    }

    #[test]
    fn test_command_record_succeeded() {
        assert!(record(Some(0)).succeeded());
        assert!(!record(Some(2)).succeeded());
        assert!(!record(None).succeeded());
    }

    #[test]
    fn test_last_exit_code() {
        let output = StageOutput::failed("second command failed")
            .with_commands(vec![record(Some(0)), record(Some(4))]);
        assert_eq!(output.last_exit_code(), Some(4));
        assert_eq!(StageOutput::passed().last_exit_code(), None);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(StageOutput::passed()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "passed"}));
    }
}
