//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Runs one or more shell command lines.
    #[default]
    Command,
    /// Waits for an external quality-gate verdict.
    QualityGate,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::QualityGate => write!(f, "quality_gate"),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage has not started yet.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Passed,
    /// A command exited non-zero, or the gate verdict was a failure.
    Failed,
    /// The gate signal did not arrive within the wait window.
    TimedOut,
    /// A process could not be spawned.
    Errored,
    /// The operator interrupted the stage.
    Cancelled,
    /// Stage was never attempted because an earlier stage halted the run.
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Errored => write!(f, "errored"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Returns true if the stage passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Returns true if the status is a failure a stage policy may tolerate.
    #[must_use]
    pub fn is_tolerable_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }

    /// Returns true if the status aborts the run regardless of stage policy.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Errored | Self::Cancelled)
    }

    /// Returns true if the stage actually ran.
    #[must_use]
    pub fn was_attempted(&self) -> bool {
        !matches!(self, Self::Pending | Self::Skipped)
    }
}

/// The overall status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is in progress.
    #[default]
    Running,
    /// Every required stage passed.
    Succeeded,
    /// A non-tolerant stage failed.
    Failed,
    /// The environment was unusable or the operator interrupted the run.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl RunStatus {
    /// Process exit code the CLI reports for this status.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::Running | Self::Failed => 1,
            Self::Aborted => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Command.to_string(), "command");
        assert_eq!(StageKind::QualityGate.to_string(), "quality_gate");
    }

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Passed.to_string(), "passed");
        assert_eq!(StageStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_stage_status_classification() {
        assert!(StageStatus::Passed.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(!StageStatus::Running.is_terminal());

        assert!(StageStatus::Failed.is_tolerable_failure());
        assert!(StageStatus::TimedOut.is_tolerable_failure());
        assert!(!StageStatus::Errored.is_tolerable_failure());

        assert!(StageStatus::Errored.is_fatal());
        assert!(StageStatus::Cancelled.is_fatal());
        assert!(!StageStatus::Failed.is_fatal());

        assert!(!StageStatus::Skipped.was_attempted());
        assert!(StageStatus::TimedOut.was_attempted());
    }

    #[test]
    fn test_run_status_exit_code() {
        assert_eq!(RunStatus::Succeeded.exit_code(), 0);
        assert_eq!(RunStatus::Failed.exit_code(), 1);
        assert_eq!(RunStatus::Aborted.exit_code(), 2);
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&StageStatus::TimedOut).unwrap();
        assert_eq!(json, r#""timed_out""#);

        let status: RunStatus = serde_json::from_str(r#""aborted""#).unwrap();
        assert_eq!(status, RunStatus::Aborted);

        let kind: StageKind = serde_json::from_str(r#""quality_gate""#).unwrap();
        assert_eq!(kind, StageKind::QualityGate);
    }
}
