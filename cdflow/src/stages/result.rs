//! Per-stage entry of a run result.

use crate::core::{CommandRecord, StageArtifact, StageKind, StageOutput, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one stage during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub name: String,
    /// Zero-based position in the pipeline.
    pub index: usize,
    /// Stage kind.
    pub kind: StageKind,
    /// Final status.
    pub status: StageStatus,
    /// True when the stage failed but its policy let the run continue.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub tolerated: bool,
    /// When the stage started; absent for skipped stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage ended; absent for skipped stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Commands the stage ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<CommandRecord>,
    /// Reports the stage declared.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<StageArtifact>,
    /// Error message if the stage did not pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Why the stage never ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl StageResult {
    /// Builds the result of a stage that ran.
    #[must_use]
    pub fn executed(
        name: impl Into<String>,
        index: usize,
        kind: StageKind,
        started_at: DateTime<Utc>,
        duration_ms: f64,
        output: StageOutput,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            kind,
            status: output.status,
            tolerated: false,
            started_at: Some(started_at),
            ended_at: Some(Utc::now()),
            duration_ms,
            commands: output.commands,
            artifacts: output.artifacts,
            error: output.error,
            skip_reason: None,
        }
    }

    /// Builds the result of a stage that was never attempted.
    #[must_use]
    pub fn skipped(
        name: impl Into<String>,
        index: usize,
        kind: StageKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            kind,
            status: StageStatus::Skipped,
            tolerated: false,
            started_at: None,
            ended_at: None,
            duration_ms: 0.0,
            commands: Vec::new(),
            artifacts: Vec::new(),
            error: None,
            skip_reason: Some(reason.into()),
        }
    }

    /// Marks the failure as tolerated.
    #[must_use]
    pub fn tolerated(mut self) -> Self {
        self.tolerated = true;
        self
    }

    /// Returns true if the stage passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage ran and did not pass.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.was_attempted() && !self.status.is_success()
    }
}
