//! Outcome of a pipeline run.

use super::FailureRecord;
use crate::core::{RunStatus, StageStatus};
use crate::errors::CdflowError;
use crate::stages::StageResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Everything that happened during one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// Overall outcome.
    pub status: RunStatus,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// One entry per declared stage, in declaration order.
    pub stages: Vec<StageResult>,
    /// Every failure, tolerated or not.
    #[serde(default)]
    pub failures: Vec<FailureRecord>,
    /// Why the run was aborted or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
}

impl PipelineResult {
    /// Returns true if the run succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Per-stage statuses in declaration order.
    #[must_use]
    pub fn status_sequence(&self) -> Vec<StageStatus> {
        self.stages.iter().map(|s| s.status).collect()
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Stages that were attempted.
    pub fn executed(&self) -> impl Iterator<Item = &StageResult> {
        self.stages.iter().filter(|s| s.status.was_attempted())
    }

    /// Number of stages with the given status.
    #[must_use]
    pub fn count(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }

    /// One-line human summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Pipeline '{}' {} in {:.1}s: {} passed, {} failed, {} skipped",
            self.pipeline,
            self.status,
            self.duration_ms / 1000.0,
            self.count(StageStatus::Passed),
            self.stages.iter().filter(|s| s.is_failure()).count(),
            self.count(StageStatus::Skipped),
        );
        if let Some(reason) = &self.halt_reason {
            line.push_str(" (");
            line.push_str(reason);
            line.push(')');
        }
        line
    }

    /// Serializes to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, CdflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Writes the result as JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<(), CdflowError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
