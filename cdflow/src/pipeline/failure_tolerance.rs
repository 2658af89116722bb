//! Per-stage failure policy and failure bookkeeping.
//!
//! Most stages abort the run when they fail. A stage marked
//! [`FailurePolicy::Continue`] has its failure recorded and the run moves on.
//! Spawn errors and operator cancellation abort the run whatever the policy.

use crate::core::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a stage failure affects the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the pipeline when this stage fails (default).
    #[default]
    Abort,
    /// Record the failure and run the next stage.
    Continue,
}

impl FailurePolicy {
    /// Maps the `continue_on_failure` flag to a policy.
    #[must_use]
    pub fn from_continue_flag(continue_on_failure: bool) -> Self {
        if continue_on_failure {
            Self::Continue
        } else {
            Self::Abort
        }
    }

    /// Returns true for [`FailurePolicy::Continue`].
    #[must_use]
    pub fn is_tolerant(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Decides what a stage's final status means for the run.
    #[must_use]
    pub fn disposition(&self, status: StageStatus) -> StageDisposition {
        if status.is_success() {
            StageDisposition::Proceed
        } else if status.is_fatal() {
            StageDisposition::Abort
        } else if status.is_tolerable_failure() && self.is_tolerant() {
            StageDisposition::Tolerate
        } else {
            StageDisposition::Fail
        }
    }
}

/// What the runner does after a stage finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageDisposition {
    /// Stage passed; run the next one.
    Proceed,
    /// Stage failed but is tolerant; record and run the next one.
    Tolerate,
    /// Stage failed; the run fails and later stages are skipped.
    Fail,
    /// Unrecoverable; the run is aborted and later stages are skipped.
    Abort,
}

impl StageDisposition {
    /// Returns true if later stages still run.
    #[must_use]
    pub fn continues(&self) -> bool {
        matches!(self, Self::Proceed | Self::Tolerate)
    }
}

/// Record of a stage failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage name (or `preflight`).
    pub stage: String,
    /// Error message.
    pub error: String,
    /// Error category: `process`, `gate_timeout`, `environment`, ...
    pub error_type: String,
    /// Whether the run continued past this failure.
    pub tolerated: bool,
    /// Exit code of the failing command, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            error: error.into(),
            error_type: "process".to_string(),
            tolerated: false,
            exit_code: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the error type.
    #[must_use]
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    /// Sets the exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Marks as tolerated.
    #[must_use]
    pub fn tolerated(mut self) -> Self {
        self.tolerated = true;
        self
    }
}

/// Error category for a non-passing stage status.
#[must_use]
pub fn error_type_for(status: StageStatus) -> &'static str {
    match status {
        StageStatus::TimedOut => "gate_timeout",
        StageStatus::Errored => "environment",
        StageStatus::Cancelled => "cancelled",
        _ => "process",
    }
}

/// Collects failures during a run.
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<FailureRecord>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn record(&mut self, record: FailureRecord) {
        self.failures.push(record);
    }

    /// Returns true if any failure was recorded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns the first failure that was not tolerated.
    #[must_use]
    pub fn first_fatal(&self) -> Option<&FailureRecord> {
        self.failures.iter().find(|f| !f.tolerated)
    }

    /// Returns all failures.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Consumes the collector.
    #[must_use]
    pub fn into_failures(self) -> Vec<FailureRecord> {
        self.failures
    }
}
