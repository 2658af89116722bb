//! Event sink system for observability.
//!
//! The runner reports its progress as named events with a JSON payload.
//! Sinks are injected into the runner at construction.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event emitted before the first stage (or preflight) runs.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// Event emitted when the run ends with any status other than aborted.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// Event emitted when the run is aborted.
pub const PIPELINE_ABORTED: &str = "pipeline.aborted";
/// Event emitted when a stage begins.
pub const STAGE_STARTED: &str = "stage.started";
/// Event emitted when a stage passes.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// Event emitted when a stage fails and halts the run.
pub const STAGE_FAILED: &str = "stage.failed";
/// Event emitted when a stage fails but its policy lets the run continue.
pub const STAGE_TOLERATED: &str = "stage.tolerated";
/// Event emitted for each stage that is never attempted.
pub const STAGE_SKIPPED: &str = "stage.skipped";
