//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications and the validated, ordered [`Pipeline`]
//! - Pipeline builder with validation
//! - Per-stage failure policies
//! - The sequential runner and its result

mod builder;
mod failure_tolerance;
mod result;
mod runner;
mod spec;


pub use builder::PipelineBuilder;
pub use failure_tolerance::{
    error_type_for, FailureCollector, FailurePolicy, FailureRecord, StageDisposition,
};
pub use result::PipelineResult;
pub use runner::{Credential, PipelineRunner, RunnerConfig};
pub use spec::{Pipeline, StageSpec};
