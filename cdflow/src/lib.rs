//! # cdflow
//!
//! A sequential CI/CD pipeline runner.
//!
//! cdflow runs a fixed, ordered list of stages that shell out to external
//! build, scan and deploy tools. It provides:
//!
//! - **Strictly sequential execution**: a stage starts only after the previous one ended
//! - **Per-stage failure policy**: abort the run, or record the failure and continue
//! - **Bounded quality gate wait**: an external pass/fail verdict awaited under a timeout
//! - **Preflight checks**: missing tools or credentials abort the run before any command
//! - **Credential redaction**: secrets are masked in every recorded command and output
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cdflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("ci")
//!     .stage(Arc::new(CommandStage::new("compile", ["mvn compile"])))?
//!     .tolerant_stage(Arc::new(CommandStage::new("secret-scan", ["gitleaks detect"])))?
//!     .stage(Arc::new(CommandStage::new("test", ["mvn test"])))?
//!     .build()?;
//!
//! let runner = PipelineRunner::new(RunnerConfig::new("."), Arc::new(ShellCommandRunner::default()));
//! let result = runner.run(&pipeline).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod gate;
pub mod observability;
pub mod pipeline;
pub mod process;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::CdflowConfig;
    pub use crate::core::{
        CommandRecord, RunStatus, StageArtifact, StageKind, StageOutput, StageStatus,
    };
    pub use crate::errors::{
        CdflowError, ConfigError, EnvironmentError, GateError, PipelineValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gate::{ChannelGate, GateHandle, GateVerdict, QualityGate};
    pub use crate::pipeline::{
        Credential, FailurePolicy, Pipeline, PipelineBuilder, PipelineResult, PipelineRunner,
        RunnerConfig, StageSpec,
    };
    pub use crate::process::{CommandRunner, Invocation, ShellCommandRunner, ToolLocator};
    pub use crate::stages::{CommandStage, QualityGateStage, Stage, StageContext, StageResult};
    pub use std::sync::Arc;
}
