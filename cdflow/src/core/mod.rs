//! Core domain model types for cdflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage, stage kind and run status enums
//! - Stage output with the record of every command it ran
//! - Report artifacts

mod artifact;
mod output;
mod status;

pub use artifact::StageArtifact;
pub use output::{CommandRecord, StageOutput};
pub use status::{RunStatus, StageKind, StageStatus};
