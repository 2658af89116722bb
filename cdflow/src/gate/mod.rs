//! Quality gate capability.
//!
//! A gate is an external pass/fail verdict that arrives asynchronously. The
//! gate itself only knows how to obtain the verdict; bounding the wait is
//! the job of [`crate::stages::QualityGateStage`].

mod channel;
#[cfg(feature = "sonarqube")]
mod sonarqube;

pub use channel::{ChannelGate, GateHandle};
#[cfg(feature = "sonarqube")]
pub use sonarqube::{SonarQubeGate, SonarQubeSettings, SCANNER_REPORT_TASK};

use crate::cancellation::CancellationToken;
use crate::errors::GateError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// The verdict delivered by an external quality gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    /// The analysis met the gate conditions.
    Passed,
    /// The analysis did not meet the gate conditions.
    Failed,
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Source of a quality-gate verdict.
#[async_trait]
pub trait QualityGate: Send + Sync + Debug {
    /// Waits until the verdict is available.
    ///
    /// Implementations may wait indefinitely; callers bound the wait. They
    /// must return [`GateError::Cancelled`] promptly once `cancel` fires.
    async fn wait(&self, cancel: &CancellationToken) -> Result<GateVerdict, GateError>;
}
