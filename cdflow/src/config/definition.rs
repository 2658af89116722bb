//! `[[stages]]` entries and their conversion into a pipeline.

use crate::core::StageKind;
use crate::errors::{CdflowError, ConfigError};
use crate::gate::QualityGate;
use crate::pipeline::{FailurePolicy, Pipeline, PipelineBuilder, StageSpec};
use crate::stages::{CommandStage, QualityGateStage, Stage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One stage as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique stage name.
    pub name: String,
    /// Command stage or quality gate wait.
    #[serde(default)]
    pub kind: StageKind,
    /// Shell command lines, run in order.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Keep going if this stage fails.
    #[serde(default)]
    pub continue_on_failure: bool,
    /// Report files the commands write into the workspace.
    #[serde(default)]
    pub reports: Vec<PathBuf>,
    /// Gate wait bound; `runner.gate_timeout_secs` when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl StageDefinition {
    pub(super) fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let field = format!("stages[{index}]");
        match self.kind {
            StageKind::Command if self.commands.is_empty() => Err(ConfigError::invalid(
                field,
                format!("command stage '{}' has no commands", self.name),
            )),
            StageKind::QualityGate if !self.commands.is_empty() => Err(ConfigError::invalid(
                field,
                format!("quality gate stage '{}' cannot run commands", self.name),
            )),
            _ if self.timeout_secs == Some(0) => {
                Err(ConfigError::invalid(field, "timeout_secs must be positive"))
            }
            _ => Ok(()),
        }
    }

    fn to_spec(&self, gate: &Arc<dyn QualityGate>, default_timeout: Duration) -> StageSpec {
        let stage: Arc<dyn Stage> = match self.kind {
            StageKind::Command => Arc::new(
                CommandStage::new(&self.name, self.commands.iter().cloned())
                    .with_reports(self.reports.iter().cloned()),
            ),
            StageKind::QualityGate => Arc::new(
                QualityGateStage::new(&self.name, Arc::clone(gate)).with_timeout(
                    self.timeout_secs
                        .map_or(default_timeout, Duration::from_secs),
                ),
            ),
        };
        StageSpec::new(stage).with_policy(FailurePolicy::from_continue_flag(self.continue_on_failure))
    }
}

/// Builds a pipeline from config entries, in file order.
pub(super) fn build_pipeline(
    name: &str,
    definitions: &[StageDefinition],
    gate: Arc<dyn QualityGate>,
    default_timeout: Duration,
) -> Result<Pipeline, CdflowError> {
    let mut builder = PipelineBuilder::new(name);
    for definition in definitions {
        builder.add_stage_spec(definition.to_spec(&gate, default_timeout))?;
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateVerdict;
    use crate::testing::ScriptedGate;

    fn definition(name: &str, kind: StageKind, commands: &[&str]) -> StageDefinition {
        StageDefinition {
            name: name.to_string(),
            kind,
            commands: commands.iter().map(ToString::to_string).collect(),
            continue_on_failure: false,
            reports: Vec::new(),
            timeout_secs: None,
        }
    }

    #[test]
    fn test_validate() {
        assert!(definition("a", StageKind::Command, &["true"]).validate(0).is_ok());
        assert!(definition("a", StageKind::Command, &[]).validate(0).is_err());
        assert!(definition("g", StageKind::QualityGate, &[]).validate(1).is_ok());
        assert!(definition("g", StageKind::QualityGate, &["x"]).validate(1).is_err());

        let mut zero = definition("g", StageKind::QualityGate, &[]);
        zero.timeout_secs = Some(0);
        assert!(zero.validate(2).unwrap_err().to_string().contains("stages[2]"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let gate: Arc<dyn QualityGate> = Arc::new(ScriptedGate::verdict(GateVerdict::Passed));
        let definitions = vec![
            definition("build", StageKind::Command, &["mvn package"]),
            definition("build", StageKind::Command, &["mvn deploy"]),
        ];

        let err = build_pipeline("ci", &definitions, gate, Duration::from_secs(60)).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_gate_timeout_override() {
        let gate: Arc<dyn QualityGate> = Arc::new(ScriptedGate::verdict(GateVerdict::Passed));
        let mut gate_stage = definition("quality-gate", StageKind::QualityGate, &[]);
        gate_stage.timeout_secs = Some(90);

        let pipeline = build_pipeline("ci", &[gate_stage], gate, Duration::from_secs(3600)).unwrap();

        assert_eq!(
            pipeline.stages()[0].runner.describe(),
            vec!["wait for quality gate verdict (timeout 90s)".to_string()]
        );
    }
}
