//! Pipeline and stage specifications.

use super::FailurePolicy;
use crate::core::StageKind;
use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use std::sync::Arc;

/// A stage together with its failure policy.
#[derive(Debug, Clone)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<dyn Stage>,
    /// What a failure of this stage means for the run.
    pub policy: FailurePolicy,
}

impl StageSpec {
    /// Creates a stage specification that aborts the run on failure.
    #[must_use]
    pub fn new(runner: Arc<dyn Stage>) -> Self {
        Self {
            name: runner.name().to_string(),
            runner,
            policy: FailurePolicy::Abort,
        }
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Lets the run continue past this stage's failure.
    #[must_use]
    pub fn continue_on_failure(self) -> Self {
        self.with_policy(FailurePolicy::Continue)
    }

    /// Returns the stage kind.
    #[must_use]
    pub fn kind(&self) -> StageKind {
        self.runner.kind()
    }

    /// Validates the stage specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the stage has nothing to do.
    pub fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }
        if self.runner.describe().is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' has no commands",
                self.name
            ))
            .with_stages(vec![self.name.clone()]));
        }
        Ok(())
    }
}

/// An ordered, validated list of stages.
///
/// Built by [`super::PipelineBuilder`]; immutable afterwards.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub(super) name: String,
    pub(super) stages: Vec<StageSpec>,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stages in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Tools invoked by any stage, in first-use order.
    #[must_use]
    pub fn tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        for tool in self.stages.iter().flat_map(|s| s.runner.required_tools()) {
            if !tools.contains(&tool) {
                tools.push(tool);
            }
        }
        tools
    }
}
