//! Pipeline builder with validation.

use super::{FailurePolicy, Pipeline, StageSpec};
use crate::errors::PipelineValidationError;
use crate::stages::Stage;
use std::collections::HashSet;
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// The stage specifications, in execution order.
    stages: Vec<StageSpec>,
    /// Names already taken.
    names: HashSet<String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Appends a stage that aborts the run on failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn stage(self, runner: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        self.stage_with_policy(runner, FailurePolicy::Abort)
    }

    /// Appends a stage whose failure lets the run continue.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn tolerant_stage(self, runner: Arc<dyn Stage>) -> Result<Self, PipelineValidationError> {
        self.stage_with_policy(runner, FailurePolicy::Continue)
    }

    /// Appends a stage with an explicit failure policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is invalid or its name is taken.
    pub fn stage_with_policy(
        mut self,
        runner: Arc<dyn Stage>,
        policy: FailurePolicy,
    ) -> Result<Self, PipelineValidationError> {
        self.add_stage_spec(StageSpec::new(runner).with_policy(policy))?;
        Ok(self)
    }

    /// Adds a stage with a specification.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn add_stage_spec(&mut self, spec: StageSpec) -> Result<(), PipelineValidationError> {
        spec.validate()?;

        if !self.names.insert(spec.name.clone()) {
            return Err(PipelineValidationError::new(format!(
                "Duplicate stage name '{}'",
                spec.name
            ))
            .with_stages(vec![spec.name]));
        }

        self.stages.push(spec);
        Ok(())
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the builder has no stages.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name cannot be empty"));
        }
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages"));
        }

        Ok(Pipeline {
            name: self.name,
            stages: self.stages,
        })
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::CommandStage;

    fn stage(name: &str) -> Arc<dyn Stage> {
        Arc::new(CommandStage::new(name, [format!("echo {name}")]))
    }

    #[test]
    fn test_builder_preserves_order() {
        let pipeline = PipelineBuilder::new("ci")
            .stage(stage("checkout"))
            .unwrap()
            .tolerant_stage(stage("secret-scan"))
            .unwrap()
            .stage(stage("compile"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pipeline.name(), "ci");
        assert_eq!(pipeline.stage_names(), vec!["checkout", "secret-scan", "compile"]);
        assert!(pipeline.stages()[1].policy.is_tolerant());
        assert!(!pipeline.stages()[2].policy.is_tolerant());
    }

    #[test]
    fn test_duplicate_stage_name() {
        let err = PipelineBuilder::new("ci")
            .stage(stage("build"))
            .unwrap()
            .stage(stage("build"))
            .unwrap_err();

        assert_eq!(err.message, "Duplicate stage name 'build'");
        assert_eq!(err.stages, vec!["build".to_string()]);
    }

    #[test]
    fn test_empty_pipeline() {
        let err = PipelineBuilder::new("ci").build().unwrap_err();
        assert_eq!(err.message, "Pipeline has no stages");
    }

    #[test]
    fn test_blank_pipeline_name() {
        let err = PipelineBuilder::new(" ")
            .stage(stage("build"))
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.message.contains("name"));
    }

    #[test]
    fn test_stage_count() {
        let builder = PipelineBuilder::new("ci").stage(stage("a")).unwrap();
        assert_eq!(builder.stage_count(), 1);
        assert_eq!(builder.name(), "ci");
    }
}
