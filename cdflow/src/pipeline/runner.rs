//! Sequential pipeline runner.
//!
//! Stages run one at a time, in declaration order, on the calling task. After
//! each stage the stage's [`FailurePolicy`](super::FailurePolicy) decides
//! whether the run goes on. Once the run halts, every remaining stage is
//! recorded as skipped.

use super::{
    error_type_for, FailureCollector, FailureRecord, Pipeline, PipelineResult, StageDisposition,
    StageSpec,
};
use crate::cancellation::CancellationToken;
use crate::core::RunStatus;
use crate::errors::EnvironmentError;
use crate::events::{
    EventSink, LoggingEventSink, PIPELINE_ABORTED, PIPELINE_COMPLETED, PIPELINE_STARTED,
    STAGE_COMPLETED, STAGE_FAILED, STAGE_SKIPPED, STAGE_STARTED, STAGE_TOLERATED,
};
use crate::observability::SpanTimer;
use crate::process::{CommandRunner, PathLocator, Redactor, ToolLocator};
use crate::stages::{StageContext, StageResult};
use chrono::Utc;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A named secret handed to every stage as an environment variable.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Environment variable name.
    pub name: String,
    /// Resolved value; `None` if it was not set.
    pub value: Option<String>,
}

impl Credential {
    /// Creates a credential.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Reads the credential from the process environment.
    #[must_use]
    pub fn from_env(name: impl Into<String>) -> Self {
        let name = name.into();
        let value = std::env::var(&name).ok();
        Self { name, value }
    }

    fn present_value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("set", &self.present_value().is_some())
            .finish()
    }
}

/// Explicit execution environment of a run.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Working directory shared by every stage.
    pub workspace: PathBuf,
    /// Plain environment variables for every command.
    pub env: Vec<(String, String)>,
    /// Required secrets; exported to commands and masked in all output.
    pub credentials: Vec<Credential>,
    /// Tools that must be on `PATH` before the run starts.
    pub required_tools: Vec<String>,
}

impl RunnerConfig {
    /// Creates a config for `workspace` with nothing else required.
    #[must_use]
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Self::default()
        }
    }

    /// Adds a plain environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Adds a required credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Adds required tools.
    #[must_use]
    pub fn with_required_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Builds the redactor for this run's credentials.
    #[must_use]
    pub fn redactor(&self) -> Redactor {
        Redactor::new(self.credentials.iter().filter_map(Credential::present_value))
    }

    fn stage_env(&self) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        env.extend(self.credentials.iter().filter_map(|c| {
            c.present_value().map(|v| (c.name.clone(), v.to_string()))
        }));
        env
    }
}

/// Runs pipelines against an explicit environment.
pub struct PipelineRunner {
    config: RunnerConfig,
    commands: Arc<dyn CommandRunner>,
    locator: Arc<dyn ToolLocator>,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("config", &self.config)
            .field("commands", &self.commands)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    /// Creates a runner that looks tools up on `PATH` and logs events.
    #[must_use]
    pub fn new(config: RunnerConfig, commands: Arc<dyn CommandRunner>) -> Self {
        Self {
            config,
            commands,
            locator: Arc::new(PathLocator::new()),
            events: Arc::new(LoggingEventSink::debug()),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the tool locator used by preflight.
    #[must_use]
    pub fn with_locator(mut self, locator: Arc<dyn ToolLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Sets the cancellation token the operator can trigger.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the runner configuration.
    #[must_use]
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Lists everything wrong with the environment.
    #[must_use]
    pub fn environment_problems(&self) -> Vec<EnvironmentError> {
        let mut problems = Vec::new();

        if !self.config.workspace.is_dir() {
            problems.push(EnvironmentError::Workspace {
                path: self.config.workspace.clone(),
            });
        }

        for tool in &self.config.required_tools {
            match self.locator.locate(tool) {
                Some(path) => debug!(%tool, path = %path.display(), "Found tool"),
                None => problems.push(EnvironmentError::missing_tool(tool)),
            }
        }

        for credential in &self.config.credentials {
            if credential.present_value().is_none() {
                problems.push(EnvironmentError::missing_credential(&credential.name));
            }
        }

        problems
    }

    /// Checks the environment before any stage runs.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn preflight(&self) -> Result<(), EnvironmentError> {
        match self.environment_problems().into_iter().next() {
            Some(problem) => Err(problem),
            None => Ok(()),
        }
    }

    /// Runs every stage of `pipeline` in order and reports what happened.
    ///
    /// Never returns an error: environment problems, stage failures and
    /// cancellation all end up in the returned [`PipelineResult`].
    pub async fn run(&self, pipeline: &Pipeline) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", pipeline = %pipeline.name(), %run_id);
        self.run_inner(pipeline, run_id).instrument(span).await
    }

    async fn run_inner(&self, pipeline: &Pipeline, run_id: Uuid) -> PipelineResult {
        let timer = SpanTimer::start(pipeline.name());
        let started_at = Utc::now();

        info!(stages = pipeline.stage_count(), "Pipeline started");
        self.events.emit(
            PIPELINE_STARTED,
            Some(json!({
                "pipeline": pipeline.name(),
                "run_id": run_id,
                "stages": pipeline.stage_names(),
            })),
        );

        let mut failures = FailureCollector::new();
        let mut stages = Vec::with_capacity(pipeline.stage_count());
        let mut halt: Option<(RunStatus, String)> = None;

        if let Err(problem) = self.preflight() {
            error!(error = %problem, "Preflight failed");
            failures.record(
                FailureRecord::new("preflight", problem.to_string()).with_error_type("environment"),
            );
            halt = Some((RunStatus::Aborted, format!("preflight failed: {problem}")));
        }

        let env = Arc::new(self.config.stage_env());
        let redactor = Arc::new(self.config.redactor());

        for (index, spec) in pipeline.stages().iter().enumerate() {
            if halt.is_none() {
                if let Some(reason) = self.cancel.reason() {
                    halt = Some((RunStatus::Aborted, format!("cancelled: {reason}")));
                }
            }

            if let Some((_, reason)) = &halt {
                debug!(stage = %spec.name, %reason, "Skipping stage");
                self.events.emit(
                    STAGE_SKIPPED,
                    Some(json!({ "stage": spec.name, "index": index, "reason": reason })),
                );
                stages.push(StageResult::skipped(&spec.name, index, spec.kind(), reason.clone()));
                continue;
            }

            let stage_span = info_span!("stage", stage = %spec.name, index);
            let result = self
                .execute_stage(spec, index, &env, &redactor)
                .instrument(stage_span.clone())
                .await;

            let (result, outcome) =
                stage_span.in_scope(|| self.settle(spec, result, &mut failures));
            if let Some(outcome) = outcome {
                halt = Some(outcome);
            }
            stages.push(result);
        }

        let (status, halt_reason) = match halt {
            Some((status, reason)) => (status, Some(reason)),
            None => (RunStatus::Succeeded, None),
        };

        let result = PipelineResult {
            run_id,
            pipeline: pipeline.name().to_string(),
            status,
            started_at,
            ended_at: Utc::now(),
            duration_ms: timer.finish(),
            stages,
            failures: failures.into_failures(),
            halt_reason,
        };

        if status == RunStatus::Aborted {
            warn!("{}", result.summary());
            self.events.emit(
                PIPELINE_ABORTED,
                Some(json!({
                    "pipeline": result.pipeline,
                    "run_id": run_id,
                    "reason": result.halt_reason,
                    "duration_ms": result.duration_ms,
                })),
            );
        } else {
            info!("{}", result.summary());
            self.events.emit(
                PIPELINE_COMPLETED,
                Some(json!({
                    "pipeline": result.pipeline,
                    "run_id": run_id,
                    "status": status,
                    "duration_ms": result.duration_ms,
                })),
            );
        }

        result
    }

    async fn execute_stage(
        &self,
        spec: &StageSpec,
        index: usize,
        env: &Arc<Vec<(String, String)>>,
        redactor: &Arc<Redactor>,
    ) -> StageResult {
        info!(kind = %spec.kind(), "Stage started");
        self.events.emit(
            STAGE_STARTED,
            Some(json!({ "stage": spec.name, "index": index, "kind": spec.kind() })),
        );

        let ctx = StageContext::new(&spec.name, &self.config.workspace, Arc::clone(&self.commands))
            .with_env(Arc::clone(env))
            .with_redactor(Arc::clone(redactor))
            .with_cancellation(Arc::clone(&self.cancel));

        let started_at = Utc::now();
        let timer = SpanTimer::start(&spec.name);
        let output = spec.runner.execute(&ctx).await;

        StageResult::executed(&spec.name, index, spec.kind(), started_at, timer.finish(), output)
    }

    /// Applies the stage's failure policy. Returns the halt outcome, if any.
    fn settle(
        &self,
        spec: &StageSpec,
        result: StageResult,
        failures: &mut FailureCollector,
    ) -> (StageResult, Option<(RunStatus, String)>) {
        let disposition = spec.policy.disposition(result.status);

        if disposition == StageDisposition::Proceed {
            info!(duration_ms = result.duration_ms, "Stage passed");
            self.events.emit(
                STAGE_COMPLETED,
                Some(json!({ "stage": spec.name, "duration_ms": result.duration_ms })),
            );
            return (result, None);
        }

        let error = result
            .error
            .clone()
            .unwrap_or_else(|| format!("stage {}", result.status));
        let exit_code = result.commands.last().and_then(|c| c.exit_code);
        let record = FailureRecord::new(&spec.name, &error)
            .with_error_type(error_type_for(result.status))
            .with_exit_code(exit_code);
        let payload = json!({
            "stage": spec.name,
            "status": result.status,
            "error": error,
            "exit_code": exit_code,
            "duration_ms": result.duration_ms,
        });

        match disposition {
            StageDisposition::Tolerate => {
                warn!(status = %result.status, %error, "Stage failed; continuing");
                failures.record(record.tolerated());
                self.events.emit(STAGE_TOLERATED, Some(payload));
                (result.tolerated(), None)
            }
            StageDisposition::Proceed | StageDisposition::Fail | StageDisposition::Abort => {
                let status = if disposition == StageDisposition::Fail {
                    RunStatus::Failed
                } else {
                    RunStatus::Aborted
                };
                error!(stage_status = %result.status, %error, run_status = %status, "Stage halted pipeline");
                failures.record(record);
                self.events.emit(STAGE_FAILED, Some(payload));
                let reason = format!("stage '{}' {}", spec.name, result.status);
                (result, Some((status, reason)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockToolLocator;
    use crate::testing::ScriptedCommandRunner;
    use std::path::Path;

    fn runner(config: RunnerConfig, locator: MockToolLocator) -> PipelineRunner {
        PipelineRunner::new(config, Arc::new(ScriptedCommandRunner::new()))
            .with_locator(Arc::new(locator))
    }

    #[test]
    fn test_credential_debug_hides_value() {
        let credential = Credential::new("KUBE_TOKEN", Some("s3cr3t".to_string()));
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("KUBE_TOKEN"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_stage_env_includes_credentials() {
        let config = RunnerConfig::new("/work")
            .with_env("MAVEN_OPTS", "-Xmx1g")
            .with_credential(Credential::new("SONAR_TOKEN", Some("squ_1".to_string())))
            .with_credential(Credential::new("UNSET", None));

        assert_eq!(
            config.stage_env(),
            vec![
                ("MAVEN_OPTS".to_string(), "-Xmx1g".to_string()),
                ("SONAR_TOKEN".to_string(), "squ_1".to_string()),
            ]
        );
        assert_eq!(config.redactor().redact("token squ_1"), "token ****");
    }

    #[test]
    fn test_environment_problems_lists_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut locator = MockToolLocator::new();
        locator
            .expect_locate()
            .returning(|tool| (tool == "git").then(|| Path::new("/usr/bin/git").to_path_buf()));

        let config = RunnerConfig::new(dir.path())
            .with_required_tools(["git", "trivy"])
            .with_credential(Credential::new("KUBE_TOKEN", Some(String::new())));
        let runner = runner(config, locator);

        assert_eq!(
            runner.environment_problems(),
            vec![
                EnvironmentError::missing_tool("trivy"),
                EnvironmentError::missing_credential("KUBE_TOKEN"),
            ]
        );
        assert_eq!(runner.preflight(), Err(EnvironmentError::missing_tool("trivy")));
    }

    #[test]
    fn test_missing_workspace() {
        let locator = MockToolLocator::new();
        let runner = runner(RunnerConfig::new("/definitely/not/here"), locator);

        assert!(matches!(
            runner.preflight(),
            Err(EnvironmentError::Workspace { .. })
        ));
    }
}
