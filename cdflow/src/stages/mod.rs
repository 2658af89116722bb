//! Stage trait, execution context and the two stage kinds.
//!
//! Stages are the units of work in a pipeline. A stage never decides whether
//! the run continues; it only reports what happened. The runner applies the
//! stage's failure policy.

mod command;
mod gate;
mod result;

pub use command::CommandStage;
pub use gate::{QualityGateStage, DEFAULT_GATE_TIMEOUT};
pub use result::StageResult;

use crate::cancellation::CancellationToken;
use crate::core::{CommandRecord, StageKind, StageOutput};
use crate::errors::CdflowError;
use crate::process::{CommandRunner, Invocation, Redactor};
use async_trait::async_trait;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the kind of stage.
    fn kind(&self) -> StageKind {
        StageKind::Command
    }

    /// Human-readable lines describing what the stage will do.
    fn describe(&self) -> Vec<String>;

    /// External tools the stage invokes, used for preflight checks.
    fn required_tools(&self) -> Vec<String> {
        Vec::new()
    }

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The stage execution context
    ///
    /// # Returns
    ///
    /// The stage output: passed, failed, timed out, errored or cancelled.
    async fn execute(&self, ctx: &StageContext) -> StageOutput;
}

/// Everything a stage may use while it runs.
///
/// Built by the runner for each stage from the run's explicit configuration.
#[derive(Debug, Clone)]
pub struct StageContext {
    stage_name: String,
    workspace: PathBuf,
    env: Arc<Vec<(String, String)>>,
    runner: Arc<dyn CommandRunner>,
    redactor: Arc<Redactor>,
    cancel: Arc<CancellationToken>,
}

impl StageContext {
    /// Creates a context with no extra environment and no redaction.
    #[must_use]
    pub fn new(
        stage_name: impl Into<String>,
        workspace: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            stage_name: stage_name.into(),
            workspace: workspace.into(),
            env: Arc::new(Vec::new()),
            runner,
            redactor: Arc::new(Redactor::default()),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the environment passed to every command.
    #[must_use]
    pub fn with_env(mut self, env: Arc<Vec<(String, String)>>) -> Self {
        self.env = env;
        self
    }

    /// Sets the credential redactor.
    #[must_use]
    pub fn with_redactor(mut self, redactor: Arc<Redactor>) -> Self {
        self.redactor = redactor;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the shared working directory.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Masks credentials in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        self.redactor.redact(text).into_owned()
    }

    /// Runs one command line to completion and records it.
    ///
    /// Returns [`CdflowError::Cancelled`] if the operator interrupts the
    /// command; the child process is killed in that case.
    pub async fn run_command(&self, command: &str) -> Result<CommandRecord, CdflowError> {
        if let Some(reason) = self.cancel.reason() {
            return Err(CdflowError::Cancelled(reason));
        }

        let shown = self.redact(command);
        info!(stage = %self.stage_name, command = %shown, "Running command");

        let invocation = Invocation::new(command, &self.workspace).with_env(self.env.iter().cloned());

        let output = tokio::select! {
            output = self.runner.run(&invocation) => output.map_err(|e| match e {
                CdflowError::Spawn { source, .. } => CdflowError::spawn(shown.clone(), source),
                other => other,
            })?,
            () = self.cancel.cancelled() => {
                let reason = self.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                return Err(CdflowError::Cancelled(reason));
            }
        };

        debug!(
            stage = %self.stage_name,
            exit_code = ?output.exit_code,
            "Command exited"
        );

        Ok(CommandRecord {
            command: shown,
            exit_code: output.exit_code,
            stdout: self.redact(&output.stdout),
            stderr: self.redact(&output.stderr),
            duration_ms: output.duration.as_secs_f64() * 1000.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCommandRunner;

    #[tokio::test]
    async fn test_run_command_records_and_redacts() {
        let runner = Arc::new(
            ScriptedCommandRunner::new().respond("docker login", 0, "Login with hunter2 ok", ""),
        );
        let ctx = StageContext::new("docker-push", "/work", runner.clone())
            .with_redactor(Arc::new(Redactor::new(["hunter2"])))
            .with_env(Arc::new(vec![("DOCKER_PASSWORD".to_string(), "hunter2".to_string())]));

        let record = ctx.run_command("docker login -p hunter2").await.unwrap();

        assert_eq!(record.command, "docker login -p ****");
        assert_eq!(record.stdout, "Login with **** ok");
        assert_eq!(record.exit_code, Some(0));

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].command, "docker login -p hunter2");
        assert_eq!(invocations[0].working_dir, PathBuf::from("/work"));
        assert_eq!(invocations[0].env[0].0, "DOCKER_PASSWORD");
    }

    #[tokio::test]
    async fn test_run_command_after_cancel() {
        let runner = Arc::new(ScriptedCommandRunner::new());
        let token = Arc::new(CancellationToken::new());
        token.cancel("interrupted");
        let ctx = StageContext::new("compile", "/work", runner.clone()).with_cancellation(token);

        let err = ctx.run_command("mvn compile").await.unwrap_err();

        assert!(matches!(err, CdflowError::Cancelled(reason) if reason == "interrupted"));
        assert!(runner.invocations().is_empty());
    }
}
