//! Stage that runs shell command lines in order.

use super::{Stage, StageContext};
use crate::core::{StageArtifact, StageOutput};
use crate::errors::CdflowError;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

/// Runs each command line in order; the first non-zero exit ends the stage.
#[derive(Debug, Clone)]
pub struct CommandStage {
    name: String,
    commands: Vec<String>,
    reports: Vec<PathBuf>,
    tools: Vec<String>,
}

impl CommandStage {
    /// Creates a stage from its command lines.
    pub fn new<I, S>(name: impl Into<String>, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let commands: Vec<String> = commands.into_iter().map(Into::into).collect();
        let tools = leading_programs(&commands);
        Self {
            name: name.into(),
            commands,
            reports: Vec::new(),
            tools,
        }
    }

    /// Declares report files the stage writes into the working directory.
    #[must_use]
    pub fn with_reports<I, P>(mut self, reports: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.reports = reports.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the command lines.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Returns the declared report paths.
    #[must_use]
    pub fn reports(&self) -> &[PathBuf] {
        &self.reports
    }

    fn collect_reports(&self, ctx: &StageContext) -> Vec<StageArtifact> {
        self.reports
            .iter()
            .map(|path| StageArtifact::report(ctx.workspace(), path.clone()))
            .collect()
    }
}

/// First word of each command line, skipping `VAR=value` prefixes.
fn leading_programs(commands: &[String]) -> Vec<String> {
    let mut tools: Vec<String> = Vec::new();
    for command in commands {
        let program = command
            .split_whitespace()
            .find(|word| !word.contains('='))
            .map(str::to_string);
        if let Some(program) = program {
            if !tools.contains(&program) {
                tools.push(program);
            }
        }
    }
    tools
}

#[async_trait]
impl Stage for CommandStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Vec<String> {
        self.commands.clone()
    }

    fn required_tools(&self) -> Vec<String> {
        self.tools.clone()
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        let mut records = Vec::with_capacity(self.commands.len());

        for command in &self.commands {
            match ctx.run_command(command).await {
                Ok(record) => {
                    let succeeded = record.succeeded();
                    let message = match record.exit_code {
                        Some(code) => format!("`{}` exited with status {code}", record.command),
                        None => format!("`{}` was terminated by a signal", record.command),
                    };
                    records.push(record);
                    if !succeeded {
                        warn!(stage = %self.name, "{}", message);
                        return StageOutput::failed(message)
                            .with_commands(records)
                            .with_artifacts(self.collect_reports(ctx));
                    }
                }
                Err(CdflowError::Cancelled(reason)) => {
                    return StageOutput::cancelled(reason).with_commands(records);
                }
                Err(e) => {
                    return StageOutput::errored(ctx.redact(&e.to_string()))
                        .with_commands(records)
                        .with_artifacts(self.collect_reports(ctx));
                }
            }
        }

        StageOutput::passed()
            .with_commands(records)
            .with_artifacts(self.collect_reports(ctx))
    }
}
