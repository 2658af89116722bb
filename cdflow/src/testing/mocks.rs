//! Scripted command runner and gate.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::cancellation::CancellationToken;
use crate::errors::{CdflowError, GateError};
use crate::gate::{GateVerdict, QualityGate};
use crate::process::{CommandOutput, CommandRunner, Invocation};

#[derive(Debug, Clone)]
enum Behavior {
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },
    SpawnError,
    Hang,
}

/// When a scripted command started and finished.
#[derive(Debug, Clone)]
pub struct CommandSpan {
    /// The command line as invoked.
    pub command: String,
    /// When the runner received it.
    pub started: Instant,
    /// When the runner returned.
    pub finished: Instant,
}

/// A [`CommandRunner`] that answers from a script instead of spawning.
///
/// Rules match on command prefix; the first matching rule wins. Commands
/// with no matching rule exit 0 with empty output.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    rules: Vec<(String, Behavior)>,
    delay: Duration,
    invocations: Mutex<Vec<Invocation>>,
    timeline: Mutex<Vec<CommandSpan>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedCommandRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` exit with `exit_code` and the given output.
    #[must_use]
    pub fn respond(
        mut self,
        prefix: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        self.rules.push((
            prefix.into(),
            Behavior::Exit {
                code: exit_code,
                stdout: stdout.into(),
                stderr: stderr.into(),
            },
        ));
        self
    }

    /// Commands starting with `prefix` fail to spawn.
    #[must_use]
    pub fn fail_spawn(mut self, prefix: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), Behavior::SpawnError));
        self
    }

    /// Commands starting with `prefix` never finish.
    #[must_use]
    pub fn hang(mut self, prefix: impl Into<String>) -> Self {
        self.rules.push((prefix.into(), Behavior::Hang));
        self
    }

    /// Every command takes at least `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns every invocation received, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Returns the command lines received, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(|i| i.command.clone())
            .collect()
    }

    /// Returns start/finish times of completed commands.
    #[must_use]
    pub fn timeline(&self) -> Vec<CommandSpan> {
        self.timeline.lock().clone()
    }

    /// Highest number of commands that were in flight at once.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, command: &str) -> Behavior {
        self.rules
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map_or_else(
                || Behavior::Exit {
                    code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                },
                |(_, behavior)| behavior.clone(),
            )
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, CdflowError> {
        self.invocations.lock().push(invocation.clone());
        let started = Instant::now();

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let output = match self.behavior_for(&invocation.command) {
            Behavior::Exit {
                code,
                stdout,
                stderr,
            } => CommandOutput {
                exit_code: Some(code),
                stdout,
                stderr,
                duration: started.elapsed(),
            },
            Behavior::SpawnError => {
                return Err(CdflowError::spawn(
                    invocation.command.clone(),
                    std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
                ));
            }
            Behavior::Hang => std::future::pending::<CommandOutput>().await,
        };

        self.timeline.lock().push(CommandSpan {
            command: invocation.command.clone(),
            started,
            finished: Instant::now(),
        });
        Ok(output)
    }
}

#[derive(Debug, Clone)]
enum GateScript {
    Verdict(GateVerdict),
    Error(GateError),
    Never,
}

/// A [`QualityGate`] with a fixed answer. Can be waited on any number of times.
#[derive(Debug)]
pub struct ScriptedGate {
    script: GateScript,
    waits: AtomicUsize,
}

impl ScriptedGate {
    fn with_script(script: GateScript) -> Self {
        Self {
            script,
            waits: AtomicUsize::new(0),
        }
    }

    /// Delivers `verdict` immediately.
    #[must_use]
    pub fn verdict(verdict: GateVerdict) -> Self {
        Self::with_script(GateScript::Verdict(verdict))
    }

    /// Fails with `error` immediately.
    #[must_use]
    pub fn error(error: GateError) -> Self {
        Self::with_script(GateScript::Error(error))
    }

    /// Never delivers; returns only when cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self::with_script(GateScript::Never)
    }

    /// Number of times the gate was waited on.
    #[must_use]
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QualityGate for ScriptedGate {
    async fn wait(&self, cancel: &CancellationToken) -> Result<GateVerdict, GateError> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            GateScript::Verdict(verdict) => Ok(*verdict),
            GateScript::Error(error) => Err(error.clone()),
            GateScript::Never => {
                cancel.cancelled().await;
                Err(GateError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_runner_rules() {
        let runner = ScriptedCommandRunner::new()
            .respond("mvn test", 1, "", "Tests run: 3, Failures: 1")
            .fail_spawn("trivy");

        let ok = runner.run(&Invocation::new("mvn compile", "/w")).await.unwrap();
        assert!(ok.success());

        let failed = runner.run(&Invocation::new("mvn test -q", "/w")).await.unwrap();
        assert_eq!(failed.exit_code, Some(1));
        assert_eq!(failed.stderr, "Tests run: 3, Failures: 1");

        let err = runner.run(&Invocation::new("trivy fs .", "/w")).await.unwrap_err();
        assert_eq!(err.kind(), "spawn");

        assert_eq!(runner.commands(), vec!["mvn compile", "mvn test -q", "trivy fs ."]);
        assert_eq!(runner.timeline().len(), 2);
        assert_eq!(runner.max_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_scripted_gate_never_until_cancelled() {
        let gate = ScriptedGate::never();
        let token = CancellationToken::new();
        token.cancel("stop");

        assert_eq!(gate.wait(&token).await, Err(GateError::Cancelled));
        assert_eq!(gate.waits(), 1);
    }
}
