//! Stage that waits, for a bounded time, on an external quality gate.

use super::{Stage, StageContext};
use crate::core::{StageKind, StageOutput};
use crate::errors::GateError;
use crate::gate::{GateVerdict, QualityGate};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default upper bound on the gate wait.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Waits for a [`QualityGate`] verdict, giving up after `timeout`.
#[derive(Debug, Clone)]
pub struct QualityGateStage {
    name: String,
    gate: Arc<dyn QualityGate>,
    timeout: Duration,
}

impl QualityGateStage {
    /// Creates a gate stage with the default one hour timeout.
    #[must_use]
    pub fn new(name: impl Into<String>, gate: Arc<dyn QualityGate>) -> Self {
        Self {
            name: name.into(),
            gate,
            timeout: DEFAULT_GATE_TIMEOUT,
        }
    }

    /// Sets the wait bound.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the wait bound.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Stage for QualityGateStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::QualityGate
    }

    fn describe(&self) -> Vec<String> {
        vec![format!(
            "wait for quality gate verdict (timeout {}s)",
            self.timeout.as_secs()
        )]
    }

    async fn execute(&self, ctx: &StageContext) -> StageOutput {
        info!(stage = %self.name, timeout_secs = self.timeout.as_secs(), "Waiting for quality gate");

        match tokio::time::timeout(self.timeout, self.gate.wait(ctx.cancellation())).await {
            Ok(Ok(GateVerdict::Passed)) => StageOutput::passed(),
            Ok(Ok(GateVerdict::Failed)) => StageOutput::failed("Quality gate verdict: failed"),
            Ok(Err(GateError::Cancelled)) => StageOutput::cancelled(
                ctx.cancellation()
                    .reason()
                    .unwrap_or_else(|| GateError::Cancelled.to_string()),
            ),
            Ok(Err(e)) => {
                warn!(stage = %self.name, error = %e, "Quality gate produced no verdict");
                StageOutput::failed(ctx.redact(&e.to_string()))
            }
            Err(_) => {
                warn!(stage = %self.name, timeout_secs = self.timeout.as_secs(), "Quality gate timed out");
                StageOutput::timed_out(format!(
                    "No quality gate verdict within {}s",
                    self.timeout.as_secs_f64()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::core::StageStatus;
    use crate::gate::ChannelGate;
    use crate::testing::{ScriptedCommandRunner, ScriptedGate};
    use std::time::Instant;

    fn context() -> StageContext {
        StageContext::new("quality-gate", "/work", Arc::new(ScriptedCommandRunner::new()))
    }

    #[tokio::test]
    async fn test_verdicts_map_to_status() {
        let passed = QualityGateStage::new("quality-gate", Arc::new(ScriptedGate::verdict(GateVerdict::Passed)));
        assert_eq!(passed.execute(&context()).await.status, StageStatus::Passed);

        let failed = QualityGateStage::new("quality-gate", Arc::new(ScriptedGate::verdict(GateVerdict::Failed)));
        let output = failed.execute(&context()).await;
        assert_eq!(output.status, StageStatus::Failed);
        assert_eq!(output.error.as_deref(), Some("Quality gate verdict: failed"));
    }

    #[tokio::test]
    async fn test_returns_within_timeout_when_signal_never_arrives() {
        let (gate, _handle) = ChannelGate::new();
        let stage = QualityGateStage::new("quality-gate", Arc::new(gate))
            .with_timeout(Duration::from_millis(50));

        let start = Instant::now();
        let output = stage.execute(&context()).await;

        assert_eq!(output.status, StageStatus::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_lost_signal_is_failure() {
        let (gate, handle) = ChannelGate::new();
        drop(handle);
        let stage = QualityGateStage::new("quality-gate", Arc::new(gate));

        let output = stage.execute(&context()).await;
        assert_eq!(output.status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_during_wait() {
        let token = Arc::new(CancellationToken::new());
        let ctx = context().with_cancellation(token.clone());
        let stage = QualityGateStage::new("quality-gate", Arc::new(ScriptedGate::never()));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel("operator interrupt");
        });

        let output = stage.execute(&ctx).await;
        canceller.await.unwrap();

        assert_eq!(output.status, StageStatus::Cancelled);
        assert_eq!(output.error.as_deref(), Some("operator interrupt"));
    }

    #[test]
    fn test_default_timeout_is_one_hour() {
        let stage = QualityGateStage::new("quality-gate", Arc::new(ScriptedGate::never()));
        assert_eq!(stage.timeout(), Duration::from_secs(3600));
        assert_eq!(stage.kind(), StageKind::QualityGate);
    }
}
