//! Gate whose verdict is pushed in by another task.

use super::{GateVerdict, QualityGate};
use crate::cancellation::CancellationToken;
use crate::errors::GateError;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

/// A gate fed through a [`GateHandle`].
///
/// Suits webhook-style delivery: whatever receives the analysis callback
/// holds the handle and delivers the verdict once. The gate can be waited on
/// a single time.
#[derive(Debug)]
pub struct ChannelGate {
    receiver: Mutex<Option<oneshot::Receiver<GateVerdict>>>,
}

/// Sending half of a [`ChannelGate`].
#[derive(Debug)]
pub struct GateHandle {
    sender: oneshot::Sender<GateVerdict>,
}

impl ChannelGate {
    /// Creates a gate and the handle that resolves it.
    #[must_use]
    pub fn new() -> (Self, GateHandle) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                receiver: Mutex::new(Some(receiver)),
            },
            GateHandle { sender },
        )
    }
}

impl GateHandle {
    /// Delivers the verdict. Returns false if nobody is waiting any more.
    pub fn deliver(self, verdict: GateVerdict) -> bool {
        debug!(%verdict, "Delivering quality gate verdict");
        self.sender.send(verdict).is_ok()
    }
}

#[async_trait]
impl QualityGate for ChannelGate {
    async fn wait(&self, cancel: &CancellationToken) -> Result<GateVerdict, GateError> {
        let receiver = self.receiver.lock().take().ok_or(GateError::SignalLost)?;

        tokio::select! {
            verdict = receiver => verdict.map_err(|_| GateError::SignalLost),
            () = cancel.cancelled() => Err(GateError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_delivered_verdict() {
        let (gate, handle) = ChannelGate::new();
        let gate = Arc::new(gate);
        let token = Arc::new(CancellationToken::new());

        let waiter = {
            let gate = gate.clone();
            let token = token.clone();
            tokio::spawn(async move { gate.wait(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.deliver(GateVerdict::Failed));

        assert_eq!(waiter.await.unwrap(), Ok(GateVerdict::Failed));
    }

    #[tokio::test]
    async fn test_verdict_delivered_before_wait() {
        let (gate, handle) = ChannelGate::new();
        handle.deliver(GateVerdict::Passed);

        let token = CancellationToken::new();
        assert_eq!(gate.wait(&token).await, Ok(GateVerdict::Passed));
    }

    #[tokio::test]
    async fn test_dropped_handle_is_signal_lost() {
        let (gate, handle) = ChannelGate::new();
        drop(handle);

        let token = CancellationToken::new();
        assert_eq!(gate.wait(&token).await, Err(GateError::SignalLost));
    }

    #[tokio::test]
    async fn test_second_wait_is_signal_lost() {
        let (gate, handle) = ChannelGate::new();
        handle.deliver(GateVerdict::Passed);

        let token = CancellationToken::new();
        assert!(gate.wait(&token).await.is_ok());
        assert_eq!(gate.wait(&token).await, Err(GateError::SignalLost));
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_wait() {
        let (gate, _handle) = ChannelGate::new();
        let token = CancellationToken::new();
        token.cancel("operator");

        assert_eq!(gate.wait(&token).await, Err(GateError::Cancelled));
    }
}
