use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Default timeout for waiting for a dispatcher to shut down gracefully
pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Cancellation handle for one dispatcher. A fresh pair is created on every
/// `start`; the facade keeps the controller, the dispatcher the receiver.
pub(crate) struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    /// Create a controller and the receiver its dispatcher waits on
    pub fn new() -> (Self, ShutdownReceiver) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownReceiver { rx })
    }

    /// Tell the dispatcher to stop claiming work
    pub fn signal_shutdown(&self) {
        debug!("signalling dispatcher shutdown");
        let _ = self.tx.send(true);
    }
}

/// Receiver side, held by the dispatcher. Once signalled it stays
/// signalled, so every later wait resolves immediately.
pub(crate) struct ShutdownReceiver {
    rx: watch::Receiver<bool>,
}

impl ShutdownReceiver {
    /// Resolve once shutdown has been signalled. A dropped controller
    /// counts as shutdown; the actor that owned it is gone.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_reaches_receiver() {
        let (controller, mut receiver) = ShutdownController::new();
        controller.signal_shutdown();
        tokio::time::timeout(Duration::from_secs(1), receiver.wait_for_shutdown())
            .await
            .expect("signal should resolve the wait");
    }

    #[tokio::test]
    async fn test_wait_resolves_repeatedly_after_signal() {
        let (controller, mut receiver) = ShutdownController::new();
        controller.signal_shutdown();
        receiver.wait_for_shutdown().await;
        // The dispatcher re-checks the signal from several wait points
        tokio::time::timeout(Duration::from_secs(1), receiver.wait_for_shutdown())
            .await
            .expect("signalled state must be sticky");
    }

    #[tokio::test]
    async fn test_dropped_controller_counts_as_shutdown() {
        let (controller, mut receiver) = ShutdownController::new();
        drop(controller);
        tokio::time::timeout(Duration::from_secs(1), receiver.wait_for_shutdown())
            .await
            .expect("dropped controller should resolve the wait");
    }
}
