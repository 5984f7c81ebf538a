//! Graceful shutdown handling.

use tokio::{signal, sync::watch};
use tracing::{error, info};

/// Wait for Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        _ = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}

/// Broadcasts a one-shot shutdown to every listener, including ones that subscribe late.
pub struct ShutdownCoordinator {
    notify: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (notify, _) = watch::channel(false);
        Self { notify }
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener(self.notify.subscribe())
    }

    pub fn shutdown(&self) {
        self.notify.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.notify.borrow()
    }

    pub async fn wait_for_signal(&self) {
        shutdown_signal().await;
        self.shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ShutdownListener(watch::Receiver<bool>);

impl ShutdownListener {
    /// Resolves once shutdown has been triggered (or the coordinator is gone).
    pub async fn recv(mut self) {
        let _ = self.0.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn listeners_wake_on_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let listener = coordinator.subscribe();
        let waiter = tokio::spawn(listener.recv());

        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(result.is_ok(), "should receive shutdown signal");
    }

    #[tokio::test]
    async fn late_subscribers_still_see_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.shutdown();
        assert!(coordinator.is_triggered());
        let late = coordinator.subscribe();
        let result = tokio::time::timeout(Duration::from_millis(100), late.recv()).await;
        assert!(result.is_ok());
    }
}
