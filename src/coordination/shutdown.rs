//! Graceful Shutdown Handler
//!
//! Latches a shutdown request from the OS (or an operator) and broadcasts it
//! to every job loop. In-flight runs drain to completion; nothing is aborted
//! mid-write.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown coordinator shared across the daemon
pub struct GracefulShutdown {
    requested: AtomicBool,
    signal_tx: watch::Sender<bool>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (signal_tx, _) = watch::channel(false);
        Self {
            requested: AtomicBool::new(false),
            signal_tx,
        }
    }

    /// Get a receiver that flips to true once shutdown is requested
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.signal_tx.subscribe()
    }

    /// Check if shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Request shutdown. Duplicate requests are ignored.
    pub fn request(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate signal");
            return;
        }
        info!("Shutdown requested, draining in-flight jobs");
        let _ = self.signal_tx.send(true);
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Install OS signal handlers that request shutdown
pub async fn install_signal_handlers(shutdown: Arc<GracefulShutdown>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let shutdown_sigterm = shutdown.clone();
        tokio::spawn(async move {
            let mut stream =
                signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
            stream.recv().await;
            info!("Received SIGTERM");
            shutdown_sigterm.request();
        });

        let shutdown_sigint = shutdown.clone();
        tokio::spawn(async move {
            let mut stream =
                signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
            stream.recv().await;
            info!("Received SIGINT");
            shutdown_sigint.request();
        });
    }

    #[cfg(windows)]
    {
        let shutdown_ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            info!("Received Ctrl+C");
            shutdown_ctrl_c.request();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_request_latches() {
        let shutdown = GracefulShutdown::new();
        let rx = shutdown.subscribe();

        assert!(!shutdown.is_requested());
        assert!(!*rx.borrow());

        shutdown.request();
        assert!(shutdown.is_requested());
        assert!(*rx.borrow());

        // Duplicate request is a no-op
        shutdown.request();
        assert!(shutdown.is_requested());
    }

    #[tokio::test]
    async fn test_subscriber_wakes_on_request() {
        let shutdown = Arc::new(GracefulShutdown::new());
        let mut rx = shutdown.subscribe();

        let requester = Arc::clone(&shutdown);
        tokio::spawn(async move {
            requester.request();
        });

        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
