//! Cancellation signal for a harvest run
//!
//! The harvester checks the signal between targets and between pages, never
//! in the middle of a response, so a page that is being fetched is always
//! completed and accounted for before the run stops. Sleeps (token
//! exhaustion, transient backoff) wake up early when shutdown is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::info;

use crate::error::{Error, Result};

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Coordinates graceful shutdown across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Notifies all registered waiters exactly once.
    pub fn request_shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        let notified = self.notify.notified();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }
}

/// Sleep for `duration`, returning [`Error::Cancelled`] if shutdown is
/// requested first.
pub async fn sleep_or_cancel(duration: Duration, shutdown: Option<&ShutdownCoordinator>) -> Result<()> {
    let Some(shutdown) = shutdown else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    if shutdown.is_shutdown_requested() {
        return Err(Error::Cancelled);
    }

    tokio::select! {
        () = tokio::time::sleep(duration) => Ok(()),
        () = shutdown.wait_for_shutdown() => Err(Error::Cancelled),
    }
}

/// Request shutdown on the first Ctrl-C.
pub fn install_ctrl_c_handler(shutdown: SharedShutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing the current page before stopping");
            shutdown.request_shutdown();
        }
    });
}
