use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;

pub struct ShutdownManager {
    shutdown: AtomicBool,
    active_sessions: AtomicUsize,
    notify: Notify,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            active_sessions: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Resolves once shutdown has been signaled.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutting_down() {
            return;
        }
        notified.await;
    }

    pub fn signal_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::SeqCst) {
            tracing::info!("Shutting down gracefully...");
            self.notify.notify_waiters();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn increment_sessions(&self) {
        self.active_sessions.fetch_add(1, Ordering::SeqCst);
    }

    pub fn decrement_sessions(&self) {
        self.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    pub async fn wait_for_sessions(&self, timeout: Duration) {
        tracing::info!("Waiting for {} active sessions...", self.active_sessions());

        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            if self.active_sessions() == 0 {
                tracing::info!("Server stopped");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::warn!(
            "Forced shutdown after timeout ({} sessions remain)",
            self.active_sessions()
        );
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Signal `manager` on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_on_signal(manager: Arc<ShutdownManager>) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => res?,
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
    }

    manager.signal_shutdown();
    Ok(())
}
