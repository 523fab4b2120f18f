use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Running = 0,
    Closing = 1,
    Closed = 2,
}

/// Lifecycle flag shared by a bridge and its poll task.
///
/// Only one caller ever wins the Running -> Closing transition, which is
/// what makes close idempotent.
pub(crate) struct Lifecycle {
    phase: AtomicU8,
    notify: Notify,
    closed: Notify,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Running as u8),
            notify: Notify::new(),
            closed: Notify::new(),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        match self.phase.load(Ordering::SeqCst) {
            0 => Phase::Running,
            1 => Phase::Closing,
            _ => Phase::Closed,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Move to Closing. Returns `false` if someone else already did.
    pub(crate) fn begin_close(&self) -> bool {
        let won = self
            .phase
            .compare_exchange(
                Phase::Running as u8,
                Phase::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    pub(crate) fn finish_close(&self) {
        self.phase.store(Phase::Closed as u8, Ordering::SeqCst);
        self.closed.notify_waiters();
    }

    /// Resolves once the bridge has left Running.
    pub(crate) async fn closing(&self) {
        // Register before checking the flag: notify_waiters() only wakes
        // futures that are already enabled.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_running() {
            return;
        }
        notified.await;
    }

    /// Resolves once the session has been fully released.
    pub(crate) async fn closed(&self) {
        let notified = self.closed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.phase() == Phase::Closed {
            return;
        }
        notified.await;
    }
}
