//! One-shot deferred refresh trigger.
//!
//! Two states: `Armed` (a timer task is pending) and `Idle`.  Arming
//! replaces any pending timer instead of stacking, so at most one timer is
//! ever live.  When the timer fires it runs a full refresh sweep through
//! the coordinator, which re-arms it — the cycle continues until the
//! coordinator is dropped.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tokio::time::sleep;

use crate::coordinator::Coordinator;

pub struct RefreshScheduler {
    interval: Duration,
    pending: Mutex<Option<AbortHandle>>,
}

impl RefreshScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: Mutex::new(None),
        }
    }

    /// Schedule one refresh sweep `interval` from now.  A previously pending
    /// timer is cancelled first.
    ///
    /// The timer task holds only a weak coordinator handle; dropping the
    /// coordinator lets the timer fire into nothing and die.
    pub(crate) async fn arm(&self, coordinator: Weak<Coordinator>) {
        let interval = self.interval;
        let task = tokio::spawn(async move {
            sleep(interval).await;
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.on_refresh_fired().await;
            }
        });

        let mut pending = self.pending.lock().await;
        if let Some(previous) = pending.replace(task.abort_handle()) {
            previous.abort();
        }
    }

    /// The pending timer has fired; back to `Idle` until the sweep re-arms.
    pub(crate) async fn fired(&self) {
        self.pending.lock().await.take();
    }

    pub async fn is_armed(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Cancel the pending timer, if any.
    pub async fn disarm(&self) {
        if let Some(previous) = self.pending.lock().await.take() {
            previous.abort();
        }
    }
}
