//! Tracking of detached cache writes
//!
//! A cache write runs on its own tokio task so dropping the request that
//! scheduled it does not cancel it. The tracker counts writes in flight so
//! the server can wait for them before it shuts down.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Handle for spawning and awaiting background writes
#[derive(Debug, Clone, Default)]
pub struct BackgroundWrites {
    inner: Arc<Inner>,
}

/// Decrements the in-flight count when the task finishes, panics included
struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

impl BackgroundWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked task
    ///
    /// The count is raised before this returns, so a `wait_idle` that starts
    /// afterwards always observes the task.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
        };
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    /// Number of tasks still running
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no tracked task is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pending = self.in_flight();
            if pending == 0 {
                return;
            }
            debug!("Waiting for {} background writes", pending);
            notified.await;
        }
    }
}
