//! External cancellation for blocked acquisitions.
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::trace;
use tokio::sync::Notify;

/// Handle that aborts waits in [`TokenBucket::acquire_blocking_with`] and
/// [`TokenBucket::acquire_with`].
///
/// Clones share the same flag, so one clone can be handed to the waiting
/// side and another kept by whoever decides to cancel. Once interrupted the
/// handle stays interrupted.
///
/// [`TokenBucket::acquire_blocking_with`]: crate::TokenBucket::acquire_blocking_with
/// [`TokenBucket::acquire_with`]: crate::TokenBucket::acquire_with
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    interrupted: Mutex<bool>,
    cvar: Condvar,
    notify: Notify,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every thread and task waiting on this handle.
    pub fn interrupt(&self) {
        let mut interrupted = self
            .inner
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *interrupted = true;
        self.inner.cvar.notify_all();
        self.inner.notify.notify_waiters();
        trace!("Interrupt raised");
    }

    pub fn is_interrupted(&self) -> bool {
        *self
            .inner
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block the current thread for `timeout`.
    /// Returns `true` if the handle was interrupted before or during the wait.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut interrupted = self
            .inner
            .interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Condvar wakes up spuriously, keep waiting until the deadline.
        while !*interrupted {
            interrupted = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.inner
                        .cvar
                        .wait_timeout(interrupted, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .inner
                    .cvar
                    .wait(interrupted)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        true
    }

    /// Suspend the current task for `timeout`.
    /// Returns `true` if the handle was interrupted before or during the wait.
    pub(crate) async fn sleep(&self, timeout: Duration) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent `interrupt` is not missed.
        notified.as_mut().enable();
        if self.is_interrupted() {
            return true;
        }
        tokio::select! {
            _ = notified => true,
            _ = tokio::time::sleep(timeout) => self.is_interrupted(),
        }
    }
}
