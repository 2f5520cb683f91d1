//! Tokio acquisition
use std::time::{Duration, Instant};

use log::trace;

use super::{check_permits, deadline_after, remaining, TokenBucket};
use crate::interrupt::Interrupt;
use crate::Result;

impl TokenBucket {
    /// Async counterpart of [`acquire_blocking`](Self::acquire_blocking).
    ///
    /// Suspends the task instead of the thread. Dropping the future abandons
    /// the wait; a pending wait never holds tokens, so nothing is lost.
    pub async fn acquire(&self, permits: u64, timeout: Duration) -> Result<bool> {
        self.wait_async(permits, timeout, None).await
    }

    /// Async counterpart of [`acquire_blocking_with`](Self::acquire_blocking_with).
    pub async fn acquire_with(
        &self,
        permits: u64,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<bool> {
        self.wait_async(permits, timeout, Some(interrupt)).await
    }

    async fn wait_async(
        &self,
        permits: u64,
        timeout: Duration,
        interrupt: Option<&Interrupt>,
    ) -> Result<bool> {
        check_permits(permits)?;
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            if self.try_acquire_at(permits, Instant::now()) {
                return Ok(true);
            }

            let remaining = remaining(deadline);
            if remaining.is_zero() {
                trace!("[{}] timed out waiting for {permits} permits", self.id);
                return Ok(false);
            }

            let quantum = self.sleep_quantum(remaining);
            trace!("[{}] waiting {quantum:?} for {permits} permits", self.id);
            match interrupt {
                Some(interrupt) => {
                    if interrupt.sleep(quantum).await {
                        return Err(self.cancelled());
                    }
                }
                None => tokio::time::sleep(quantum).await,
            }
        }
    }
}
