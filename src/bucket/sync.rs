//! Blocking acquisition for OS threads
use std::time::{Duration, Instant};

use log::{debug, trace};

use super::{check_permits, deadline_after, remaining, TokenBucket};
use crate::interrupt::Interrupt;
use crate::{Error, Result};

impl TokenBucket {
    /// Take `permits` tokens, blocking the current thread for up to `timeout`.
    ///
    /// Returns `Ok(false)` if the deadline passes first, in which case no
    /// tokens were taken. The lock is released while sleeping, so other
    /// callers are never held up by a waiter.
    pub fn acquire_blocking(&self, permits: u64, timeout: Duration) -> Result<bool> {
        self.wait_blocking(permits, timeout, None)
    }

    /// Like [`acquire_blocking`](Self::acquire_blocking), but a wait is cut
    /// short with [`Error::Cancelled`] once `interrupt` is raised.
    ///
    /// Tokens already available are granted and a spent deadline still
    /// returns `Ok(false)`; only having to sleep on a raised handle cancels.
    pub fn acquire_blocking_with(
        &self,
        permits: u64,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> Result<bool> {
        self.wait_blocking(permits, timeout, Some(interrupt))
    }

    fn wait_blocking(
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
                    if interrupt.wait_timeout(quantum) {
                        return Err(self.cancelled());
                    }
                }
                None => std::thread::sleep(quantum),
            }
        }
    }

    pub(super) fn cancelled(&self) -> Error {
        debug!("[{}] acquisition cancelled", self.id);
        Error::Cancelled
    }
}
