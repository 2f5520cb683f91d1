pub mod sync;
pub mod tokio;

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, error, trace, warn};

use crate::config::TokenBucketConfig;
use crate::{Error, Result};

/// Refills worth less than this many periods are skipped so that calls
/// landing in the same instant do not move `last_refill`.
const MIN_REFILL_PERIODS: f64 = 1e-9;

/// Lower bound of a single sleep while waiting for tokens.
pub(crate) const MIN_SLEEP: Duration = Duration::from_millis(1);

/// A thread-safe token bucket.
///
/// The bucket starts full and gains `refill_tokens` every `refill_period`,
/// never exceeding `capacity`. There is no timer behind it: tokens are
/// recomputed from the elapsed monotonic time whenever the bucket is touched.
///
/// Share it between threads with `Arc<TokenBucket>` (or a plain reference in
/// scoped threads). Waiters are not queued, so whichever caller next finds
/// enough tokens wins regardless of arrival order.
pub struct TokenBucket {
    id: String,
    capacity: u64,
    refill_tokens: f64,
    refill_period: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug, Clone, Copy)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, now: Instant, capacity: u64, refill_tokens: f64, refill_period: Duration) {
        // saturates to zero if `now` is not after `last_refill`
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }

        let periods = elapsed.as_secs_f64() / refill_period.as_secs_f64();
        if periods < MIN_REFILL_PERIODS {
            return;
        }

        self.tokens = (self.tokens + periods * refill_tokens).min(capacity as f64);
        self.last_refill = now;
    }

    fn take(&mut self, permits: u64) -> bool {
        let permits = permits as f64;
        if self.tokens >= permits {
            self.tokens -= permits;
            true
        } else {
            false
        }
    }
}

impl TokenBucket {
    pub fn new(config: &TokenBucketConfig) -> Result<Self> {
        config.validate()?;

        let id = config
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let bucket = Self {
            id,
            capacity: config.capacity,
            refill_tokens: config.refill_tokens,
            refill_period: config.refill_period,
            state: Mutex::new(BucketState {
                tokens: config.capacity as f64,
                last_refill: Instant::now(),
            }),
        };
        debug!("Created {bucket} with id {}", bucket.id);
        Ok(bucket)
    }

    /// Take `permits` tokens if they are available right now.
    ///
    /// Returns `Ok(false)` and leaves the tokens untouched otherwise.
    /// Requests above `capacity` can never succeed and always return `Ok(false)`.
    pub fn try_acquire(&self, permits: u64) -> Result<bool> {
        check_permits(permits)?;
        Ok(self.try_acquire_at(permits, Instant::now()))
    }

    /// Tokens available right now, refill included.
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_tokens(&self) -> f64 {
        self.refill_tokens
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn try_acquire_at(&self, permits: u64, now: Instant) -> bool {
        let mut state = self.lock();
        self.refill(&mut state, now);
        let granted = state.take(permits);
        trace!(
            "[{}] {} {permits} permits, {:.3} tokens left",
            self.id,
            if granted { "granted" } else { "denied" },
            state.tokens
        );
        granted
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        state.refill(now, self.capacity, self.refill_tokens, self.refill_period);
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        // Nothing inside the critical section panics half way through an
        // update, so the state behind a poisoned lock is still consistent.
        self.state.lock().unwrap_or_else(|e: PoisonError<_>| {
            warn!("[{}] recovering poisoned bucket lock", self.id);
            e.into_inner()
        })
    }

    /// How long a waiter sleeps before retrying.
    fn sleep_quantum(&self, remaining: Duration) -> Duration {
        remaining.min(self.refill_period / 2).max(MIN_SLEEP)
    }
}

impl fmt::Display for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TokenBucket{{capacity={}, refill_tokens={}, refill_period={:?}}}",
            self.capacity, self.refill_tokens, self.refill_period
        )
    }
}

/// Shows the state as of the last refill; no refill is run for printing.
impl fmt::Debug for TokenBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBucket")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("refill_tokens", &self.refill_tokens)
            .field("refill_period", &self.refill_period)
            .field("state", &*self.lock())
            .finish()
    }
}

fn check_permits(permits: u64) -> Result<()> {
    if permits == 0 {
        let msg = "permits must be > 0".to_string();
        error!("{msg}");
        return Err(Error::InvalidArgument(msg));
    }
    Ok(())
}

/// Absolute deadline of a wait, `None` if `timeout` overflows the clock.
fn deadline_after(start: Instant, timeout: Duration) -> Option<Instant> {
    start.checked_add(timeout)
}

/// Time left before `deadline`, zero once it passed.
fn remaining(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn bucket(capacity: u64, refill_tokens: f64, refill_period: Duration) -> TokenBucket {
        let _ = env_logger::builder().is_test(true).try_init();
        TokenBucket::new(&TokenBucketConfig {
            id: Some("test".to_string()),
            capacity,
            refill_tokens,
            refill_period,
        })
        .unwrap()
    }

    fn state(bucket: &TokenBucket) -> BucketState {
        *bucket.lock()
    }

    #[test]
    fn test_starts_full() {
        let bucket = bucket(12, 6.0, Duration::from_secs(1));
        assert_eq!(bucket.capacity(), 12);
        assert_eq!(state(&bucket).tokens, 12.0);
    }

    #[test]
    fn test_refill_proportional_to_elapsed() {
        let bucket = bucket(10, 4.0, Duration::from_secs(1));
        let t0 = state(&bucket).last_refill;

        assert!(bucket.try_acquire_at(10, t0));
        assert_eq!(state(&bucket).tokens, 0.0);

        // a quarter period adds a quarter of the refill amount
        assert!(!bucket.try_acquire_at(2, t0 + Duration::from_millis(250)));
        let s = state(&bucket);
        assert!((s.tokens - 1.0).abs() < 1e-9);
        assert_eq!(s.last_refill, t0 + Duration::from_millis(250));

        assert!(bucket.try_acquire_at(2, t0 + Duration::from_millis(500)));
        assert!(state(&bucket).tokens.abs() < 1e-9);
    }

    #[test]
    fn test_refill_saturates_at_capacity() {
        let bucket = bucket(12, 6.0, Duration::from_secs(1));
        let t0 = state(&bucket).last_refill;
        assert!(bucket.try_acquire_at(5, t0));
        assert_eq!(state(&bucket).tokens, 7.0);

        assert!(!bucket.try_acquire_at(13, t0 + Duration::from_secs(1)));
        assert_eq!(state(&bucket).tokens, 12.0);

        assert!(!bucket.try_acquire_at(13, t0 + Duration::from_secs(3600)));
        assert_eq!(state(&bucket).tokens, 12.0);
    }

    #[test]
    fn test_refill_ignores_time_going_backwards() {
        let bucket = bucket(4, 1.0, Duration::from_secs(1));
        let t0 = state(&bucket).last_refill;
        assert!(bucket.try_acquire_at(4, t0 + Duration::from_secs(1)));
        let before = state(&bucket);

        assert!(!bucket.try_acquire_at(1, t0));
        let after = state(&bucket);
        assert_eq!(after.tokens, before.tokens);
        assert_eq!(after.last_refill, before.last_refill);
    }

    #[test]
    fn test_negligible_refill_keeps_timestamp() {
        // one nanosecond is 1e-12 of an hour-long period, below the threshold
        let bucket = bucket(4, 1.0, Duration::from_secs(3600));
        let t0 = state(&bucket).last_refill;
        assert!(bucket.try_acquire_at(4, t0));
        assert!(!bucket.try_acquire_at(1, t0 + Duration::from_nanos(1)));
        let s = state(&bucket);
        assert_eq!(s.last_refill, t0);
        assert_eq!(s.tokens, 0.0);
    }

    #[test]
    fn test_failed_acquire_still_refills() {
        let bucket = bucket(10, 1.0, Duration::from_secs(1));
        let t0 = state(&bucket).last_refill;
        assert!(bucket.try_acquire_at(10, t0));
        assert!(!bucket.try_acquire_at(5, t0 + Duration::from_secs(2)));
        let s = state(&bucket);
        assert_eq!(s.last_refill, t0 + Duration::from_secs(2));
        assert!((s.tokens - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_tokens_stay_within_bounds() {
        let bucket = bucket(5, 0.7, Duration::from_millis(100));
        let t0 = state(&bucket).last_refill;
        for step in 0..500u64 {
            let now = t0 + Duration::from_millis(step * 7);
            bucket.try_acquire_at(1 + step % 3, now);
            let tokens = state(&bucket).tokens;
            assert!((0.0..=5.0).contains(&tokens), "tokens out of range: {tokens}");
        }
    }

    #[test]
    fn test_zero_permits_rejected() {
        let bucket = bucket(5, 1.0, Duration::from_secs(1));
        assert!(matches!(
            bucket.try_acquire(0),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(state(&bucket).tokens, 5.0);
    }

    #[test]
    fn test_more_than_capacity_never_granted() {
        let bucket = bucket(5, 1.0, Duration::from_secs(1));
        assert!(!bucket.try_acquire(6).unwrap());
        assert_eq!(bucket.available_tokens(), 5.0);
    }

    #[test]
    fn test_sleep_quantum() {
        let bucket = bucket(1, 1.0, Duration::from_secs(1));
        assert_eq!(
            bucket.sleep_quantum(Duration::from_secs(5)),
            Duration::from_millis(500)
        );
        assert_eq!(
            bucket.sleep_quantum(Duration::from_millis(30)),
            Duration::from_millis(30)
        );
        assert_eq!(bucket.sleep_quantum(Duration::from_micros(10)), MIN_SLEEP);

        let fast = self::bucket(1, 1.0, Duration::from_micros(100));
        assert_eq!(fast.sleep_quantum(Duration::from_secs(1)), MIN_SLEEP);
    }

    #[test]
    fn test_display() {
        let bucket = bucket(12, 6.0, Duration::from_secs(1));
        assert_eq!(
            bucket.to_string(),
            "TokenBucket{capacity=12, refill_tokens=6, refill_period=1s}"
        );
    }

    #[test]
    fn test_deadline_overflow_is_unbounded() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::MAX), None);
        assert_eq!(remaining(None), Duration::MAX);
        assert_eq!(remaining(Some(now)), Duration::ZERO);
    }
}
