use std::time::Duration;

use crate::config::TokenBucketConfig;
use crate::{Result, TokenBucket};

/// Builder for [`TokenBucket`].
///
/// Starts from the defaults of [`TokenBucketConfig`] (10 tokens, refilled
/// at 5 tokens per second). Parameters are only checked by `validate` and
/// `build`, so setters never fail.
#[derive(Debug, Clone, Default)]
pub struct TokenBucketOptions {
    config: TokenBucketConfig,
}

impl TokenBucketOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: TokenBucketConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TokenBucketConfig {
        &self.config
    }

    pub fn validate(self) -> Result<Self> {
        self.config.validate()?;
        Ok(self)
    }

    pub fn build(&self) -> Result<TokenBucket> {
        TokenBucket::new(&self.config)
    }

    /// Label used in log output.
    /// If not set, the bucket is given a random one.
    pub fn id<S: AsRef<str>>(mut self, id: S) -> Self {
        self.config.id = Some(id.as_ref().into());
        self
    }

    /// Maximum number of tokens held by the bucket
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Add `tokens` every `period`.
    /// e.g. `refill(6.0, Duration::from_secs(1))` is six tokens per second.
    pub fn refill(mut self, tokens: f64, period: Duration) -> Self {
        self.config.refill_tokens = tokens;
        self.config.refill_period = period;
        self
    }
}
