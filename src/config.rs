use std::{path::Path, time::Duration};

use log::error;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Token bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TokenBucketConfig {
    /// id labels the bucket in log output.
    /// A random uuid is assigned when the bucket is built if not provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// capacity is the maximum number of tokens the bucket can hold.
    /// The bucket starts full.
    /// Minimum: 1
    pub capacity: u64,

    /// refill_tokens is the number of tokens added every `refill_period`.
    /// Fractional values are allowed.
    /// Must be positive and finite.
    pub refill_tokens: f64,

    /// refill_period is the interval over which `refill_tokens` accrue.
    /// Must be non-zero.
    pub refill_period: Duration,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            id: None,
            capacity: 10,
            refill_tokens: 5.0,
            refill_period: Duration::from_secs(1),
        }
    }
}

impl TokenBucketConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(invalid("capacity must be > 0".to_string()));
        }

        if !self.refill_tokens.is_finite() || self.refill_tokens <= 0.0 {
            return Err(invalid(format!(
                "refill_tokens must be a finite number > 0, got {}",
                self.refill_tokens
            )));
        }

        if self.refill_period.is_zero() {
            return Err(invalid("refill_period must be > 0".to_string()));
        }

        Ok(())
    }

    /// Parse a configuration from JSON, e.g.
    /// `{"capacity": 12, "refill_tokens": 6.0, "refill_period": {"secs": 1, "nanos": 0}}`.
    /// Missing fields fall back to their defaults.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            error!("Fail to read config {}: {e}", path.as_ref().display());
            e
        })?;
        Self::from_json(&bytes)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self).map_err(|e| Error::Encode(e.to_string()))
    }
}

fn invalid(msg: String) -> Error {
    error!("{msg}");
    Error::InvalidConfiguration(msg)
}
