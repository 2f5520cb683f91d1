//! A thread-safe token bucket rate limiter.
//!
//! ```
//! use std::time::Duration;
//! use rustbucket::TokenBucketOptions;
//!
//! let bucket = TokenBucketOptions::new()
//!     .capacity(12)
//!     .refill(6.0, Duration::from_secs(1))
//!     .build()?;
//!
//! assert!(bucket.try_acquire(5)?);
//! assert!(!bucket.try_acquire(8)?);
//! # Ok::<(), rustbucket::Error>(())
//! ```
mod bucket;
pub mod config;
mod error;
mod interrupt;
pub mod options;

pub use crate::bucket::TokenBucket;
pub use crate::config::TokenBucketConfig;
pub use crate::error::{Error, Result};
pub use crate::interrupt::Interrupt;
pub use crate::options::TokenBucketOptions;
