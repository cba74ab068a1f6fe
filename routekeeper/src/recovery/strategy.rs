//! Per-class retry budgets.

use std::time::Duration;

use super::classify::{ApiFailure, ErrorClass};
use crate::retry::{Backoff, RetryPolicy};

/// Retry budget for one class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyRecord {
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Double the delay after each failed attempt instead of keeping it fixed.
    pub exponential: bool,
}

impl StrategyRecord {
    const fn new(max_retries: u32, base_delay_ms: u64, exponential: bool) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
            exponential,
        }
    }

    pub const fn for_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::Network => Self::new(3, 1000, true),
            ErrorClass::Location => Self::new(2, 2000, false),
            ErrorClass::Api(ApiFailure::Auth)
            | ErrorClass::Api(ApiFailure::RateLimit)
            | ErrorClass::Api(ApiFailure::Generic) => Self::new(3, 1000, true),
            ErrorClass::DataCorruption => Self::new(1, 0, false),
            ErrorClass::Map => Self::new(2, 500, false),
            ErrorClass::Sync => Self::new(3, 2000, true),
            ErrorClass::Unknown => Self::new(1, 1000, false),
        }
    }

    pub fn backoff(&self) -> Backoff {
        if self.exponential {
            Backoff::Exponential(self.base_delay)
        } else {
            Backoff::Fixed(self.base_delay)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.backoff())
    }
}
