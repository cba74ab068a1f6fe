//! Reusable async retry policy.
//!
//! One policy type is shared by the recovery strategies, the delivery status
//! confirmation loop and anything else that needs bounded retries, instead
//! of each call site hand-rolling its own loop.
//!
//! The operation runs immediately; after each failed attempt the policy
//! sleeps for [`Backoff::delay_for`] before trying again. Sleeps are
//! cancellable through a [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Upper bound on any single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Always `base`.
    Fixed(Duration),
    /// `base * attempt`.
    Linear(Duration),
    /// `base * 2^(attempt - 1)`.
    Exponential(Duration),
}

impl Backoff {
    /// Delay after the given failed attempt (1-based), capped at [`MAX_BACKOFF`].
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match *self {
            Backoff::Fixed(base) => base,
            Backoff::Linear(base) => base.saturating_mul(attempt),
            Backoff::Exponential(base) => {
                base.saturating_mul(2u32.saturating_pow((attempt - 1).min(20)))
            }
        };
        delay.min(MAX_BACKOFF)
    }
}

/// Bounded retry with a backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Why a retried operation gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The error was classified as not worth retrying.
    #[error("aborted after {attempts} attempts: {last}")]
    Aborted { attempts: u32, last: E },

    /// The cancellation token fired while waiting between attempts.
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// The last error produced by the operation, if any.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Aborted { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }

    pub fn into_last_error(self) -> Option<E> {
        match self {
            RetryError::Exhausted { last, .. } | RetryError::Aborted { last, .. } => Some(last),
            RetryError::Cancelled { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::Aborted { attempts, .. }
            | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Run `op` until it succeeds or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<(T, u32), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_while(cancel, op, |_| true).await
    }

    /// Like [`run`](Self::run) but stops early when `should_retry` says no.
    ///
    /// On success returns the value and the attempt that produced it.
    pub async fn run_while<T, E, F, Fut, P>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        should_retry: P,
    ) -> Result<(T, u32), RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match op(attempt).await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => e,
            };

            if !should_retry(&error) {
                return Err(RetryError::Aborted {
                    attempts: attempt,
                    last: error,
                });
            }
            if attempt >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.backoff.delay_for(attempt);
            tracing::debug!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Attempt failed, backing off"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
