//! Retry policy for transient failures
//!
//! A [`RetryPolicy`] runs an operation until it succeeds, the attempt budget
//! is spent, or shutdown is requested. Shutdown interrupts both the backoff
//! wait and an attempt still in flight; the interrupted attempt is dropped.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed(Duration),
    /// `initial * 2^(failures - 1)`, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

/// Why [`RetryPolicy::run`] gave up
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Shutdown was requested during an attempt or while waiting to retry
    ///
    /// `last_error` is `None` when the first attempt was interrupted.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled {
        attempts: u32,
        last_error: Option<E>,
    },

    /// Every allowed attempt failed
    #[error("gave up after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Cancelled { attempts, .. } | RetryError::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Backoff,
    /// `None` retries until cancelled
    max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    /// Unbounded retries every 3 seconds
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

impl RetryPolicy {
    /// Unbounded retries with a constant delay
    pub fn fixed(delay: Duration) -> Self {
        Self {
            backoff: Backoff::Fixed(delay),
            max_attempts: None,
        }
    }

    /// Unbounded retries with a doubling delay capped at `max`
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential { initial, max },
            max_attempts: None,
        }
    }

    /// Limit the total number of attempts (at least one)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Delay to wait after the `failures`-th consecutive failure
    pub fn delay_for(&self, failures: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = failures.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }

    /// Run `operation` until it succeeds or the policy gives up
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(
        &self,
        shutdown: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        let mut previous: Option<E> = None;
        loop {
            attempt += 1;
            // An attempt that completes without suspending wins over a pending cancel
            let outcome = tokio::select! {
                biased;
                outcome = operation(attempt) => outcome,
                _ = shutdown.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt, last_error: previous });
                }
            };
            let last_error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if self.max_attempts.is_some_and(|max| attempt >= max) {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last_error,
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "Attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last_error: Some(last_error),
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
            previous = Some(last_error);
        }
    }
}
