//! Bounded retries for single RPC invocations
//!
//! Backoff delays come from the `backon` exponential builder without jitter,
//! so the wait before each retry never shrinks. The first attempt is never
//! delayed.

use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{CancelSource, Error, Result};

/// Identifies one attempt of one RPC, handed to the transport so it can tag
/// the request for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcInvocationAttempt {
    pub method: &'static str,
    /// Zero for the initial call, incremented per retry
    pub attempt: usize,
}

/// Payloads that may ask to be retried despite a transport-level success
pub trait RetryHint {
    /// The error to retry with, if the payload requests a retry
    fn retry_error(&self) -> Option<Error> {
        None
    }
}

impl RetryHint for () {}

impl RetryHint for serde_json::Value {}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: Option<usize>,
    min_delay: Duration,
    max_delay: Duration,
    factor: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(25),
            factor: 2.0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::default()
            .with_max_attempts(config.max_attempts)
            .with_delays(
                Duration::from_millis(config.min_delay_ms),
                Duration::from_millis(config.max_delay_ms),
            )
            .with_factor(config.factor)
    }
}

impl RetryPolicy {
    /// Cap the number of attempts; `None` retries until success or cancellation
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: Option<usize>) -> Self {
        self.max_attempts = max_attempts.map(|max| max.max(1));
        self
    }

    #[must_use]
    pub fn with_delays(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay.max(min_delay);
        self
    }

    #[must_use]
    pub fn with_factor(mut self, factor: f32) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    /// Delays slept before the second, third, ... attempt
    pub fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(usize::MAX)
            .build()
    }

    /// Invoke `attempt_fn` until it yields a payload without a retry hint.
    ///
    /// Stops early on cancellation (from the transport or `cancel`), on
    /// errors that are not retryable, and once `max_attempts` calls were
    /// made, in which case the last error is returned.
    pub async fn run<T, F, Fut>(
        &self,
        method: &'static str,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<T>
    where
        T: RetryHint,
        F: FnMut(RpcInvocationAttempt) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let delays = std::iter::once(Duration::ZERO).chain(self.backoff());
        let mut last_error = None;

        for (attempt, delay) in delays.enumerate() {
            if self.max_attempts.is_some_and(|max| attempt >= max) {
                break;
            }

            if cancel.is_cancelled() {
                return Err(last_error.unwrap_or(Error::Cancelled(CancelSource::Caller)));
            }

            if delay > Duration::ZERO {
                debug!(method, attempt, ?delay, "Waiting before retry");
                tokio::select! {
                    () = cancel.cancelled() => {
                        return Err(last_error.unwrap_or(Error::Cancelled(CancelSource::Caller)));
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }

            let error = match attempt_fn(RpcInvocationAttempt { method, attempt }).await {
                Ok(payload) => match payload.retry_error() {
                    None => return Ok(payload),
                    Some(error) => error,
                },
                Err(error) => error,
            };

            warn!(method, attempt, error = %error, "RPC attempt failed");

            if error.is_cancellation() || !error.is_retryable() || cancel.is_cancelled() {
                return Err(error);
            }

            last_error = Some(error);
        }

        Err(last_error.unwrap_or(Error::Cancelled(CancelSource::Caller)))
    }
}
