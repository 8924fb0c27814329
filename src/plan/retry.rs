use crate::error::StepError;
use crate::observability::{Observer, ObserverEvent};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bounded exponential backoff shared by steps and health checks.
///
/// The delay before attempt `n + 1` is `min(base * 2^(n-1), max)`, reduced by
/// a random fraction of at most `jitter` so concurrent retries spread out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 15_000,
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter: 0.0,
        }
    }

    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: max_delay_ms.max(base_delay_ms),
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Un-jittered delay after the given (1-based) failed attempt.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let ms = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let fraction = rand::rng().random_range(0.0..=self.jitter.min(1.0));
        base.mul_f64(1.0 - fraction)
    }
}

/// What a retried operation came to.
#[derive(Debug)]
pub struct RetryOutcome<T = String> {
    pub result: Result<T, StepError>,
    pub attempts: u32,
    /// Time spent inside attempts; backoff sleeps are not counted.
    pub elapsed: Duration,
}

/// Run `op` until it succeeds, the policy is exhausted, the error is not
/// retryable, or `cancel` fires. Every attempt is bounded by `timeout`.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    cancel: &CancellationToken,
    observer: &dyn Observer,
    subject: &str,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, StepError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut elapsed = Duration::ZERO;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let started = tokio::time::Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StepError::Cancelled),
            res = tokio::time::timeout(timeout, op(attempt)) => {
                res.unwrap_or(Err(StepError::Timeout { after: timeout }))
            }
        };
        elapsed += started.elapsed();

        let error = match result {
            Ok(output) => {
                return RetryOutcome {
                    result: Ok(output),
                    attempts: attempt,
                    elapsed,
                };
            }
            Err(StepError::Cancelled) => {
                return RetryOutcome {
                    result: Err(StepError::Cancelled),
                    attempts: attempt,
                    elapsed,
                };
            }
            Err(error) => error,
        };

        let delay = (attempt < max_attempts && error.is_retryable()).then(|| policy.delay_for(attempt));
        observer.record_event(&ObserverEvent::StepAttemptFailed {
            subject: subject.to_string(),
            attempt,
            error: error.to_string(),
            retry_in: delay,
        });

        let Some(delay) = delay else {
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
                elapsed,
            };
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return RetryOutcome {
                    result: Err(StepError::Cancelled),
                    attempts: attempt,
                    elapsed,
                };
            }
            () = tokio::time::sleep(delay) => {}
        }
    }
}
