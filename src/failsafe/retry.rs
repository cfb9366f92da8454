//! Retry logic with exponential backoff

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Retry policy for one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Base unit; the delay before attempt `n + 1` is `2^n` units
    pub backoff_base: Duration,
    /// Upper bound on one delay
    pub max_backoff: Duration,
    /// Multiplier applied to the delay after a rate-limit response
    pub rate_limit_multiplier: u32,
    /// Whether timeouts count as retryable
    pub retry_on_timeout: bool,
}

impl RetryPolicy {
    /// Create from config
    #[must_use]
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.retries.saturating_add(1),
            backoff_base: config.backoff_base,
            max_backoff: config.max_backoff,
            rate_limit_multiplier: config.rate_limit_backoff_multiplier.max(1),
            retry_on_timeout: config.retry_on_timeout,
        }
    }

    /// Same policy with a per-request retry count
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.max_attempts = retries.saturating_add(1);
        self
    }

    /// Delay schedule: `2 × base`, `4 × base`, `8 × base`, ... capped at `max_backoff`
    #[must_use]
    pub fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.backoff_base.saturating_mul(2))
            .with_factor(2.0)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
            .build()
    }

    /// Delay before retrying after `error`, given the scheduled delay.
    ///
    /// Rate-limit responses wait `rate_limit_multiplier` times longer and at
    /// least the server's `retry_after`. Returns `None` when the server asks
    /// for a longer pause than `max_backoff` allows.
    #[must_use]
    pub fn delay_for(&self, scheduled: Duration, error: &FetchError) -> Option<Duration> {
        match error {
            FetchError::RateLimited { retry_after } => {
                let hint = retry_after.unwrap_or_default();
                if hint > self.max_backoff {
                    return None;
                }
                Some(
                    scheduled
                        .saturating_mul(self.rate_limit_multiplier)
                        .min(self.max_backoff)
                        .max(hint),
                )
            }
            _ => Some(scheduled),
        }
    }
}

/// Execute `f` with retry logic.
///
/// Each attempt receives a child of `token`; cancelling `token` stops the loop
/// during an attempt or a backoff sleep.
///
/// # Errors
///
/// Returns the last error from `f` if all attempts are exhausted or the error
/// is not retryable, and [`FetchError::Cancelled`] once `token` is cancelled.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    name: &str,
    token: &CancellationToken,
    mut f: F,
) -> Result<T, FetchError>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut backoff = policy.create_backoff();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => return Err(FetchError::Cancelled),
            outcome = f(token.child_token()) => outcome,
        };

        let e = match outcome {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !e.is_retryable(policy.retry_on_timeout) {
            return Err(e);
        }

        if attempts >= policy.max_attempts {
            debug!(operation = name, attempts, "Max retry attempts reached");
            return Err(e);
        }

        let Some(delay) = backoff.next().and_then(|d| policy.delay_for(d, &e)) else {
            return Err(e);
        };

        debug!(
            operation = name,
            attempt = attempts,
            delay_ms = delay.as_millis(),
            error = %e,
            "Retrying after backoff"
        );
        telemetry_metrics::counter!("devcredit_fetch_retries_total", "reason" => e.kind())
            .increment(1);

        tokio::select! {
            () = token.cancelled() => return Err(FetchError::Cancelled),
            () = sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy::new(&FetchConfig {
            retries,
            backoff_base: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            ..FetchConfig::default()
        })
    }

    #[test]
    fn test_schedule_doubles() {
        let delays: Vec<Duration> = policy(3).create_backoff().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800)
            ]
        );
    }

    #[test]
    fn test_rate_limited_waits_longer() {
        let p = policy(3);
        let base = Duration::from_millis(200);
        let limited = FetchError::RateLimited { retry_after: None };
        assert_eq!(p.delay_for(base, &limited), Some(Duration::from_millis(800)));

        let hinted = FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(p.delay_for(base, &hinted), Some(Duration::from_secs(3)));

        let too_long = FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(3600)),
        };
        assert_eq!(p.delay_for(base, &too_long), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let token = CancellationToken::new();
        let started = Instant::now();

        let result = with_retry(&policy(3), "test", &token, |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Network("reset".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(600) && waited < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_not_retried() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<(), _> = with_retry(&policy(3), "test", &token, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::validation("bad shape")) }
        })
        .await;

        assert!(matches!(result, Err(FetchError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let result: Result<(), _> = with_retry(&policy(2), "test", &token, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Network("down".into())) }
        })
        .await;

        assert_eq!(result, Err(FetchError::Network("down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let result: Result<(), _> = with_retry(&policy(3), "test", &token, |_| async {
            Err(FetchError::Network("down".into()))
        })
        .await;

        assert_eq!(result, Err(FetchError::Cancelled));
    }
}
