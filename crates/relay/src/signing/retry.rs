use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Wait before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
/// Longest wait between two attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
const DEFAULT_FACTOR: f64 = 1.5;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Exponential backoff with an explicit attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    /// Multiplier applied to the wait after every failed attempt.
    pub factor: f64,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            factor: DEFAULT_FACTOR,
            max_backoff: DEFAULT_MAX_BACKOFF,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_backoff: Duration, max_attempts: u32) -> Self {
        Self {
            initial_backoff,
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Wait after failed attempt `attempt` (1-based), never above `max_backoff`.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scale = self.factor.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(self.initial_backoff.as_secs_f64() * scale)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BackoffError<E> {
    /// The token fired before an attempt completed.
    Cancelled,
    /// A terminal failure, or the last failure once attempts ran out.
    Failed { attempts: u32, last: E },
}

/// Runs `op` until it succeeds, `should_retry` rejects a failure, the policy
/// runs out of attempts, or `cancel` fires.
pub async fn with_backoff<T, E, Op, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: Op,
    should_retry: P,
) -> Result<T, BackoffError<E>>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackoffError::Cancelled),
            result = op() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if attempt >= max_attempts || !should_retry(&err) {
            return Err(BackoffError::Failed { attempts: attempt, last: err });
        }

        let delay = policy.delay(attempt);
        debug!(attempt, max_attempts, ?delay, "attempt failed, backing off");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackoffError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
