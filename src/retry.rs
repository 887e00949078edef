//! Retry with exponential backoff.
//!
//! Used for ESPN requests and for the initial Postgres / Redis connections.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub multiplier: u32,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    /// Five attempts, 1s, 5s, 25s, 60s between them.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_secs(1),
            multiplier: 5,
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Policy for service connections at startup (2s, 4s, 8s, ...).
    pub fn connection(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::from_secs(2),
            multiplier: 2,
            max_backoff: Duration::from_secs(60),
        }
    }

    /// Sleep before the retry that follows failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |backoff| backoff.min(self.max_backoff))
    }
}

/// Error from the final attempt plus the number of attempts made.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `op` until it succeeds, `is_retriable` rejects the error, or the
/// policy's attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    what: &str,
    is_retriable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && is_retriable(&e) => {
                let backoff = policy.backoff(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    what, attempt, max_attempts, e, backoff
                );
                tokio::time::sleep(backoff).await;
            }
            Err(error) => {
                return Err(RetryError {
                    attempts: attempt,
                    error,
                })
            }
        }
    }
}
