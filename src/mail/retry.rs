//! Bounded retry with a fixed delay.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, never below 1.
    pub max_attempts: u32,
    /// Sleep between a retryable failure and the next attempt.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt, no sleep.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Why [`retry_when`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// A failure the predicate refused to retry.
    Aborted { attempt: u32, error: E },
    /// Every attempt failed; `error` is the last one.
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Aborted { attempt, .. } => *attempt,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn into_error(self) -> E {
        match self {
            Self::Aborted { error, .. } | Self::Exhausted { error, .. } => error,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. The delay is slept only between
/// attempts, never after the last one.
pub async fn retry_when<T, E, P, Op, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    is_retryable: P,
    mut op: Op,
) -> Result<T, RetryError<E>>
where
    E: Display,
    P: Fn(&E) -> bool,
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::debug!("{} succeeded on attempt {}", op_name, attempt);
                }
                return Ok(value);
            }
            Err(error) => {
                log::warn!(
                    "{} failed (attempt {}/{}): {}",
                    op_name,
                    attempt,
                    max_attempts,
                    error
                );

                if !is_retryable(&error) {
                    return Err(RetryError::Aborted { attempt, error });
                }
                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        error,
                    });
                }

                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
