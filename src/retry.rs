//! Bounded retry with fixed or exponential delay
//!
//! A [`RetryPolicy`] wraps any fallible async operation. Every failed attempt
//! is reported on stderr; once the attempt budget is spent the caller gets a
//! [`RetryError::Exhausted`], which the CLI treats as fatal.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Delay strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure
    Fixed(Duration),
    /// Delay doubles after every failure, capped at `max`
    Exponential { initial: Duration, max: Duration },
}

/// Backoff kind as written in the configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Retry exhaustion
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{label} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        label: String,
        attempts: u32,
        last_error: String,
    },
}

/// Attempt budget plus delay strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Upper bound for exponential delays
const MAX_EXPONENTIAL_DELAY: Duration = Duration::from_secs(300);

impl RetryPolicy {
    /// Fixed delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Doubling delay starting at `initial`
    pub fn exponential(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                initial,
                max: MAX_EXPONENTIAL_DELAY,
            },
        }
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Build a policy from configuration values
    pub fn from_settings(max_attempts: u32, delay: Duration, kind: BackoffKind) -> Self {
        match kind {
            BackoffKind::Fixed => Self::fixed(max_attempts, delay),
            BackoffKind::Exponential => Self::exponential(max_attempts, delay),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// `op` receives the 1-based attempt number. A budget of zero is
    /// treated as one attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!("{} attempt {} failed: {:#}", label, attempt, e);
                    if max_attempts > 1 {
                        eprintln!("{} failed. Attempt {}/{}", label, attempt, max_attempts);
                    }

                    if attempt >= max_attempts {
                        return Err(RetryError::Exhausted {
                            label: label.to_string(),
                            attempts: attempt,
                            last_error: format!("{:#}", e),
                        });
                    }

                    let delay = self.delay_after(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    /// 30 attempts, 5 seconds apart
    fn default() -> Self {
        Self::fixed(30, Duration::from_secs(5))
    }
}
