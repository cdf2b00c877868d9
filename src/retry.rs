//! Attempt-bounded retry with configurable backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Delay schedule between attempts.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// Delay grows by the step after each failed attempt (`step * n`).
    Linear(Duration),
}

impl Backoff {
    /// Delay slept after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => delay,
            Self::Linear(step) => step.saturating_mul(attempt),
        }
    }
}

/// Retry policy applied uniformly to whole operation sequences.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Creates a policy. A `max_attempts` of zero behaves like one.
    #[must_use]
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Policy used for instance and elastic IP deletion: three attempts with a
    /// delay growing by five seconds.
    #[must_use]
    pub const fn deletion() -> Self {
        Self::new(3, Backoff::Linear(Duration::from_secs(5)))
    }

    /// Policy used for node trust configuration: three attempts ten seconds
    /// apart.
    #[must_use]
    pub const fn node_configuration() -> Self {
        Self::new(3, Backoff::Fixed(Duration::from_secs(10)))
    }

    /// Total attempts, at least one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Runs `operation` until it succeeds or the attempts are exhausted,
    /// returning the last error. `operation` receives the 1-based attempt
    /// number.
    ///
    /// # Errors
    ///
    /// Returns the error of the final attempt.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let attempts = self.max_attempts();
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        target_label = label,
                        attempt,
                        attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
