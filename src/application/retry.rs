//! Bounded exponential backoff with jitter for transient activity failures.

use std::{future::Future, time::Duration};

use tracing::warn;

use crate::application::{error::PipelineError, random::SharedRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Exponential ceiling for the delay after failed attempt `attempt` (1-based).
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Equal jitter: half the ceiling fixed, half drawn uniformly.
    pub fn delay(&self, attempt: u32, rng: &SharedRng) -> Duration {
        let ceiling = self.ceiling(attempt);
        let half = ceiling / 2;
        half + rng.duration_up_to(ceiling - half)
    }

    /// Run `operation` until it succeeds, fails permanently or attempts run out.
    pub async fn run<T, F, Fut>(
        &self,
        op: &'static str,
        rng: &SharedRng,
        mut operation: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay(attempt, rng);
                    warn!(
                        target = "application::retry",
                        op,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error_code = err.code(),
                        error = %err,
                        "Transient failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
