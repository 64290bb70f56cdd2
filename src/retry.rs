//! Bounded retry with configurable backoff.
//!
//! Discovery treats transport failures as recoverable and retries them under
//! an explicit policy object; after the attempt ceiling is exhausted the
//! failure surfaces to the caller instead of being silently dropped.

use anyhow::Result;
use log::warn;
use std::future::Future;
use std::time::Duration;

/// Backoff schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    Exponential,
}

/// Explicit retry policy shared by the discovery paths.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // Reference policy: 5 attempts, linear base * attempt
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after a failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX)),
        }
    }

    /// Runs `op` until it succeeds or the attempt ceiling is exhausted.
    ///
    /// The final error is returned to the caller; intermediate failures are
    /// logged with the attempt counter so partial degradation is visible.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(e.context(format!(
                            "{} failed after {} attempts",
                            label, attempt
                        )));
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed, retrying in {:?}. Attempt {}/{}. Error: {}",
                        label, delay, attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
