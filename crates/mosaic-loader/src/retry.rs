//! Retry policies for bundle imports.

use std::future::Future;
use std::time::Duration;

use mosaic_core::RetrySettings;
use tracing::debug;

use crate::module::LoadError;

/// Backoff strategy between retry attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// No delay between retries.
    None,
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff with base and max.
    Exponential {
        /// Initial delay.
        base: Duration,
        /// Maximum delay.
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Calculate delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fixed(d) => *d,
            Self::Exponential { base, max } => {
                let multiplier = 2u64.saturating_pow(attempt);
                let delay = Duration::from_millis((base.as_millis() as u64).saturating_mul(multiplier));
                std::cmp::min(delay, *max)
            }
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(2000),
        }
    }
}

/// Retry policy for imports.
///
/// Only transient failures ([`LoadError::is_transient`]) are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_attempts: u32,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: BackoffStrategy::default(),
        }
    }

    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            backoff: BackoffStrategy::None,
        }
    }

    /// Build from registry settings.
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.attempts).with_backoff(BackoffStrategy::Exponential {
            base: Duration::from_millis(settings.base_delay_ms),
            max: Duration::from_millis(settings.max_delay_ms),
        })
    }

    /// Set backoff strategy.
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Check if an error on the given (0-indexed) attempt should be retried.
    pub fn should_retry(&self, error: &LoadError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }

    /// Run `op` until it succeeds, fails permanently or runs out of retries.
    pub async fn run<F, Fut, T>(&self, module: &str, mut op: F) -> Result<T, LoadError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LoadError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err, attempt) => {
                    let delay = self.backoff.delay_for_attempt(attempt);
                    debug!(module, attempt, ?delay, error = %err, "retrying import");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(LoadError::RetriesExhausted {
                        module: module.to_string(),
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
