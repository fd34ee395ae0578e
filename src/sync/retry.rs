//! Retry with exponential backoff.
//!
//! The delay before attempt *n* is `min(max_delay, initial_delay * multiplier^(n-1))`, optionally
//! jittered by ±50%. An error carrying a retry-after hint (a 429 with `Retry-After`) waits at
//! least that long. Only conditions classified as retryable are retried; everything else
//! propagates on first raise. On exhaustion the last error is returned unchanged.

use super::types::Retryable;
use crate::config::RetryConfig;
use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

const JITTER_FACTOR: f64 = 0.5;

/// State of one retry call
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub entity_type: String,
    pub operation: String,
    pub max_attempts: u32,
    pub current_attempt: u32,
    pub last_error: Option<String>,
    pub started_at: Instant,
}

impl RetryContext {
    fn new(entity_type: &str, operation: &str, max_attempts: u32) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            operation: operation.to_string(),
            max_attempts,
            current_attempt: 0,
            last_error: None,
            started_at: Instant::now(),
        }
    }

    fn attempts_remaining(&self) -> bool {
        self.current_attempt < self.max_attempts
    }
}

/// Retries units of work according to a [`RetryConfig`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Delay schedule for one retry call. Successive `next_backoff` calls yield the delays
    /// before attempts 2, 3, ...
    pub fn backoff_schedule(&self) -> ExponentialBackoff {
        let randomization = if self.config.jitter { JITTER_FACTOR } else { 0.0 };
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.initial_delay())
            .with_multiplier(self.config.backoff_multiplier)
            .with_max_interval(self.config.max_delay())
            .with_randomization_factor(randomization)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Run `attempt_fn` until it succeeds, fails with a non-retryable error, or the entity's
    /// attempt ceiling is reached. `attempt_fn` receives the 1-based attempt number.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        entity_type: &str,
        operation: &str,
        mut attempt_fn: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut context = RetryContext::new(
            entity_type,
            operation,
            self.config.max_attempts_for(entity_type),
        );
        let mut schedule = self.backoff_schedule();

        loop {
            context.current_attempt += 1;

            match attempt_fn(context.current_attempt).await {
                Ok(value) => {
                    if context.current_attempt > 1 {
                        info!(
                            entity = %context.entity_type,
                            attempts = context.current_attempt,
                            elapsed_ms = context.started_at.elapsed().as_millis() as u64,
                            "{} succeeded after retry",
                            context.operation
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !err.is_retryable() {
                        debug!(
                            entity = %context.entity_type,
                            attempt = context.current_attempt,
                            "{} failed with non-retryable error: {}",
                            context.operation,
                            err
                        );
                        return Err(err);
                    }

                    if !context.attempts_remaining() {
                        warn!(
                            entity = %context.entity_type,
                            attempts = context.current_attempt,
                            "{} failed after exhausting retries: {}",
                            context.operation,
                            err
                        );
                        return Err(err);
                    }

                    let mut delay = schedule
                        .next_backoff()
                        .unwrap_or_else(|| self.config.max_delay());
                    if let Some(retry_after) = err.retry_after() {
                        delay = delay.max(retry_after);
                    }
                    context.last_error = Some(err.to_string());

                    warn!(
                        entity = %context.entity_type,
                        attempt = context.current_attempt,
                        max_attempts = context.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed, retrying: {}",
                        context.operation,
                        err
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
