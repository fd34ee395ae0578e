//! Per-entity-type circuit breaking.
//!
//! Each entity type gets an independent breaker. A closed breaker runs calls through the retry
//! executor and opens after `failure_threshold` consecutive failures. An open breaker fails fast
//! with [`SyncError::BreakerOpen`] until the recovery timeout elapses, then lets the next call
//! through in the half-open state. Half-open outcomes accumulate in the evaluation window: a full
//! window at or above the success threshold closes the breaker, any failure reopens it.

use super::locks::{guard, read, write};
use super::retry::RetryExecutor;
use super::types::SyncError;
use crate::config::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

/// Mutable breaker state, only changed from inside the breaker
#[derive(Debug, Clone)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub last_transition: DateTime<Utc>,
    transitioned_at: Instant,
    recent_outcomes: VecDeque<bool>,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            last_transition: Utc::now(),
            transitioned_at: Instant::now(),
            recent_outcomes: VecDeque::new(),
        }
    }

    /// Share of successes among the recorded outcomes
    pub fn success_ratio(&self) -> Option<f64> {
        if self.recent_outcomes.is_empty() {
            return None;
        }
        let successes = self.recent_outcomes.iter().filter(|ok| **ok).count();
        Some(successes as f64 / self.recent_outcomes.len() as f64)
    }

    pub fn window_len(&self) -> usize {
        self.recent_outcomes.len()
    }

    fn transition(&mut self, status: CircuitStatus) {
        self.status = status;
        self.last_transition = Utc::now();
        self.transitioned_at = Instant::now();
        self.recent_outcomes.clear();
    }

    fn push_outcome(&mut self, success: bool, window: usize) {
        self.recent_outcomes.push_back(success);
        while self.recent_outcomes.len() > window {
            self.recent_outcomes.pop_front();
        }
    }
}

/// Breaker guarding one entity type
pub struct CircuitBreaker {
    entity_type: String,
    config: CircuitBreakerConfig,
    state: Mutex<CircuitState>,
}

impl CircuitBreaker {
    pub fn new(entity_type: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            entity_type: entity_type.into(),
            config,
            state: Mutex::new(CircuitState::new()),
        }
    }

    pub fn status(&self) -> CircuitStatus {
        guard(&self.state).status
    }

    pub fn snapshot(&self) -> CircuitState {
        guard(&self.state).clone()
    }

    /// Admit a call or refuse it with `BreakerOpen`
    fn admit(&self) -> Result<(), SyncError> {
        let mut state = guard(&self.state);
        if state.status != CircuitStatus::Open {
            return Ok(());
        }

        if state.transitioned_at.elapsed() >= self.config.recovery_timeout() {
            info!(entity = %self.entity_type, "Circuit breaker half-open, probing");
            state.transition(CircuitStatus::HalfOpen);
            return Ok(());
        }

        Err(SyncError::BreakerOpen {
            entity: self.entity_type.clone(),
        })
    }

    fn record_success(&self) {
        let mut state = guard(&self.state);
        state.consecutive_failures = 0;
        state.push_outcome(true, self.config.evaluation_window);

        if state.status == CircuitStatus::HalfOpen
            && state.window_len() >= self.config.evaluation_window
            && state
                .success_ratio()
                .is_some_and(|ratio| ratio >= self.config.success_threshold)
        {
            info!(entity = %self.entity_type, "Circuit breaker closed");
            state.transition(CircuitStatus::Closed);
        }
    }

    fn record_failure(&self, error: &SyncError) {
        let mut state = guard(&self.state);
        state.consecutive_failures += 1;
        state.push_outcome(false, self.config.evaluation_window);

        match state.status {
            CircuitStatus::HalfOpen => {
                warn!(entity = %self.entity_type, "Circuit breaker reopened: {}", error);
                state.transition(CircuitStatus::Open);
            }
            CircuitStatus::Closed
                if state.consecutive_failures >= self.config.failure_threshold =>
            {
                warn!(
                    entity = %self.entity_type,
                    failures = state.consecutive_failures,
                    "Circuit breaker opened: {}",
                    error
                );
                state.transition(CircuitStatus::Open);
            }
            _ => {}
        }
    }

    /// Run `attempt_fn` through the retry executor unless the breaker refuses the call.
    ///
    /// The retried call as a whole counts as one outcome. A cancelled call counts as none.
    pub async fn call<T, F, Fut>(&self, retry: &RetryExecutor, attempt_fn: F) -> Result<T, SyncError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.admit()?;

        match retry
            .execute_with_retry(&self.entity_type, "sync", attempt_fn)
            .await
        {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    /// Force the breaker closed
    pub fn reset(&self) {
        let mut state = guard(&self.state);
        state.consecutive_failures = 0;
        state.transition(CircuitStatus::Closed);
    }
}

/// The per-entity breakers of one orchestrator
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    retry: Arc<RetryExecutor>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig, retry: Arc<RetryExecutor>) -> Self {
        Self {
            config,
            retry,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The breaker for an entity type, created closed on first use
    pub fn breaker(&self, entity_type: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = read(&self.breakers).get(entity_type) {
            return breaker.clone();
        }
        write(&self.breakers)
            .entry(entity_type.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(entity_type, self.config.clone())))
            .clone()
    }

    pub async fn execute<T, F, Fut>(&self, entity_type: &str, attempt_fn: F) -> Result<T, SyncError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.breaker(entity_type)
            .call(&self.retry, attempt_fn)
            .await
    }

    pub fn status(&self, entity_type: &str) -> CircuitStatus {
        read(&self.breakers)
            .get(entity_type)
            .map_or(CircuitStatus::Closed, |breaker| breaker.status())
    }

    /// Status of every breaker created so far, sorted by entity key
    pub fn statuses(&self) -> Vec<(String, CircuitStatus)> {
        let mut statuses: Vec<_> = read(&self.breakers)
            .iter()
            .map(|(entity, breaker)| (entity.clone(), breaker.status()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    pub fn reset(&self, entity_type: &str) {
        if let Some(breaker) = read(&self.breakers).get(entity_type) {
            breaker.reset();
        }
    }
}
