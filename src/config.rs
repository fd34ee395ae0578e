//! Configuration for the content synchronization engine.
//!
//! Configuration is loaded once at startup from a JSON file, optionally overridden from the
//! environment, and validated before the orchestrator is built. Every section has defaults so a
//! partial file (or none at all) yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Global enable flag. A disabled engine refuses to start runs.
    pub enabled: bool,
    /// Per-entity enable flags keyed by entity key (`wrestlers`, `shows`, ...).
    /// Keys that are absent are enabled.
    pub entities: HashMap<String, bool>,
    pub source: SourceConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub batch: BatchConfig,
    pub scheduler: SchedulerConfig,
    pub health: HealthConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entities: HashMap::new(),
            source: SourceConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            batch: BatchConfig::default(),
            scheduler: SchedulerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Content-source connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Integration token. Required when the engine is enabled.
    pub token: Option<String>,
    /// Outbound request ceiling
    pub requests_per_second: f64,
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8089/api/v1".to_string(),
            token: None,
            requests_per_second: 3.0,
            request_timeout_secs: 30,
        }
    }
}

/// Retry policy applied to every entity worker invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Attempt ceilings that replace `max_attempts` for specific entity keys
    pub entity_max_attempts: HashMap<String, u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            entity_max_attempts: HashMap::new(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Attempt ceiling for an entity key, falling back to the global ceiling.
    pub fn max_attempts_for(&self, entity_key: &str) -> u32 {
        self.entity_max_attempts
            .get(entity_key)
            .copied()
            .unwrap_or(self.max_attempts)
            .max(1)
    }
}

/// Circuit-breaker policy shared by every per-entity breaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open a closed breaker
    pub failure_threshold: u32,
    /// Cooldown before an open breaker lets a probe through
    pub recovery_timeout_ms: u64,
    /// Success ratio required over the evaluation window to close a half-open breaker
    pub success_threshold: f64,
    pub evaluation_window: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            success_threshold: 0.5,
            evaluation_window: 10,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// Batch processing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub inter_batch_delay_ms: u64,
    /// Largest share of failed records that still counts as a successful entity run
    pub max_record_error_ratio: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrency: 3,
            inter_batch_delay_ms: 500,
            max_record_error_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub initial_delay_secs: u64,
    /// Upper bound of the random delay added to every tick
    pub jitter_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            initial_delay_secs: 300,
            jitter_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures at which the health probe reports Down
    pub alert_threshold: u32,
    /// A sync that has not succeeded within this window is reported as stale
    pub stale_after_hours: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            alert_threshold: 3,
            stale_after_hours: 24,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse JSON: {}", e)))
    }

    /// Apply `SYNC_*` environment overrides on top of the loaded values
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(enabled) = std::env::var("SYNC_ENABLED") {
            self.enabled = enabled
                .parse()
                .map_err(|_| ConfigError::Parse("SYNC_ENABLED must be true or false".to_string()))?;
        }
        if let Ok(url) = std::env::var("SYNC_SOURCE_URL") {
            self.source.base_url = url;
        }
        if let Ok(token) = std::env::var("SYNC_SOURCE_TOKEN") {
            if !token.trim().is_empty() {
                self.source.token = Some(token);
            }
        }
        if let Ok(interval) = std::env::var("SYNC_SCHEDULER_INTERVAL_SECS") {
            self.scheduler.interval_secs = interval.parse().map_err(|_| {
                ConfigError::Parse("SYNC_SCHEDULER_INTERVAL_SECS must be a number".to_string())
            })?;
        }
        Ok(())
    }

    /// Whether sync is enabled for an entity key
    pub fn is_entity_enabled(&self, entity_key: &str) -> bool {
        self.entities.get(entity_key).copied().unwrap_or(true)
    }

    /// Whether an integration token is configured
    pub fn has_credentials(&self) -> bool {
        self.source
            .token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    /// Check policy values, returning warnings for questionable-but-usable settings.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let mut warnings = Vec::new();

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.circuit_breaker.evaluation_window == 0 {
            return Err(ConfigError::InvalidValue(
                "circuit_breaker.evaluation_window must be at least 1".to_string(),
            ));
        }
        let threshold = self.circuit_breaker.success_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidValue(
                "circuit_breaker.success_threshold must be in (0, 1]".to_string(),
            ));
        }
        if self.batch.batch_size == 0 || self.batch.max_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "batch.batch_size and batch.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.source.requests_per_second <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "source.requests_per_second must be positive".to_string(),
            ));
        }

        if self.scheduler.enabled && self.scheduler.interval_secs < 60 {
            warnings.push(format!(
                "Scheduler interval of {}s is very short and may exhaust the source rate limit",
                self.scheduler.interval_secs
            ));
        }
        if self.source.requests_per_second > 3.0 {
            warnings.push(format!(
                "{} requests/s exceeds the content source's documented limit of 3",
                self.source.requests_per_second
            ));
        }
        if !self.entities.is_empty() && self.entities.values().all(|enabled| !enabled) {
            warnings.push("Every entity type is disabled".to_string());
        }

        Ok(warnings)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
