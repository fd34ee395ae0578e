//! Rolling health signal for the sync engine.
//!
//! Every entity run appends a timestamped metric to a bounded history. Summaries (success rate,
//! consecutive failures, average duration) are derived from that history on read. The probe
//! reports Down when the configuration is unusable or when consecutive failures reach the alert
//! threshold.

use super::locks::{read, write};
use crate::config::SyncConfig;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Metrics kept in the history
pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct SyncMetric {
    pub entity_type: String,
    pub at: DateTime<Utc>,
    pub success: bool,
    pub duration: Option<Duration>,
    pub items: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub successful_syncs: usize,
    pub failed_syncs: usize,
    pub consecutive_failures: usize,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Mean duration of successful syncs
    pub average_duration: Option<Duration>,
    /// Successes over recorded syncs, 1.0 when nothing has been recorded
    pub success_rate: f64,
}

impl HealthSummary {
    fn from_metrics<'a>(metrics: impl DoubleEndedIterator<Item = &'a SyncMetric> + Clone) -> Self {
        let mut successful_syncs = 0;
        let mut failed_syncs = 0;
        let mut total_duration = Duration::ZERO;
        let mut last_success = None;
        let mut last_failure = None;
        let mut last_error = None;

        for metric in metrics.clone() {
            if metric.success {
                successful_syncs += 1;
                total_duration += metric.duration.unwrap_or_default();
                last_success = Some(metric.at);
            } else {
                failed_syncs += 1;
                last_failure = Some(metric.at);
                last_error = metric.error.clone();
            }
        }

        let consecutive_failures = metrics.rev().take_while(|m| !m.success).count();
        let total = successful_syncs + failed_syncs;

        Self {
            successful_syncs,
            failed_syncs,
            consecutive_failures,
            last_success,
            last_failure,
            last_error,
            average_duration: (successful_syncs > 0)
                .then(|| total_duration / successful_syncs as u32),
            success_rate: if total == 0 {
                1.0
            } else {
                successful_syncs as f64 / total as f64
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Up,
    Down,
}

/// Result of a liveness/readiness probe
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub summary: HealthSummary,
    pub entities: BTreeMap<String, HealthSummary>,
    /// Why the probe is Down, or informational details when Up
    pub details: Vec<String>,
    pub warnings: Vec<String>,
}

/// Aggregates recent sync outcomes into a health signal
pub struct HealthMonitor {
    history: RwLock<VecDeque<SyncMetric>>,
    sync_enabled: bool,
    config_problem: Option<String>,
    alert_threshold: usize,
    stale_after: ChronoDuration,
}

impl HealthMonitor {
    pub fn new(config: &SyncConfig) -> Self {
        let config_problem = if !config.enabled {
            None
        } else if !config.has_credentials() {
            Some("Content source token is not configured".to_string())
        } else {
            config.validate().err().map(|e| e.to_string())
        };

        Self {
            history: RwLock::new(VecDeque::with_capacity(MAX_HISTORY)),
            sync_enabled: config.enabled,
            config_problem,
            alert_threshold: config.health.alert_threshold as usize,
            stale_after: ChronoDuration::hours(config.health.stale_after_hours),
        }
    }

    fn push(&self, metric: SyncMetric) {
        let mut history = write(&self.history);
        history.push_back(metric);
        while history.len() > MAX_HISTORY {
            history.pop_front();
        }
    }

    pub fn record_success(&self, entity_type: &str, duration: Duration, items: usize) {
        debug!(
            entity = entity_type,
            items,
            duration_ms = duration.as_millis() as u64,
            "Recording successful sync"
        );
        self.push(SyncMetric {
            entity_type: entity_type.to_string(),
            at: Utc::now(),
            success: true,
            duration: Some(duration),
            items,
            error: None,
        });
    }

    pub fn record_failure(&self, entity_type: &str, error: &str) {
        warn!(entity = entity_type, "Recording failed sync: {}", error);
        self.push(SyncMetric {
            entity_type: entity_type.to_string(),
            at: Utc::now(),
            success: false,
            duration: None,
            items: 0,
            error: Some(error.to_string()),
        });
    }

    /// Summary across every entity type
    pub fn summary(&self) -> HealthSummary {
        HealthSummary::from_metrics(read(&self.history).iter())
    }

    pub fn summary_for(&self, entity_type: &str) -> HealthSummary {
        let history = read(&self.history);
        let metrics: Vec<&SyncMetric> = history
            .iter()
            .filter(|m| m.entity_type == entity_type)
            .collect();
        HealthSummary::from_metrics(metrics.into_iter())
    }

    /// Most recent successful sync of an entity type
    pub fn last_sync_time(&self, entity_type: &str) -> Option<DateTime<Utc>> {
        read(&self.history)
            .iter()
            .rev()
            .find(|m| m.success && m.entity_type == entity_type)
            .map(|m| m.at)
    }

    pub fn history_len(&self) -> usize {
        read(&self.history).len()
    }

    pub fn probe(&self) -> HealthReport {
        let summary = self.summary();
        let entity_types: Vec<String> = read(&self.history)
            .iter()
            .map(|m| m.entity_type.clone())
            .collect();
        let mut entities = BTreeMap::new();
        for entity_type in entity_types {
            if !entities.contains_key(&entity_type) {
                let entity_summary = self.summary_for(&entity_type);
                entities.insert(entity_type, entity_summary);
            }
        }

        let mut details = Vec::new();
        let mut warnings = Vec::new();

        if !self.sync_enabled {
            details.push("Sync is disabled".to_string());
            return HealthReport {
                status: HealthStatus::Up,
                summary,
                entities,
                details,
                warnings,
            };
        }

        let mut status = HealthStatus::Up;
        if let Some(problem) = &self.config_problem {
            status = HealthStatus::Down;
            details.push(format!("Invalid configuration: {}", problem));
        }
        if summary.consecutive_failures >= self.alert_threshold {
            status = HealthStatus::Down;
            details.push(format!(
                "{} consecutive sync failures",
                summary.consecutive_failures
            ));
        }

        match summary.last_success {
            Some(at) if Utc::now() - at > self.stale_after => warnings.push(format!(
                "No successful sync since {}",
                at.to_rfc3339()
            )),
            None if self.history_len() > 0 => {
                warnings.push("No successful sync recorded".to_string())
            }
            _ => {}
        }

        HealthReport {
            status,
            summary,
            entities,
            details,
            warnings,
        }
    }

    /// Clear the history
    pub fn reset(&self) {
        write(&self.history).clear();
    }
}
