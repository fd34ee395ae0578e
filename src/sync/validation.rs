//! Checks made before a run starts.
//!
//! Any failure here is a configuration error. It is reported before a single entity worker runs.

use super::dependency::DependencyAnalyzer;
use super::types::{EntityType, SyncError};
use crate::config::SyncConfig;
use tracing::warn;

/// What a run may proceed with
#[derive(Debug, Clone, PartialEq)]
pub struct Prerequisites {
    /// Sync order over every known entity type
    pub order: Vec<EntityType>,
    /// Non-fatal configuration findings
    pub warnings: Vec<String>,
}

/// Validate the global switch, credentials, policy values and dependency graph.
///
/// # Errors
/// `SyncError::Configuration` describing the first problem found.
pub fn check_prerequisites(
    config: &SyncConfig,
    analyzer: &DependencyAnalyzer,
) -> Result<Prerequisites, SyncError> {
    if !config.enabled {
        return Err(SyncError::Configuration(
            "Synchronization is disabled".to_string(),
        ));
    }
    if !config.has_credentials() {
        return Err(SyncError::Configuration(
            "Content source token is not configured".to_string(),
        ));
    }

    let warnings = config.validate()?;
    for warning in &warnings {
        warn!("Configuration: {}", warning);
    }

    let order = analyzer.sync_order()?;
    Ok(Prerequisites { order, warnings })
}
