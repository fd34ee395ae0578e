//! Entity types, the engine's error taxonomy and sync results.

use crate::config::ConfigError;
use crate::source::SourceError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Entity types the engine knows how to synchronize.
///
/// Declaration order is the tie-breaking priority used when ordering a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    ShowTypes,
    Seasons,
    ShowTemplates,
    Shows,
    Wrestlers,
    Npcs,
    Factions,
    Teams,
    Titles,
    Injuries,
    Rivalries,
    Segments,
}

impl EntityType {
    /// Every entity type, in priority order
    pub const ALL: [EntityType; 12] = [
        EntityType::ShowTypes,
        EntityType::Seasons,
        EntityType::ShowTemplates,
        EntityType::Shows,
        EntityType::Wrestlers,
        EntityType::Npcs,
        EntityType::Factions,
        EntityType::Teams,
        EntityType::Titles,
        EntityType::Injuries,
        EntityType::Rivalries,
        EntityType::Segments,
    ];

    /// Stable key used in configuration, URLs and results
    pub fn key(&self) -> &'static str {
        match self {
            EntityType::ShowTypes => "show-types",
            EntityType::Seasons => "seasons",
            EntityType::ShowTemplates => "show-templates",
            EntityType::Shows => "shows",
            EntityType::Wrestlers => "wrestlers",
            EntityType::Npcs => "npcs",
            EntityType::Factions => "factions",
            EntityType::Teams => "teams",
            EntityType::Titles => "titles",
            EntityType::Injuries => "injuries",
            EntityType::Rivalries => "rivalries",
            EntityType::Segments => "segments",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::ShowTypes => "Show Types",
            EntityType::Seasons => "Seasons",
            EntityType::ShowTemplates => "Show Templates",
            EntityType::Shows => "Shows",
            EntityType::Wrestlers => "Wrestlers",
            EntityType::Npcs => "NPCs",
            EntityType::Factions => "Factions",
            EntityType::Teams => "Teams",
            EntityType::Titles => "Titles",
            EntityType::Injuries => "Injuries",
            EntityType::Rivalries => "Rivalries",
            EntityType::Segments => "Segments",
        }
    }

    /// Parse a key, case-insensitively. `templates` is accepted for show templates.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        if key == "templates" {
            return Some(EntityType::ShowTemplates);
        }
        Self::ALL.into_iter().find(|entity| entity.key() == key)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Classification seam for the retry executor
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Minimum wait the failing side asked for before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for SourceError {
    fn is_retryable(&self) -> bool {
        SourceError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Errors raised by the synchronization engine
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Content source error: {0}")]
    Source(#[from] SourceError),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Not attempted because the entity type's breaker is open
    #[error("Circuit breaker open for {entity}")]
    BreakerOpen { entity: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        match self {
            SyncError::Source(e) => e.is_retryable(),
            SyncError::Transient(_) | SyncError::Timeout(_) => true,
            SyncError::Validation(_)
            | SyncError::UnresolvedReference(_)
            | SyncError::Persistence(_)
            | SyncError::BreakerOpen { .. }
            | SyncError::Configuration(_)
            | SyncError::Cancelled(_) => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Source(e) => e.retry_after(),
            _ => None,
        }
    }
}

impl SyncError {
    pub fn is_breaker_open(&self) -> bool {
        matches!(self, SyncError::BreakerOpen { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled(_))
    }
}

impl From<ConfigError> for SyncError {
    fn from(e: ConfigError) -> Self {
        SyncError::Configuration(e.to_string())
    }
}

/// Outcome of one entity type's synchronization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    /// Entity key, or the requested key when it did not name a known entity type
    pub entity_type: String,
    /// Created plus updated records
    pub synced_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub error_count: usize,
    /// Local records correlated through their natural key during this run
    pub merged_by_natural_key: usize,
    /// Natural-key matches that already belonged to another external record
    pub natural_key_collisions: usize,
    pub success: bool,
    pub error_message: Option<String>,
    /// Worker invocations, retries included
    pub attempts: u32,
    /// The entity type was not attempted because its breaker is open
    pub breaker_open: bool,
    pub duration: Duration,
}

impl SyncResult {
    pub fn success(entity: EntityType, created: usize, updated: usize, errors: usize) -> Self {
        Self {
            entity_type: entity.key().to_string(),
            synced_count: created + updated,
            created_count: created,
            updated_count: updated,
            error_count: errors,
            merged_by_natural_key: 0,
            natural_key_collisions: 0,
            success: true,
            error_message: None,
            attempts: 1,
            breaker_open: false,
            duration: Duration::ZERO,
        }
    }

    pub fn failure(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            synced_count: 0,
            created_count: 0,
            updated_count: 0,
            error_count: 1,
            merged_by_natural_key: 0,
            natural_key_collisions: 0,
            success: false,
            error_message: Some(message.into()),
            attempts: 0,
            breaker_open: false,
            duration: Duration::ZERO,
        }
    }

    /// Result for an entity type whose breaker refused the call
    pub fn not_attempted(entity: EntityType, message: impl Into<String>) -> Self {
        Self {
            error_count: 0,
            breaker_open: true,
            ..Self::failure(entity.key(), message)
        }
    }

    /// Get a human-readable summary of the result
    pub fn summary(&self) -> String {
        if self.success {
            format!(
                "{}: {} synced ({} created, {} updated), {} errors",
                self.entity_type,
                self.synced_count,
                self.created_count,
                self.updated_count,
                self.error_count
            )
        } else {
            format!(
                "{}: failed - {}",
                self.entity_type,
                self.error_message.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_keys_round_trip() {
        for entity in EntityType::ALL {
            assert_eq!(EntityType::from_key(entity.key()), Some(entity));
        }
        assert_eq!(EntityType::from_key("Templates"), Some(EntityType::ShowTemplates));
        assert_eq!(EntityType::from_key("matches"), None);
    }

    #[test]
    fn test_error_classification() {
        assert!(SyncError::Timeout("fetch".into()).is_retryable());
        assert!(
            SyncError::Source(SourceError::Status {
                status: 502,
                message: String::new()
            })
            .is_retryable()
        );
        assert!(!SyncError::Validation("bad".into()).is_retryable());
        assert!(!SyncError::UnresolvedReference("show".into()).is_retryable());
        assert!(
            !SyncError::BreakerOpen {
                entity: "shows".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_summaries() {
        let ok = SyncResult::success(EntityType::Wrestlers, 3, 5, 1);
        assert_eq!(ok.synced_count, 8);
        assert_eq!(ok.summary(), "wrestlers: 8 synced (3 created, 5 updated), 1 errors");

        let failed = SyncResult::failure("shows", "source unavailable");
        assert_eq!(failed.summary(), "shows: failed - source unavailable");

        let skipped = SyncResult::not_attempted(EntityType::Titles, "breaker open");
        assert!(skipped.breaker_open);
        assert!(!skipped.success);
        assert_eq!(skipped.error_count, 0);
    }
}
