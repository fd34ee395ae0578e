//! Sync orchestrator and integration point for all sync services.
//!
//! This module defines the `SyncOrchestrator`, which coordinates every component involved in
//! synchronizing the local store with the content source:
//! - Validating prerequisites and asking the dependency analyzer for the run order
//! - Skipping entity types that are disabled or already synced in the current session
//! - Invoking each entity worker through its circuit breaker (and so through the retry executor)
//! - Recording outcomes into the health monitor and keeping the latest result per entity type
//! - Checking the integrity of the local store once a run has attempted anything
//!
//! A cancelled entity sync is neither a breaker failure nor a health failure: it tells nothing
//! about the content source.
//!
//! `run_all` never fails. Configuration problems and per-entity failures are reported in the
//! returned `RunReport` so a scheduler can run unattended.

use super::batch::BatchProcessor;
use super::circuit_breaker::{CircuitBreakers, CircuitStatus};
use super::dependency::{DependencyAnalyzer, entity_dependencies};
use super::entities::{WorkerContext, default_workers};
use super::events::TracingListener;
use super::health::{HealthMonitor, HealthReport};
use super::integrity::{IntegrityChecker, IntegrityReport};
use super::locks::{guard, read, write};
use super::progress_tracker::{ProgressTracker, SyncOperation};
use super::retry::RetryExecutor;
use super::session::{ClaimRefused, SessionManager};
use super::types::{EntityType, SyncError, SyncResult};
use super::validation::check_prerequisites;
use super::worker::{EntitySyncWorker, SYNC_STEPS};
use crate::config::SyncConfig;
use crate::source::{ContentSource, RateLimitedSource, RateLimiter};
use crate::store::Store;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// An entity type left out of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntity {
    pub entity: EntityType,
    pub reason: String,
}

/// Outcome of one orchestrated run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub session_id: String,
    /// Entity types attempted, in the order they ran
    pub order: Vec<EntityType>,
    pub results: Vec<SyncResult>,
    pub skipped: Vec<SkippedEntity>,
    /// Set when the run could not start at all
    pub configuration_error: Option<String>,
    /// Store check made after the run, when a store is attached and anything was attempted
    pub integrity: Option<IntegrityReport>,
    pub duration: Duration,
}

impl RunReport {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            order: Vec::new(),
            results: Vec::new(),
            skipped: Vec::new(),
            configuration_error: None,
            integrity: None,
            duration: Duration::ZERO,
        }
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// Whether the run started and every attempted entity type succeeded
    pub fn is_success(&self) -> bool {
        self.configuration_error.is_none() && self.failed_count() == 0
    }

    pub fn result_for(&self, entity: EntityType) -> Option<&SyncResult> {
        self.results.iter().find(|r| r.entity_type == entity.key())
    }

    /// Get a human-readable summary of the run
    pub fn summary(&self) -> String {
        if let Some(error) = &self.configuration_error {
            return format!("Run {} not started: {}", self.session_id, error);
        }
        format!(
            "Run {}: {} succeeded, {} failed, {} skipped in {:.1}s",
            self.session_id,
            self.successful_count(),
            self.failed_count(),
            self.skipped.len(),
            self.duration.as_secs_f64()
        )
    }
}

/// Operator-facing snapshot of the engine
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub health: HealthReport,
    pub active_operations: Vec<SyncOperation>,
    /// Latest result per entity type, in priority order
    pub latest_results: Vec<SyncResult>,
    pub breakers: Vec<(String, CircuitStatus)>,
    /// Latest post-run integrity check
    pub integrity: Option<IntegrityReport>,
}

/// Main sync orchestrator that coordinates all sync components.
pub struct SyncOrchestrator {
    config: SyncConfig,
    workers: HashMap<EntityType, Arc<dyn EntitySyncWorker>>,
    analyzer: DependencyAnalyzer,
    breakers: CircuitBreakers,
    health: HealthMonitor,
    tracker: Arc<ProgressTracker>,
    sessions: SessionManager,
    latest: RwLock<BTreeMap<EntityType, SyncResult>>,
    integrity: Option<IntegrityChecker>,
    latest_integrity: RwLock<Option<IntegrityReport>>,
    /// Operations inside `execute_entity`, retry backoff included
    in_flight: Mutex<HashSet<String>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator over explicit workers, using the built-in dependency graph.
    pub fn new(
        config: SyncConfig,
        workers: Vec<Arc<dyn EntitySyncWorker>>,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        let retry = Arc::new(RetryExecutor::new(config.retry.clone()));
        let breakers = CircuitBreakers::new(config.circuit_breaker.clone(), retry);
        let health = HealthMonitor::new(&config);
        let workers = workers
            .into_iter()
            .map(|worker| (worker.entity_type(), worker))
            .collect();

        Self {
            config,
            workers,
            analyzer: entity_dependencies(),
            breakers,
            health,
            tracker,
            sessions: SessionManager::new(),
            latest: RwLock::new(BTreeMap::new()),
            integrity: None,
            latest_integrity: RwLock::new(None),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Create an orchestrator with the default workers over a content source and a store.
    ///
    /// The source is wrapped in a rate limiter and progress events are forwarded to the log.
    pub fn with_store(config: SyncConfig, source: Arc<dyn ContentSource>, store: Store) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.source.requests_per_second));
        let source: Arc<dyn ContentSource> = Arc::new(RateLimitedSource::new(source, limiter));

        let tracker = Arc::new(ProgressTracker::new());
        tracker.register_listener(Arc::new(TracingListener));
        let integrity = IntegrityChecker::new(store.clone());
        let context = WorkerContext {
            source,
            store,
            tracker: tracker.clone(),
            batch: Arc::new(BatchProcessor::new(tracker.clone(), &config.batch)),
            batch_config: config.batch.clone(),
        };
        let workers = default_workers(&context);

        let mut orchestrator = Self::new(config, workers, tracker);
        orchestrator.integrity = Some(integrity);
        orchestrator
    }

    /// Replace the dependency graph
    pub fn with_dependencies(mut self, analyzer: DependencyAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Synchronize every enabled entity type in dependency order.
    ///
    /// Entity types already synced in `session_id` are skipped, and an entity type is marked
    /// synced only when its run succeeds.
    pub async fn run_all(&self, session_id: &str) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(session_id);
        info!("Starting sync run {}", session_id);

        let prerequisites = match check_prerequisites(&self.config, &self.analyzer) {
            Ok(prerequisites) => prerequisites,
            Err(e) => {
                error!("Sync run {} not started: {}", session_id, e);
                report.configuration_error = Some(e.to_string());
                report.duration = started.elapsed();
                return report;
            }
        };

        let mut planned = Vec::new();
        for entity in prerequisites.order {
            let reason = if !self.config.is_entity_enabled(entity.key()) {
                Some("disabled in configuration")
            } else if !self.workers.contains_key(&entity) {
                Some("no worker registered")
            } else if self.sessions.is_synced(session_id, entity) {
                Some("already synced in this session")
            } else {
                None
            };

            match reason {
                Some(reason) => report.skipped.push(SkippedEntity {
                    entity,
                    reason: reason.to_string(),
                }),
                None => {
                    self.tracker.prepare_operation(
                        &operation_id(session_id, entity),
                        &format!("Sync {}", entity.display_name()),
                        SYNC_STEPS,
                    );
                    planned.push(entity);
                }
            }
        }

        for entity in planned {
            let operation_id = operation_id(session_id, entity);
            let claim = match self.sessions.claim(session_id, entity) {
                Ok(claim) => claim,
                Err(refused) => {
                    let reason = match refused {
                        ClaimRefused::AlreadySynced => "already synced in this session",
                        ClaimRefused::InFlight => "in flight in another trigger of this session",
                    };
                    self.tracker.discard_operation(&operation_id);
                    report.skipped.push(SkippedEntity {
                        entity,
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            report.order.push(entity);
            let result = self.execute_entity(entity, &operation_id).await;
            if result.success {
                claim.complete();
            }
            report.results.push(result);
        }

        if !report.order.is_empty() {
            report.integrity = self.check_integrity().await;
        }

        report.duration = started.elapsed();
        info!("{}", report.summary());
        report
    }

    /// Run the integrity check and keep it for `status`. `None` without an attached store or
    /// when the store cannot be read.
    pub async fn check_integrity(&self) -> Option<IntegrityReport> {
        let checker = self.integrity.as_ref()?;
        match checker.check().await {
            Ok(report) => {
                *write(&self.latest_integrity) = Some(report.clone());
                Some(report)
            }
            Err(e) => {
                error!("Integrity check failed: {}", e);
                None
            }
        }
    }

    /// Synchronize one entity type, bypassing dependency ordering.
    pub async fn run_one(&self, entity: EntityType) -> SyncResult {
        let session_id = self.sessions.new_session_id("manual");
        let result = self.run_one_in_session(&session_id, entity).await;
        self.sessions.end_session(&session_id);
        result
    }

    /// Synchronize one entity type named by its key. Unknown keys produce a failed result.
    pub async fn run_one_by_key(&self, key: &str) -> SyncResult {
        match EntityType::from_key(key) {
            Some(entity) => self.run_one(entity).await,
            None => {
                warn!("Manual sync requested for unknown entity type '{}'", key);
                SyncResult::failure(key, format!("Unknown entity type: {}", key))
            }
        }
    }

    /// Run every entity type once in a fresh session
    pub async fn run_manual(&self) -> RunReport {
        let session_id = self.sessions.new_session_id("manual");
        let report = self.run_all(&session_id).await;
        self.sessions.end_session(&session_id);
        report
    }

    async fn run_one_in_session(&self, session_id: &str, entity: EntityType) -> SyncResult {
        if let Err(e) = check_prerequisites(&self.config, &self.analyzer) {
            return SyncResult::failure(entity.key(), e.to_string());
        }
        if !self.config.is_entity_enabled(entity.key()) {
            return SyncResult::failure(
                entity.key(),
                format!("{} sync is disabled in configuration", entity.display_name()),
            );
        }

        let Ok(claim) = self.sessions.claim(session_id, entity) else {
            return SyncResult::failure(entity.key(), "Already running");
        };
        let operation_id = operation_id(session_id, entity);
        let result = self.execute_entity(entity, &operation_id).await;
        if result.success {
            claim.complete();
        }
        result
    }

    /// Run one worker through its breaker and record the outcome
    async fn execute_entity(&self, entity: EntityType, operation_id: &str) -> SyncResult {
        let Some(worker) = self.workers.get(&entity).cloned() else {
            return SyncResult::failure(entity.key(), "No worker registered");
        };

        guard(&self.in_flight).insert(operation_id.to_string());
        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let outcome = self
            .breakers
            .execute(entity.key(), |attempt| {
                attempts.store(attempt, Ordering::SeqCst);
                let worker = worker.clone();
                let operation_id = operation_id.to_string();
                async move { worker.sync(&operation_id).await }
            })
            .await;
        guard(&self.in_flight).remove(operation_id);
        let attempts = attempts.load(Ordering::SeqCst);
        let cancelled = matches!(&outcome, Err(e) if e.is_cancelled());

        let result = match outcome {
            Ok(mut result) => {
                result.attempts = attempts;
                result.duration = started.elapsed();
                result
            }
            Err(e) if e.is_breaker_open() => {
                warn!("Skipping {}: {}", entity, e);
                self.tracker.fail_operation(operation_id, &e.to_string());
                SyncResult::not_attempted(entity, e.to_string())
            }
            Err(e) if e.is_cancelled() => {
                info!(entity = entity.key(), attempts, "Sync stopped: {}", e);
                let mut result = SyncResult::failure(entity.key(), e.to_string());
                result.attempts = attempts;
                result.duration = started.elapsed();
                result
            }
            Err(e) => {
                error!(entity = entity.key(), attempts, "Sync failed: {}", e);
                self.tracker.fail_operation(operation_id, &e.to_string());
                let mut result = SyncResult::failure(entity.key(), e.to_string());
                result.attempts = attempts;
                result.duration = started.elapsed();
                result
            }
        };

        if !result.breaker_open && !cancelled {
            if result.success {
                self.health
                    .record_success(entity.key(), result.duration, result.synced_count);
            } else {
                self.health.record_failure(
                    entity.key(),
                    result.error_message.as_deref().unwrap_or("unknown error"),
                );
            }
        }
        info!("{}", result.summary());

        write(&self.latest).insert(entity, result.clone());
        result
    }

    /// Health, in-flight operations, latest results and breaker states
    pub fn status(&self) -> StatusReport {
        StatusReport {
            health: self.health.probe(),
            active_operations: self.tracker.active_operations(),
            latest_results: read(&self.latest).values().cloned().collect(),
            breakers: self.breakers.statuses(),
            integrity: read(&self.latest_integrity).clone(),
        }
    }

    /// Cancel a queued or in-flight operation.
    ///
    /// Items already dispatched finish, no new batch starts and a worker waiting for its next
    /// retry attempt is not started again.
    pub fn cancel(&self, operation_id: &str) -> Result<(), SyncError> {
        let in_flight = guard(&self.in_flight).contains(operation_id);
        match self.tracker.operation(operation_id) {
            Some(op) if op.cancelled => Err(SyncError::Validation(format!(
                "Operation {} is already cancelled",
                operation_id
            ))),
            Some(op) if !op.is_terminal() || in_flight => {
                info!("Cancelling operation {}", operation_id);
                self.tracker
                    .cancel_operation(operation_id, "Cancelled by operator");
                Ok(())
            }
            Some(_) => Err(SyncError::Validation(format!(
                "Operation {} has already finished",
                operation_id
            ))),
            None => Err(SyncError::Validation(format!(
                "Unknown operation {}",
                operation_id
            ))),
        }
    }

    pub fn latest_result(&self, entity: EntityType) -> Option<SyncResult> {
        read(&self.latest).get(&entity).cloned()
    }

    pub fn latest_integrity(&self) -> Option<IntegrityReport> {
        read(&self.latest_integrity).clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }
}

/// Tracker id of one entity type's operation within a session
pub fn operation_id(session_id: &str, entity: EntityType) -> String {
    format!("{}:{}", session_id, entity.key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BatchConfig, CircuitBreakerConfig, RetryConfig};
    use crate::source::{InMemorySource, RawPage, SourceError};
    use crate::store::EntityRepository;
    use crate::sync::health::HealthStatus;
    use serde_json::json;

    fn config(enabled: &[EntityType]) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.source.token = Some("secret".to_string());
        config.source.requests_per_second = 1000.0;
        config.retry = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            jitter: false,
            ..RetryConfig::default()
        };
        config.batch = BatchConfig {
            inter_batch_delay_ms: 0,
            ..BatchConfig::default()
        };
        if !enabled.is_empty() {
            config.entities = EntityType::ALL
                .into_iter()
                .map(|entity| (entity.key().to_string(), enabled.contains(&entity)))
                .collect();
        }
        config
    }

    fn unavailable() -> SourceError {
        SourceError::Status {
            status: 503,
            message: "Service Unavailable".to_string(),
        }
    }

    fn wrestler(id: &str, name: &str, fans: i64) -> RawPage {
        RawPage::new(id)
            .with("Name", json!(name))
            .with("Fans", json!(fans))
    }

    /// One or two pages for every entity type, all references resolvable
    fn full_source() -> InMemorySource {
        InMemorySource::new()
            .with_pages(
                EntityType::ShowTypes,
                vec![RawPage::new("st-1").with("Name", json!("Weekly"))],
            )
            .with_pages(
                EntityType::Seasons,
                vec![RawPage::new("season-1").with("Name", json!("Season 1"))],
            )
            .with_pages(
                EntityType::ShowTemplates,
                vec![RawPage::new("tpl-1")
                    .with("Name", json!("Monday Night"))
                    .with("Show Type", json!([{ "id": "st-1" }]))],
            )
            .with_pages(
                EntityType::Shows,
                vec![RawPage::new("show-1")
                    .with("Name", json!("Monday Night #1"))
                    .with("Show Type", json!("Weekly"))
                    .with("Season", json!([{ "id": "season-1" }]))
                    .with("Template", json!([{ "id": "tpl-1" }]))],
            )
            .with_pages(
                EntityType::Wrestlers,
                vec![
                    wrestler("w-1", "Shawn Michaels", 90_000),
                    wrestler("w-2", "Triple H", 88_000),
                ],
            )
            .with_pages(
                EntityType::Npcs,
                vec![RawPage::new("npc-1")
                    .with("Name", json!("Jim Ross"))
                    .with("Role", json!("Commentator"))],
            )
            .with_pages(
                EntityType::Factions,
                vec![RawPage::new("f-1")
                    .with("Name", json!("D-Generation X"))
                    .with("Members", json!([{ "id": "w-1" }, { "id": "w-2" }]))],
            )
            .with_pages(
                EntityType::Teams,
                vec![RawPage::new("team-1")
                    .with("Name", json!("DX"))
                    .with("Members", json!(["w-1", "w-2"]))
                    .with("Faction", json!([{ "id": "f-1" }]))],
            )
            .with_pages(
                EntityType::Titles,
                vec![RawPage::new("title-1").with("Name", json!("Tag Team Championship"))],
            )
            .with_pages(
                EntityType::Injuries,
                vec![RawPage::new("inj-1")
                    .with("Name", json!("Back injury"))
                    .with("Wrestler", json!([{ "id": "w-1" }]))],
            )
            .with_pages(
                EntityType::Rivalries,
                vec![RawPage::new("r-1")
                    .with("Name", json!("HBK vs HHH"))
                    .with("Wrestlers", json!(["w-1", "w-2"]))],
            )
            .with_pages(
                EntityType::Segments,
                vec![RawPage::new("seg-1")
                    .with("Name", json!("Street Fight"))
                    .with("Show", json!([{ "id": "show-1" }]))
                    .with("Segment Type", json!("Street Fight"))
                    .with("Participants", json!(["w-1", "w-2"]))
                    .with("Winners", json!(["w-1"]))],
            )
    }

    fn orchestrator(
        config: SyncConfig,
        source: &Arc<InMemorySource>,
    ) -> (SyncOrchestrator, Store) {
        let store = Store::in_memory();
        let orchestrator = SyncOrchestrator::with_store(config, source.clone(), store.clone());
        (orchestrator, store)
    }

    async fn record_counts(store: &Store) -> Vec<usize> {
        vec![
            store.show_types.count().await.expect("Failed while counting"),
            store.seasons.count().await.expect("Failed while counting"),
            store.show_templates.count().await.expect("Failed while counting"),
            store.shows.count().await.expect("Failed while counting"),
            store.wrestlers.count().await.expect("Failed while counting"),
            store.npcs.count().await.expect("Failed while counting"),
            store.factions.count().await.expect("Failed while counting"),
            store.teams.count().await.expect("Failed while counting"),
            store.titles.count().await.expect("Failed while counting"),
            store.injuries.count().await.expect("Failed while counting"),
            store.rivalries.count().await.expect("Failed while counting"),
            store.segments.count().await.expect("Failed while counting"),
        ]
    }

    #[tokio::test]
    async fn test_retried_producer_then_consumer() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(
            EntityType::Wrestlers,
            vec![wrestler("w-1", "Sting", 70_000), wrestler("w-2", "Lex Luger", 50_000)],
        );
        source.set_pages(
            EntityType::Factions,
            vec![RawPage::new("f-1")
                .with("Name", json!("The Wolfpac"))
                .with("Members", json!(["w-1", "w-2"]))],
        );
        source.fail_next(EntityType::Wrestlers, unavailable());
        source.fail_next(EntityType::Wrestlers, unavailable());
        let (orchestrator, store) = orchestrator(
            config(&[EntityType::Factions, EntityType::Wrestlers]),
            &source,
        );

        let report = orchestrator.run_all("tick-1").await;

        assert_eq!(report.order, vec![EntityType::Wrestlers, EntityType::Factions]);
        let wrestlers = report
            .result_for(EntityType::Wrestlers)
            .expect("Wrestlers should have run");
        assert!(wrestlers.success);
        assert_eq!(wrestlers.attempts, 3);
        let factions = report
            .result_for(EntityType::Factions)
            .expect("Factions should have run");
        assert!(factions.success);
        assert_eq!(factions.attempts, 1);

        assert_eq!(source.fetch_count(EntityType::Wrestlers), 3);
        let faction = store
            .factions
            .find_by_external_id("f-1")
            .await
            .expect("Failed while loading")
            .expect("Faction should exist");
        assert_eq!(faction.member_ids, vec![1, 2]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_unresolvable_records_are_partial_success() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(EntityType::Wrestlers, vec![wrestler("w-1", "Mick Foley", 60_000)]);
        let injuries = (0..10)
            .map(|i| {
                let owner = if i < 2 { "w-404" } else { "w-1" };
                RawPage::new(format!("inj-{}", i))
                    .with("Name", json!(format!("Injury {}", i)))
                    .with("Wrestler", json!([{ "id": owner }]))
            })
            .collect();
        source.set_pages(EntityType::Injuries, injuries);
        let (orchestrator, store) = orchestrator(
            config(&[EntityType::Wrestlers, EntityType::Injuries]),
            &source,
        );

        let report = orchestrator.run_all("tick-1").await;

        let result = report
            .result_for(EntityType::Injuries)
            .expect("Injuries should have run");
        assert_eq!(result.synced_count, 8);
        assert_eq!(result.error_count, 2);
        assert!(result.success);
        assert_eq!(store.injuries.count().await.expect("Failed while counting"), 8);
    }

    #[tokio::test]
    async fn test_full_run_is_idempotent() {
        let source = Arc::new(full_source());
        let (orchestrator, store) = orchestrator(config(&[]), &source);

        let first = orchestrator.run_all("tick-1").await;
        let after_first = record_counts(&store).await;
        let second = orchestrator.run_all("tick-2").await;
        let after_second = record_counts(&store).await;

        assert!(first.is_success(), "{:?}", first.results);
        assert!(second.is_success(), "{:?}", second.results);
        assert_eq!(first.order.len(), EntityType::ALL.len());
        assert_eq!(after_first, vec![1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(after_first, after_second);
        assert!(second.results.iter().all(|r| r.created_count == 0));
    }

    #[tokio::test]
    async fn test_changed_field_updates_existing_record() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(EntityType::Wrestlers, vec![wrestler("w-1", "The Undertaker", 100)]);
        let (orchestrator, store) = orchestrator(config(&[EntityType::Wrestlers]), &source);

        orchestrator.run_all("tick-1").await;
        let before = store
            .wrestlers
            .find_by_external_id("w-1")
            .await
            .expect("Failed while loading")
            .expect("Wrestler should exist");
        assert_eq!(before.fans, Some(100));

        source.set_pages(EntityType::Wrestlers, vec![wrestler("w-1", "The Undertaker", 200)]);
        let report = orchestrator.run_all("tick-2").await;

        let result = report
            .result_for(EntityType::Wrestlers)
            .expect("Wrestlers should have run");
        assert_eq!((result.created_count, result.updated_count), (0, 1));
        let all = store.wrestlers.find_all().await.expect("Failed while listing");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fans, Some(200));
    }

    #[tokio::test]
    async fn test_session_skips_synced_entities() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(EntityType::Titles, vec![RawPage::new("t-1").with("Name", json!("IC"))]);
        source.fail_next(
            EntityType::Npcs,
            SourceError::Status {
                status: 400,
                message: "Bad Request".to_string(),
            },
        );
        let (orchestrator, _) = orchestrator(
            config(&[EntityType::Titles, EntityType::Npcs]),
            &source,
        );

        let first = orchestrator.run_all("tick-1").await;
        let second = orchestrator.run_all("tick-1").await;

        assert_eq!(first.order, vec![EntityType::Npcs, EntityType::Titles]);
        assert_eq!(first.failed_count(), 1);
        // The failed entity type is retried within the session, the synced one is not.
        assert_eq!(second.order, vec![EntityType::Npcs]);
        assert!(second.skipped.contains(&SkippedEntity {
            entity: EntityType::Titles,
            reason: "already synced in this session".to_string(),
        }));
        assert_eq!(source.fetch_count(EntityType::Titles), 1);
        assert_eq!(source.fetch_count(EntityType::Npcs), 2);
    }

    #[tokio::test]
    async fn test_configuration_error_runs_nothing() {
        let source = Arc::new(full_source());
        let mut config = config(&[]);
        config.source.token = None;
        let (orchestrator, _) = orchestrator(config, &source);

        let report = orchestrator.run_all("tick-1").await;

        assert!(report.configuration_error.is_some());
        assert!(report.results.is_empty());
        assert!(!report.is_success());
        assert_eq!(source.fetch_count(EntityType::ShowTypes), 0);
        assert!(report.summary().contains("not started"));
    }

    #[tokio::test]
    async fn test_cyclic_graph_runs_nothing() {
        let source = Arc::new(full_source());
        let (orchestrator, _) = orchestrator(config(&[]), &source);
        let mut analyzer = entity_dependencies();
        analyzer.declare(EntityType::Segments, [EntityType::ShowTypes]);
        let orchestrator = orchestrator.with_dependencies(analyzer);

        let report = orchestrator.run_all("tick-1").await;

        let error = report
            .configuration_error
            .expect("A cycle should be reported");
        assert!(error.contains("Cyclic"));
        assert_eq!(source.fetch_count(EntityType::ShowTypes), 0);
    }

    #[tokio::test]
    async fn test_open_breaker_is_not_attempted_and_not_recorded() {
        let source = Arc::new(InMemorySource::new());
        source.fail_next(EntityType::Titles, unavailable());
        let mut config = config(&[EntityType::Titles]);
        config.retry.max_attempts = 1;
        config.circuit_breaker = CircuitBreakerConfig {
            failure_threshold: 1,
            recovery_timeout_ms: 60_000,
            ..CircuitBreakerConfig::default()
        };
        let (orchestrator, _) = orchestrator(config, &source);

        let first = orchestrator.run_all("tick-1").await;
        let second = orchestrator.run_all("tick-2").await;

        assert!(!first.results[0].breaker_open);
        assert_eq!(first.results[0].attempts, 1);
        let refused = &second.results[0];
        assert!(refused.breaker_open);
        assert!(!refused.success);
        assert_eq!(refused.attempts, 0);
        assert_eq!(source.fetch_count(EntityType::Titles), 1);
        assert_eq!(orchestrator.health().history_len(), 1);
        assert_eq!(
            orchestrator.breakers().status(EntityType::Titles.key()),
            CircuitStatus::Open
        );
    }

    #[tokio::test]
    async fn test_run_one_by_key() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(EntityType::Npcs, vec![RawPage::new("npc-1").with("Name", json!("Tony Schiavone"))]);
        let (orchestrator, store) = orchestrator(config(&[]), &source);

        let result = orchestrator.run_one_by_key("NPCs").await;
        assert!(result.success);
        assert_eq!(store.npcs.count().await.expect("Failed while counting"), 1);

        let unknown = orchestrator.run_one_by_key("managers").await;
        assert!(!unknown.success);
        assert_eq!(unknown.entity_type, "managers");
        assert!(
            unknown
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("Unknown entity type"))
        );
        assert!(orchestrator.sessions().active_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_run_one_respects_entity_switch() {
        let source = Arc::new(InMemorySource::new());
        let (orchestrator, _) = orchestrator(config(&[EntityType::Wrestlers]), &source);

        let result = orchestrator.run_one(EntityType::Segments).await;

        assert!(!result.success);
        assert_eq!(source.fetch_count(EntityType::Segments), 0);
    }

    #[tokio::test]
    async fn test_status_reports_latest_results() {
        let source = Arc::new(full_source());
        let (orchestrator, _) = orchestrator(config(&[]), &source);

        let report = orchestrator.run_manual().await;
        let status = orchestrator.status();

        assert!(report.is_success());
        assert_eq!(status.health.status, HealthStatus::Up);
        assert_eq!(status.latest_results.len(), EntityType::ALL.len());
        assert_eq!(status.latest_results[0].entity_type, "show-types");
        assert!(status.active_operations.is_empty());
        assert!(
            status
                .breakers
                .iter()
                .all(|(_, status)| *status == CircuitStatus::Closed)
        );
        assert!(
            orchestrator
                .latest_result(EntityType::Segments)
                .is_some_and(|r| r.synced_count == 1)
        );
        let integrity = status.integrity.expect("Integrity should have been checked");
        assert!(integrity.valid, "{:?}", integrity.errors);
        assert_eq!(integrity.statistics.get("wrestlers"), Some(&2));
        assert_eq!(report.integrity, Some(integrity));
    }

    #[tokio::test]
    async fn test_integrity_reports_dangling_reference() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(
            EntityType::Titles,
            vec![RawPage::new("t-1").with("Name", json!("Hardcore Championship"))],
        );
        let (orchestrator, store) = orchestrator(config(&[EntityType::Titles]), &source);
        store
            .segments
            .save(crate::store::Segment {
                name: "Orphaned match".to_string(),
                show_id: 404,
                ..crate::store::Segment::default()
            })
            .await
            .expect("Failed while seeding");

        let report = orchestrator.run_all("tick-1").await;

        let integrity = report.integrity.expect("Integrity should have been checked");
        assert!(!integrity.valid);
        assert!(
            integrity
                .errors
                .contains(&"1 segments referencing a missing show".to_string())
        );
        assert_eq!(orchestrator.latest_integrity(), Some(integrity));
    }

    #[tokio::test]
    async fn test_nothing_attempted_skips_integrity() {
        let source = Arc::new(full_source());
        let mut config = config(&[]);
        config.source.token = None;
        let (orchestrator, _) = orchestrator(config, &source);

        let report = orchestrator.run_all("tick-1").await;

        assert!(report.integrity.is_none());
        assert!(orchestrator.status().integrity.is_none());
    }

    #[tokio::test]
    async fn test_cancel_requires_active_operation() {
        let source = Arc::new(InMemorySource::new());
        let (orchestrator, _) = orchestrator(config(&[EntityType::Titles]), &source);

        assert!(orchestrator.cancel("nope").is_err());

        orchestrator
            .tracker()
            .prepare_operation("manual:titles", "Sync Titles", SYNC_STEPS);
        orchestrator
            .cancel("manual:titles")
            .expect("Failed while cancelling");
        assert!(orchestrator.tracker().is_cancelled("manual:titles"));
        assert!(orchestrator.cancel("manual:titles").is_err());

        orchestrator
            .tracker()
            .start_operation("manual:npcs", "Sync NPCs", SYNC_STEPS);
        orchestrator
            .tracker()
            .complete_operation("manual:npcs", true, "done", 1);
        assert!(orchestrator.cancel("manual:npcs").is_err());
    }

    #[tokio::test]
    async fn test_cancelled_queued_operation_is_never_started() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(
            EntityType::Titles,
            vec![RawPage::new("t-1").with("Name", json!("European Championship"))],
        );
        let mut config = config(&[EntityType::Titles]);
        config.circuit_breaker.failure_threshold = 1;
        let (orchestrator, store) = orchestrator(config, &source);
        let operation = operation_id("tick-1", EntityType::Titles);
        orchestrator
            .tracker()
            .prepare_operation(&operation, "Sync Titles", SYNC_STEPS);
        orchestrator
            .cancel(&operation)
            .expect("Failed while cancelling");

        let report = orchestrator.run_all("tick-1").await;

        let result = report
            .result_for(EntityType::Titles)
            .expect("Titles should have been attempted");
        assert!(!result.success);
        assert_eq!(source.fetch_count(EntityType::Titles), 0);
        assert_eq!(store.titles.count().await.expect("Failed while counting"), 0);
        assert_eq!(orchestrator.health().history_len(), 0);
        assert_eq!(
            orchestrator.breakers().status(EntityType::Titles.key()),
            CircuitStatus::Closed
        );
        let op = orchestrator
            .tracker()
            .operation(&operation)
            .expect("Operation should exist");
        assert_eq!(op.status, crate::sync::OperationStatus::Failed);
        assert_eq!(op.result_message.as_deref(), Some("Cancelled by operator"));
    }

    #[tokio::test]
    async fn test_cancel_during_retry_backoff_stops_retries() {
        let source = Arc::new(InMemorySource::new());
        source.set_pages(
            EntityType::Titles,
            vec![RawPage::new("t-1").with("Name", json!("Cruiserweight Championship"))],
        );
        source.fail_next(EntityType::Titles, unavailable());
        let mut config = config(&[EntityType::Titles]);
        config.retry.initial_delay_ms = 400;
        config.retry.max_delay_ms = 400;
        let (orchestrator, store) = orchestrator(config, &source);
        let orchestrator = Arc::new(orchestrator);
        let operation = operation_id("tick-1", EntityType::Titles);

        let running = orchestrator.clone();
        let handle = tokio::spawn(async move { running.run_all("tick-1").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator
            .cancel(&operation)
            .expect("Failed while cancelling");
        let report = handle.await.expect("Failed while joining the run");

        let result = report
            .result_for(EntityType::Titles)
            .expect("Titles should have been attempted");
        assert!(!result.success);
        assert_eq!(result.attempts, 2);
        assert_eq!(source.fetch_count(EntityType::Titles), 1);
        assert_eq!(store.titles.count().await.expect("Failed while counting"), 0);
        assert_eq!(orchestrator.health().history_len(), 0);
        assert_eq!(
            orchestrator
                .breakers()
                .breaker(EntityType::Titles.key())
                .snapshot()
                .consecutive_failures,
            0
        );
    }
}
