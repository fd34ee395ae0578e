//! Entity sync workers.
//!
//! A worker runs the fetch, validate, convert and reconcile pipeline for one entity type and
//! reports it as a three-step operation on the progress tracker. Pages rejected by validation
//! count as record errors.

use super::batch::{BatchProcessor, ProgressContext};
use super::page_validation::validate_pages;
use super::progress_tracker::{LogLevel, ProgressTracker};
use super::reconcile::{EntityMapping, Reconciler, UpsertOutcome};
use super::types::{EntityType, SyncError, SyncResult};
use crate::config::BatchConfig;
use crate::source::ContentSource;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Steps reported for every entity sync operation
pub const SYNC_STEPS: u32 = 3;

/// Trait for synchronizing one entity type
#[async_trait::async_trait]
pub trait EntitySyncWorker: Send + Sync {
	fn entity_type(&self) -> EntityType;

	/// Run one synchronization, tracked under `operation_id`
	async fn sync(&self, operation_id: &str) -> Result<SyncResult, SyncError>;
}

/// Worker driven by an entity mapping
pub struct MappedWorker<M: EntityMapping> {
	reconciler: Reconciler<M>,
	source: Arc<dyn ContentSource>,
	tracker: Arc<ProgressTracker>,
	batch: Arc<BatchProcessor>,
	batch_size: usize,
	max_record_error_ratio: f64,
}

impl<M: EntityMapping> MappedWorker<M> {
	pub fn new(
		reconciler: Reconciler<M>,
		source: Arc<dyn ContentSource>,
		tracker: Arc<ProgressTracker>,
		batch: Arc<BatchProcessor>,
		config: &BatchConfig,
	) -> Self {
		Self {
			reconciler,
			source,
			tracker,
			batch,
			batch_size: config.batch_size,
			max_record_error_ratio: config.max_record_error_ratio,
		}
	}
}

#[async_trait::async_trait]
impl<M: EntityMapping> EntitySyncWorker for MappedWorker<M> {
	fn entity_type(&self) -> EntityType {
		self.reconciler.entity_type()
	}

	async fn sync(&self, operation_id: &str) -> Result<SyncResult, SyncError> {
		let entity = self.entity_type();
		let started = Instant::now();
		if !self.tracker.start_operation(
			operation_id,
			&format!("Sync {}", entity.display_name()),
			SYNC_STEPS,
		) {
			return Err(SyncError::Cancelled(format!(
				"{} sync was cancelled before it started",
				entity.display_name()
			)));
		}

		let pages = match self.source.fetch_all(entity).await {
			Ok(pages) => pages,
			Err(e) => {
				let error = SyncError::from(e);
				self.tracker.fail_operation(
					operation_id,
					&format!("Fetching {} failed: {}", entity.display_name(), error),
				);
				return Err(error);
			}
		};
		info!("Fetched {} {} pages from {}", pages.len(), entity, self.source.name());
		self.tracker.update_progress(
			operation_id,
			1,
			&format!("Fetched {} {}", pages.len(), entity.display_name()),
		);

		let validation = validate_pages(entity, pages);
		for warning in &validation.warnings {
			warn!(entity = entity.key(), "{}", warning);
			self.tracker.log_message(operation_id, LogLevel::Warn, warning);
		}
		for rejected in &validation.rejected {
			warn!(entity = entity.key(), page = %rejected.page_id, "Rejected page: {}", rejected.reason);
			self.tracker
				.log_message(operation_id, LogLevel::Error, &rejected.reason);
		}
		let rejected = validation.rejected.len();

		let description = format!("Reconciling {}", entity.display_name());
		let outcome = self
			.batch
			.process(
				validation.accepted,
				|page| self.reconciler.reconcile_page(page),
				self.batch_size,
				ProgressContext {
					operation_id,
					step: 2,
					description: &description,
				},
			)
			.await?;

		let total = outcome.total + rejected;
		let mut result = SyncResult::success(entity, 0, 0, outcome.failures.len() + rejected);
		for upsert in &outcome.results {
			if upsert.is_created() {
				result.created_count += 1;
			} else {
				result.updated_count += 1;
			}
			match upsert {
				UpsertOutcome::MergedByNaturalKey => result.merged_by_natural_key += 1,
				UpsertOutcome::CreatedAfterCollision => result.natural_key_collisions += 1,
				UpsertOutcome::Created | UpsertOutcome::Updated => {}
			}
		}
		result.synced_count = result.created_count + result.updated_count;
		result.duration = started.elapsed();

		let error_ratio = if total == 0 {
			0.0
		} else {
			result.error_count as f64 / total as f64
		};
		if error_ratio > self.max_record_error_ratio {
			warn!(
				entity = entity.key(),
				errors = result.error_count,
				total,
				"Too many records failed"
			);
			result.success = false;
			result.error_message = Some(format!("{} of {} records failed", result.error_count, total));
		}

		self.tracker.complete_operation(
			operation_id,
			result.success,
			&result.summary(),
			result.synced_count,
		);
		Ok(result)
	}
}
