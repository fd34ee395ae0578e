//! Fixed-interval scheduler
//!
//! Each tick runs the orchestrator in a fresh session and ends the session afterwards. Ticks
//! never overlap: the next delay starts counting once the previous run has returned.

use super::orchestrator::{RunReport, SyncOrchestrator};
use crate::config::SchedulerConfig;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct SyncScheduler {
	orchestrator: Arc<SyncOrchestrator>,
	config: SchedulerConfig,
}

impl SyncScheduler {
	pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
		let config = orchestrator.config().scheduler.clone();
		Self {
			orchestrator,
			config,
		}
	}

	/// Delay before the tick after `base`, with up to `jitter_secs` added
	fn delay(&self, base: Duration) -> Duration {
		if self.config.jitter_secs == 0 {
			return base;
		}
		let jitter_ms = rand::rng().random_range(0..=self.config.jitter_secs * 1000);
		base + Duration::from_millis(jitter_ms)
	}

	/// Run one scheduled tick
	pub async fn tick(&self) -> RunReport {
		let sessions = self.orchestrator.sessions();
		let session_id = sessions.new_session_id("scheduled");
		let report = self.orchestrator.run_all(&session_id).await;
		sessions.end_session(&session_id);

		let pruned = self
			.orchestrator
			.tracker()
			.prune_completed(Duration::from_secs(self.config.interval_secs.saturating_mul(24)));
		if pruned > 0 {
			debug!("Pruned {} finished operations", pruned);
		}
		report
	}

	/// Tick until a shutdown signal arrives. Returns the number of completed ticks.
	pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> usize {
		if !self.config.enabled {
			info!("Scheduled sync is disabled");
			return 0;
		}

		let interval = Duration::from_secs(self.config.interval_secs);
		let mut next = self.delay(Duration::from_secs(self.config.initial_delay_secs));
		let mut ticks = 0;
		info!(
			"Scheduled sync every {}s, first run in {:.0}s",
			self.config.interval_secs,
			next.as_secs_f64()
		);

		loop {
			tokio::select! {
				_ = tokio::time::sleep(next) => {
					let report = self.tick().await;
					ticks += 1;
					if !report.is_success() {
						warn!("Scheduled sync finished with problems: {}", report.summary());
					}
					next = self.delay(interval);
				}
				_ = shutdown.recv() => {
					info!("Scheduler shutting down after {} runs", ticks);
					return ticks;
				}
			}
		}
	}
}
