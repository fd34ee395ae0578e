//! Outbound request throttling for the content source.

use super::types::*;
use super::ContentSource;
use crate::sync::EntityType;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Spaces permits at least `1 / requests_per_second` apart.
///
/// Callers block in `acquire` until their slot comes up; the internal lock is released before
/// sleeping so waiters queue behind each other in slot order.
pub struct RateLimiter {
	interval: Duration,
	next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
	pub fn new(requests_per_second: f64) -> Self {
		let interval = if requests_per_second > 0.0 {
			Duration::from_secs_f64(1.0 / requests_per_second)
		} else {
			Duration::ZERO
		};
		Self {
			interval,
			next_slot: Mutex::new(None),
		}
	}

	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Wait until a request is allowed
	pub async fn acquire(&self) {
		let wait = {
			let mut next_slot = self.next_slot.lock().await;
			let now = Instant::now();
			let slot = next_slot.map_or(now, |next| next.max(now));
			*next_slot = Some(slot + self.interval);
			slot - now
		};

		if !wait.is_zero() {
			debug!("Waiting {}ms for rate limit permit", wait.as_millis());
			tokio::time::sleep(wait).await;
		}
	}
}

/// Decorates a content source so every request first acquires a rate-limit permit.
///
/// Only `fetch_page` and `fetch_one` are wrapped; the inherited `fetch_all` walks the cursor chain
/// through the wrapped `fetch_page`, one permit per batch.
pub struct RateLimitedSource {
	inner: Arc<dyn ContentSource>,
	limiter: Arc<RateLimiter>,
}

impl RateLimitedSource {
	pub fn new(inner: Arc<dyn ContentSource>, limiter: Arc<RateLimiter>) -> Self {
		Self { inner, limiter }
	}
}

#[async_trait::async_trait]
impl ContentSource for RateLimitedSource {
	async fn fetch_page(
		&self,
		entity: EntityType,
		cursor: Option<&str>,
	) -> Result<PageBatch, SourceError> {
		self.limiter.acquire().await;
		self.inner.fetch_page(entity, cursor).await
	}

	async fn fetch_one(
		&self,
		entity: EntityType,
		id: &str,
	) -> Result<Option<RawPage>, SourceError> {
		self.limiter.acquire().await;
		self.inner.fetch_one(entity, id).await
	}

	fn name(&self) -> &'static str {
		self.inner.name()
	}
}
