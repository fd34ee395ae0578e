//! Content-source integration
//!
//! The content source is an external, rate-limited workspace API that serves entity pages by
//! entity type and id. This module provides the narrow `RawPage` adapter the converters read
//! through, the `ContentSource` trait the engine fetches through, and the HTTP, in-memory and
//! rate-limited implementations of it.

/// HTTP client for the content workspace API
mod client;
/// In-memory source used for offline runs and tests
mod memory;
/// Outbound request throttling
mod rate_limiter;
/// Raw page adapter and source errors
mod types;

pub use client::HttpContentSource;
pub use memory::InMemorySource;
pub use rate_limiter::{RateLimitedSource, RateLimiter};
pub use types::*;

use crate::sync::EntityType;
use tracing::debug;

/// Client for fetching raw entity pages from the content source.
///
/// A source serves an entity type as a chain of cursor-linked batches. `fetch_all` walks the chain
/// through `fetch_page`, so a decorator wrapping `fetch_page` sees every request.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch one batch of pages. `cursor` is `None` for the first batch.
    async fn fetch_page(
        &self,
        entity: EntityType,
        cursor: Option<&str>,
    ) -> Result<PageBatch, SourceError>;

    /// Fetch every page of an entity type
    async fn fetch_all(&self, entity: EntityType) -> Result<Vec<RawPage>, SourceError> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let batch = self.fetch_page(entity, cursor.as_deref()).await?;
            pages.extend(batch.pages);

            match batch.next_cursor {
                Some(next) if !next.is_empty() => {
                    if cursor.as_deref() == Some(next.as_str()) {
                        return Err(SourceError::InvalidResponse(format!(
                            "Cursor {} for {} did not advance",
                            next,
                            entity.key()
                        )));
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        debug!("Fetched {} {} pages from {}", pages.len(), entity.key(), self.name());
        Ok(pages)
    }

    /// Fetch a single page, `None` when the source does not know the id
    async fn fetch_one(&self, entity: EntityType, id: &str)
    -> Result<Option<RawPage>, SourceError>;

    /// Get the name of this source for logging and diagnostics.
    fn name(&self) -> &'static str;
}
