//! In-memory content source.
//!
//! Serves pages from memory and can be scripted to fail the next N fetches of an entity type,
//! which makes retry and breaker behavior reproducible without a network.

use super::types::*;
use super::ContentSource;
use crate::sync::EntityType;
use crate::sync::locks::guard;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemorySource {
    pages: Mutex<HashMap<EntityType, Vec<RawPage>>>,
    scripted_failures: Mutex<HashMap<EntityType, VecDeque<SourceError>>>,
    fetch_counts: Mutex<HashMap<EntityType, u32>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pages served for an entity type
    pub fn set_pages(&self, entity: EntityType, pages: Vec<RawPage>) {
        guard(&self.pages).insert(entity, pages);
    }

    pub fn with_pages(self, entity: EntityType, pages: Vec<RawPage>) -> Self {
        self.set_pages(entity, pages);
        self
    }

    /// Make the next listing of `entity` fail with `error`. Calls queue up.
    pub fn fail_next(&self, entity: EntityType, error: SourceError) {
        guard(&self.scripted_failures)
            .entry(entity)
            .or_default()
            .push_back(error);
    }

    /// Number of listings started for an entity type, failed ones included
    pub fn fetch_count(&self, entity: EntityType) -> u32 {
        guard(&self.fetch_counts).get(&entity).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl ContentSource for InMemorySource {
    /// Every page comes back in the first batch
    async fn fetch_page(
        &self,
        entity: EntityType,
        cursor: Option<&str>,
    ) -> Result<PageBatch, SourceError> {
        if cursor.is_some() {
            return Ok(PageBatch::default());
        }
        *guard(&self.fetch_counts).entry(entity).or_insert(0) += 1;

        if let Some(error) = guard(&self.scripted_failures)
            .get_mut(&entity)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        Ok(PageBatch {
            pages: guard(&self.pages).get(&entity).cloned().unwrap_or_default(),
            next_cursor: None,
        })
    }

    async fn fetch_one(
        &self,
        entity: EntityType,
        id: &str,
    ) -> Result<Option<RawPage>, SourceError> {
        Ok(guard(&self.pages)
            .get(&entity)
            .and_then(|pages| pages.iter().find(|page| page.id == id).cloned()))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}
