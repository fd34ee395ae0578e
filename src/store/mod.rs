//! Local persistence for synchronized entities
//!
//! The engine persists through per-entity repositories offering lookup by external id, lookup by
//! natural key and save. Repositories enforce uniqueness of the external id within an entity type
//! but offer no transactions spanning entity types.

/// Local entity records
pub mod records;
/// Repository traits and the in-memory implementation
pub mod repositories;

pub use records::*;
pub use repositories::*;

use std::sync::Arc;

/// Handles to every entity repository, shared by the entity workers
#[derive(Clone)]
pub struct Store {
    pub show_types: Arc<dyn EntityRepository<ShowType>>,
    pub seasons: Arc<dyn EntityRepository<Season>>,
    pub show_templates: Arc<dyn EntityRepository<ShowTemplate>>,
    pub shows: Arc<dyn EntityRepository<Show>>,
    pub wrestlers: Arc<dyn EntityRepository<Wrestler>>,
    pub npcs: Arc<dyn EntityRepository<Npc>>,
    pub factions: Arc<dyn EntityRepository<Faction>>,
    pub teams: Arc<dyn EntityRepository<Team>>,
    pub titles: Arc<dyn EntityRepository<Title>>,
    pub injuries: Arc<dyn EntityRepository<Injury>>,
    pub rivalries: Arc<dyn EntityRepository<Rivalry>>,
    pub segments: Arc<dyn EntityRepository<Segment>>,
}

impl Store {
    /// A store backed entirely by in-memory repositories
    pub fn in_memory() -> Self {
        Self {
            show_types: Arc::new(InMemoryRepository::new()),
            seasons: Arc::new(InMemoryRepository::new()),
            show_templates: Arc::new(InMemoryRepository::new()),
            shows: Arc::new(InMemoryRepository::new()),
            wrestlers: Arc::new(InMemoryRepository::new()),
            npcs: Arc::new(InMemoryRepository::new()),
            factions: Arc::new(InMemoryRepository::new()),
            teams: Arc::new(InMemoryRepository::new()),
            titles: Arc::new(InMemoryRepository::new()),
            injuries: Arc::new(InMemoryRepository::new()),
            rivalries: Arc::new(InMemoryRepository::new()),
            segments: Arc::new(InMemoryRepository::new()),
        }
    }
}
