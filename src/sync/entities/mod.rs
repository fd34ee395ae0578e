//! Entity mappings and the default worker set.
//!
//! Each submodule defines the transfer object of one entity type, its conversion from a raw page
//! and the merge rules that decide which fields the content source owns. References to other
//! entity types are resolved against records that have already been synchronized, by external id
//! and then by name.

mod factions;
mod injuries;
mod npcs;
mod rivalries;
mod seasons;
mod segments;
mod show_types;
mod shows;
mod teams;
mod titles;
mod wrestlers;

pub use factions::{FactionMapping, FactionTransfer};
pub use injuries::{InjuryMapping, InjuryTransfer};
pub use npcs::{NpcMapping, NpcTransfer};
pub use rivalries::{RivalryMapping, RivalryTransfer};
pub use seasons::{SeasonMapping, SeasonTransfer};
pub use segments::{SegmentMapping, SegmentTransfer};
pub use show_types::{ShowTemplateMapping, ShowTemplateTransfer, ShowTypeMapping, ShowTypeTransfer};
pub use shows::{ShowMapping, ShowTransfer};
pub use teams::{TeamMapping, TeamTransfer};
pub use titles::{TitleMapping, TitleTransfer};
pub use wrestlers::{WrestlerMapping, WrestlerTransfer};

use super::batch::BatchProcessor;
use super::progress_tracker::ProgressTracker;
use super::reconcile::{EntityMapping, Reconciler};
use super::types::SyncError;
use super::worker::{EntitySyncWorker, MappedWorker};
use crate::config::BatchConfig;
use crate::source::{ContentSource, RawPage};
use crate::store::{EntityRepository, Record, Store};
use std::sync::Arc;
use tracing::warn;

/// Shared collaborators of the entity workers
#[derive(Clone)]
pub struct WorkerContext {
    pub source: Arc<dyn ContentSource>,
    pub store: Store,
    pub tracker: Arc<ProgressTracker>,
    pub batch: Arc<BatchProcessor>,
    pub batch_config: BatchConfig,
}

impl WorkerContext {
    pub fn worker<M: EntityMapping>(
        &self,
        mapping: M,
        repository: Arc<dyn EntityRepository<M::Record>>,
    ) -> Arc<dyn EntitySyncWorker> {
        Arc::new(MappedWorker::new(
            Reconciler::new(mapping, repository),
            self.source.clone(),
            self.tracker.clone(),
            self.batch.clone(),
            &self.batch_config,
        ))
    }
}

/// One worker per built-in entity type
pub fn default_workers(context: &WorkerContext) -> Vec<Arc<dyn EntitySyncWorker>> {
    let store = &context.store;
    vec![
        context.worker(ShowTypeMapping, store.show_types.clone()),
        context.worker(SeasonMapping, store.seasons.clone()),
        context.worker(
            ShowTemplateMapping::new(store.clone()),
            store.show_templates.clone(),
        ),
        context.worker(ShowMapping::new(store.clone()), store.shows.clone()),
        context.worker(WrestlerMapping, store.wrestlers.clone()),
        context.worker(NpcMapping, store.npcs.clone()),
        context.worker(FactionMapping::new(store.clone()), store.factions.clone()),
        context.worker(TeamMapping::new(store.clone()), store.teams.clone()),
        context.worker(TitleMapping, store.titles.clone()),
        context.worker(InjuryMapping::new(store.clone()), store.injuries.clone()),
        context.worker(RivalryMapping::new(store.clone()), store.rivalries.clone()),
        context.worker(SegmentMapping::new(store.clone()), store.segments.clone()),
    ]
}

/// References held by a property: related page ids, or names when the source only gives names
pub(crate) fn references(page: &RawPage, property: &str) -> Vec<String> {
    let ids = page.relation_ids(property);
    if ids.is_empty() {
        page.list(property)
    } else {
        ids
    }
}

/// Local id of a referenced record, looked up by external id and then by name
pub(crate) async fn resolve<R, Repo>(
    repository: &Repo,
    reference: &str,
) -> Result<Option<u64>, SyncError>
where
    R: Record,
    Repo: EntityRepository<R> + ?Sized,
{
    if let Some(record) = repository.find_by_external_id(reference).await? {
        return Ok(record.local_id());
    }
    Ok(repository
        .find_by_natural_key(reference)
        .await?
        .and_then(|record| record.local_id()))
}

/// Resolve a reference the record cannot exist without
pub(crate) async fn require<R, Repo>(
    repository: &Repo,
    reference: Option<&str>,
    what: &str,
    owner: &str,
) -> Result<u64, SyncError>
where
    R: Record,
    Repo: EntityRepository<R> + ?Sized,
{
    let Some(reference) = reference else {
        return Err(SyncError::UnresolvedReference(format!(
            "{} has no {}",
            owner, what
        )));
    };
    resolve(repository, reference).await?.ok_or_else(|| {
        SyncError::UnresolvedReference(format!("{} '{}' of {} not found", what, reference, owner))
    })
}

/// Resolve every reference, skipping the ones that are not known locally
pub(crate) async fn resolve_known<R, Repo>(
    repository: &Repo,
    references: &[String],
    what: &str,
    owner: &str,
) -> Result<Vec<u64>, SyncError>
where
    R: Record,
    Repo: EntityRepository<R> + ?Sized,
{
    let mut ids = Vec::with_capacity(references.len());
    for reference in references {
        match resolve(repository, reference).await? {
            Some(id) if !ids.contains(&id) => ids.push(id),
            Some(_) => {}
            None => warn!("Skipping unknown {} '{}' of {}", what, reference, owner),
        }
    }
    Ok(ids)
}

/// Resolve every reference, failing on the first unknown one
pub(crate) async fn resolve_all<R, Repo>(
    repository: &Repo,
    references: &[String],
    what: &str,
    owner: &str,
) -> Result<Vec<u64>, SyncError>
where
    R: Record,
    Repo: EntityRepository<R> + ?Sized,
{
    let mut ids = Vec::with_capacity(references.len());
    for reference in references {
        let id = require(repository, Some(reference), what, owner).await?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Non-negative integer property that fits in `u32`
pub(crate) fn count(page: &RawPage, property: &str) -> Option<u32> {
    page.integer(property)
        .and_then(|value| u32::try_from(value).ok())
}

/// Integer property that fits in `i32`
pub(crate) fn stat(page: &RawPage, property: &str) -> Option<i32> {
    page.integer(property)
        .and_then(|value| i32::try_from(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryRepository, Wrestler};
    use serde_json::json;

    async fn wrestlers() -> InMemoryRepository<Wrestler> {
        let repository = InMemoryRepository::<Wrestler>::new();
        repository
            .save(Wrestler {
                external_id: Some("w-1".to_string()),
                name: "Rob Van Dam".to_string(),
                ..Wrestler::default()
            })
            .await
            .expect("Failed while seeding");
        repository
            .save(Wrestler {
                name: "Sabu".to_string(),
                ..Wrestler::default()
            })
            .await
            .expect("Failed while seeding");
        repository
    }

    #[test]
    fn test_references_prefer_relation_ids() {
        let page = RawPage::new("p")
            .with("Members", json!([{ "id": "w-1" }, { "id": "w-2" }]))
            .with("Names", json!([{ "name": "Sabu" }]));

        assert_eq!(references(&page, "Members"), vec!["w-1", "w-2"]);
        assert_eq!(references(&page, "Names"), vec!["Sabu"]);
        assert!(references(&page, "Missing").is_empty());
    }

    #[tokio::test]
    async fn test_resolve_by_external_id_then_name() {
        let repository = wrestlers().await;

        assert_eq!(
            resolve(&repository, "w-1").await.expect("Failed while resolving"),
            Some(1)
        );
        assert_eq!(
            resolve(&repository, "Sabu").await.expect("Failed while resolving"),
            Some(2)
        );
        assert_eq!(
            resolve(&repository, "Taz").await.expect("Failed while resolving"),
            None
        );
    }

    #[tokio::test]
    async fn test_require_reports_unresolved_reference() {
        let repository = wrestlers().await;

        let missing = require(&repository, Some("Taz"), "wrestler", "Injury 'Bad knee'").await;
        let absent = require(&repository, None, "wrestler", "Injury 'Bad knee'").await;

        assert!(matches!(missing, Err(SyncError::UnresolvedReference(_))));
        assert!(matches!(absent, Err(SyncError::UnresolvedReference(_))));
    }

    #[tokio::test]
    async fn test_resolve_known_skips_and_deduplicates() {
        let repository = wrestlers().await;
        let references = vec![
            "w-1".to_string(),
            "Taz".to_string(),
            "Rob Van Dam".to_string(),
            "Sabu".to_string(),
        ];

        let ids = resolve_known(&repository, &references, "member", "ECW")
            .await
            .expect("Failed while resolving");
        assert_eq!(ids, vec![1, 2]);

        let strict = resolve_all(&repository, &references, "member", "ECW").await;
        assert!(matches!(strict, Err(SyncError::UnresolvedReference(_))));
    }
}
