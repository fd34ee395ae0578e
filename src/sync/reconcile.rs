//! Upsert reconciliation of transfer objects against local records.
//!
//! A transfer object is matched to a local record by external id first. When no record carries
//! that external id the natural key (the name) is tried, so records created before correlation
//! tracking get adopted instead of duplicated. A name match that already belongs to a different
//! external record is a collision: it is logged and counted, and a new record is created.
//!
//! Reconciliations of the same external id, and of the same natural key, are serialized through
//! keyed locks so the find-then-save sequence never interleaves.

use super::locks::KeyedLocks;
use super::types::{EntityType, SyncError};
use crate::source::RawPage;
use crate::store::{EntityRepository, Record};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Typed view of one source page, produced by an entity mapping
pub trait TransferObject: Send + Sync + 'static {
    fn external_id(&self) -> &str;
    fn natural_key(&self) -> &str;
}

/// Conversion and merge rules for one entity type
#[async_trait::async_trait]
pub trait EntityMapping: Send + Sync + 'static {
    type Transfer: TransferObject;
    type Record: Record;

    fn entity_type(&self) -> EntityType;

    /// Convert a raw page into a transfer object.
    fn convert(&self, page: &RawPage) -> Result<Self::Transfer, SyncError>;

    /// Build the record to persist from a transfer object and the matched local record, if any.
    ///
    /// Source-owned fields come from the transfer object; local-only fields are kept from
    /// `existing`. Unresolvable required references fail with `SyncError::UnresolvedReference`.
    async fn apply(
        &self,
        transfer: Self::Transfer,
        existing: Option<Self::Record>,
    ) -> Result<Self::Record, SyncError>;
}

/// How a transfer object was reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    /// Adopted a local record without an external id through its natural key
    MergedByNaturalKey,
    /// The natural key belonged to another external record, so a new record was created
    CreatedAfterCollision,
}

impl UpsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(
            self,
            UpsertOutcome::Created | UpsertOutcome::CreatedAfterCollision
        )
    }
}

pub struct Reconciler<M: EntityMapping> {
    mapping: M,
    repository: Arc<dyn EntityRepository<M::Record>>,
    locks: KeyedLocks,
}

impl<M: EntityMapping> Reconciler<M> {
    pub fn new(mapping: M, repository: Arc<dyn EntityRepository<M::Record>>) -> Self {
        Self {
            mapping,
            repository,
            locks: KeyedLocks::new(),
        }
    }

    pub fn mapping(&self) -> &M {
        &self.mapping
    }

    pub fn entity_type(&self) -> EntityType {
        self.mapping.entity_type()
    }

    /// Convert a page and reconcile the result
    pub async fn reconcile_page(&self, page: RawPage) -> Result<UpsertOutcome, SyncError> {
        let transfer = self.mapping.convert(&page)?;
        self.reconcile(transfer).await
    }

    pub async fn reconcile(&self, transfer: M::Transfer) -> Result<UpsertOutcome, SyncError> {
        let entity = self.entity_type();
        let external_id = transfer.external_id().to_string();
        let natural_key = transfer.natural_key().to_string();
        if external_id.trim().is_empty() {
            return Err(SyncError::Validation(format!(
                "{} '{}' has no external id",
                entity.display_name(),
                natural_key
            )));
        }

        // Always external id first, then natural key.
        let _external_guard = self.locks.lock(&format!("ext:{}", external_id)).await;
        let _name_guard = self.locks.lock(&format!("name:{}", natural_key)).await;

        let (existing, outcome) =
            match self.repository.find_by_external_id(&external_id).await? {
                Some(record) => (Some(record), UpsertOutcome::Updated),
                None => match self.repository.find_by_natural_key(&natural_key).await? {
                    Some(record) => match record.external_id() {
                        None => {
                            info!(
                                entity = entity.key(),
                                external_id = external_id.as_str(),
                                "Adopting local record '{}' by name",
                                natural_key
                            );
                            (Some(record), UpsertOutcome::MergedByNaturalKey)
                        }
                        Some(other) => {
                            warn!(
                                entity = entity.key(),
                                external_id = external_id.as_str(),
                                "Name '{}' already belongs to external record {}, creating a new record",
                                natural_key,
                                other
                            );
                            (None, UpsertOutcome::CreatedAfterCollision)
                        }
                    },
                    None => (None, UpsertOutcome::Created),
                },
            };

        let local_id = existing.as_ref().and_then(|r| r.local_id());
        let mut record = self.mapping.apply(transfer, existing).await?;
        record.assign_external_id(&external_id);
        if let Some(id) = local_id {
            record.assign_local_id(id);
        }
        let saved = self.repository.save(record).await?;

        debug!(
            entity = entity.key(),
            external_id = external_id.as_str(),
            local_id = saved.local_id(),
            "Reconciled ({:?})",
            outcome
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryRepository, Npc};

    struct NpcTransfer {
        external_id: String,
        name: String,
        role: Option<String>,
    }

    impl TransferObject for NpcTransfer {
        fn external_id(&self) -> &str {
            &self.external_id
        }

        fn natural_key(&self) -> &str {
            &self.name
        }
    }

    struct TestMapping;

    #[async_trait::async_trait]
    impl EntityMapping for TestMapping {
        type Transfer = NpcTransfer;
        type Record = Npc;

        fn entity_type(&self) -> EntityType {
            EntityType::Npcs
        }

        fn convert(&self, page: &RawPage) -> Result<NpcTransfer, SyncError> {
            Ok(NpcTransfer {
                external_id: page.id.clone(),
                name: page.name(),
                role: page.text("Role"),
            })
        }

        async fn apply(
            &self,
            transfer: NpcTransfer,
            existing: Option<Npc>,
        ) -> Result<Npc, SyncError> {
            let mut npc = existing.unwrap_or_default();
            npc.name = transfer.name;
            npc.role = transfer.role;
            Ok(npc)
        }
    }

    fn transfer(external_id: &str, name: &str, role: &str) -> NpcTransfer {
        NpcTransfer {
            external_id: external_id.to_string(),
            name: name.to_string(),
            role: Some(role.to_string()),
        }
    }

    fn reconciler() -> (Reconciler<TestMapping>, Arc<InMemoryRepository<Npc>>) {
        let repository = Arc::new(InMemoryRepository::<Npc>::new());
        (Reconciler::new(TestMapping, repository.clone()), repository)
    }

    #[tokio::test]
    async fn test_create_then_update_by_external_id() {
        let (reconciler, repository) = reconciler();

        let first = reconciler
            .reconcile(transfer("p-1", "Paul Heyman", "Manager"))
            .await
            .expect("Failed while creating");
        let second = reconciler
            .reconcile(transfer("p-1", "Paul Heyman", "Advocate"))
            .await
            .expect("Failed while updating");

        assert_eq!(first, UpsertOutcome::Created);
        assert_eq!(second, UpsertOutcome::Updated);
        let all = repository.find_all().await.expect("Failed while listing");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].role.as_deref(), Some("Advocate"));
    }

    #[tokio::test]
    async fn test_local_only_fields_survive_update() {
        let (reconciler, repository) = reconciler();
        reconciler
            .reconcile(transfer("p-1", "Paul Heyman", "Manager"))
            .await
            .expect("Failed while creating");

        let mut stored = repository
            .find_by_external_id("p-1")
            .await
            .expect("Failed while loading")
            .expect("Record should exist");
        stored.appearances = 12;
        repository.save(stored).await.expect("Failed while saving");

        reconciler
            .reconcile(transfer("p-1", "Paul Heyman", "Advocate"))
            .await
            .expect("Failed while updating");

        let stored = repository
            .find_by_external_id("p-1")
            .await
            .expect("Failed while loading")
            .expect("Record should exist");
        assert_eq!(stored.appearances, 12);
    }

    #[tokio::test]
    async fn test_adopts_uncorrelated_record_by_name() {
        let (reconciler, repository) = reconciler();
        repository
            .save(Npc {
                name: "Paul Heyman".to_string(),
                appearances: 3,
                ..Npc::default()
            })
            .await
            .expect("Failed while seeding");

        let outcome = reconciler
            .reconcile(transfer("p-1", "Paul Heyman", "Manager"))
            .await
            .expect("Failed while reconciling");

        assert_eq!(outcome, UpsertOutcome::MergedByNaturalKey);
        let all = repository.find_all().await.expect("Failed while listing");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].external_id.as_deref(), Some("p-1"));
        assert_eq!(all[0].appearances, 3);
    }

    #[tokio::test]
    async fn test_name_collision_creates_new_record() {
        let (reconciler, repository) = reconciler();
        reconciler
            .reconcile(transfer("p-1", "The Referee", "Official"))
            .await
            .expect("Failed while creating");

        let outcome = reconciler
            .reconcile(transfer("p-2", "The Referee", "Official"))
            .await
            .expect("Failed while reconciling");

        assert_eq!(outcome, UpsertOutcome::CreatedAfterCollision);
        assert_eq!(repository.count().await.expect("Failed while counting"), 2);
    }

    #[tokio::test]
    async fn test_adopts_uncorrelated_record_behind_correlated_namesake() {
        let (reconciler, repository) = reconciler();
        reconciler
            .reconcile(transfer("p-1", "The Referee", "Official"))
            .await
            .expect("Failed while creating");
        let local = repository
            .save(Npc {
                name: "The Referee".to_string(),
                appearances: 40,
                ..Npc::default()
            })
            .await
            .expect("Failed while seeding");

        let outcome = reconciler
            .reconcile(transfer("p-2", "The Referee", "Senior Official"))
            .await
            .expect("Failed while reconciling");

        assert_eq!(outcome, UpsertOutcome::MergedByNaturalKey);
        assert_eq!(repository.count().await.expect("Failed while counting"), 2);
        let adopted = repository
            .find_by_external_id("p-2")
            .await
            .expect("Failed while loading")
            .expect("Record should exist");
        assert_eq!(adopted.id, local.id);
        assert_eq!(adopted.appearances, 40);
    }

    #[tokio::test]
    async fn test_concurrent_same_external_id_creates_once() {
        let (reconciler, repository) = reconciler();
        let reconciler = Arc::new(reconciler);

        let mut handles = Vec::new();
        for i in 0..8 {
            let reconciler = reconciler.clone();
            handles.push(tokio::spawn(async move {
                reconciler
                    .reconcile(transfer("p-1", "Paul Heyman", &format!("Role {}", i)))
                    .await
            }));
        }
        for handle in handles {
            handle
                .await
                .expect("Task panicked")
                .expect("Failed while reconciling");
        }

        assert_eq!(repository.count().await.expect("Failed while counting"), 1);
    }

    #[tokio::test]
    async fn test_missing_external_id_is_validation_error() {
        let (reconciler, _) = reconciler();
        let result = reconciler.reconcile_page(RawPage::new("  ")).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }
}
