use super::{references, require, stat};
use crate::source::RawPage;
use crate::store::{Injury, Store};
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub struct InjuryTransfer {
    pub external_id: String,
    pub name: String,
    pub wrestler: Option<String>,
    pub severity: Option<String>,
    pub health_penalty: Option<i32>,
    pub active: bool,
}

impl TransferObject for InjuryTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct InjuryMapping {
    store: Store,
}

impl InjuryMapping {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl EntityMapping for InjuryMapping {
    type Transfer = InjuryTransfer;
    type Record = Injury;

    fn entity_type(&self) -> EntityType {
        EntityType::Injuries
    }

    fn convert(&self, page: &RawPage) -> Result<InjuryTransfer, SyncError> {
        Ok(InjuryTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            wrestler: references(page, "Wrestler").into_iter().next(),
            severity: page.text("Severity"),
            // Stored as a positive penalty whether the source writes -3 or 3
            health_penalty: stat(page, "Health Effect").map(i32::abs),
            active: page.boolean("Active").unwrap_or(true),
        })
    }

    async fn apply(
        &self,
        transfer: InjuryTransfer,
        existing: Option<Injury>,
    ) -> Result<Injury, SyncError> {
        let owner = format!("Injury '{}'", transfer.name);
        let wrestler_id = require(
            self.store.wrestlers.as_ref(),
            transfer.wrestler.as_deref(),
            "wrestler",
            &owner,
        )
        .await?;

        let mut injury = existing.unwrap_or_default();
        injury.name = transfer.name;
        injury.wrestler_id = wrestler_id;
        injury.severity = transfer.severity;
        injury.health_penalty = transfer.health_penalty;
        injury.active = transfer.active;
        Ok(injury)
    }
}
