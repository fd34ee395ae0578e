use super::{references, resolve_all};
use crate::source::RawPage;
use crate::store::{Rivalry, Store};
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct RivalryTransfer {
    pub external_id: String,
    pub name: String,
    pub wrestlers: Vec<String>,
    pub started_on: Option<NaiveDate>,
    pub ended_on: Option<NaiveDate>,
}

impl TransferObject for RivalryTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct RivalryMapping {
    store: Store,
}

impl RivalryMapping {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl EntityMapping for RivalryMapping {
    type Transfer = RivalryTransfer;
    type Record = Rivalry;

    fn entity_type(&self) -> EntityType {
        EntityType::Rivalries
    }

    fn convert(&self, page: &RawPage) -> Result<RivalryTransfer, SyncError> {
        let wrestlers = references(page, "Wrestlers");
        if wrestlers.len() != 2 {
            return Err(SyncError::Validation(format!(
                "Rivalry '{}' must involve exactly two wrestlers, found {}",
                page.name(),
                wrestlers.len()
            )));
        }

        Ok(RivalryTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            wrestlers,
            started_on: page.date("Start Date"),
            ended_on: page.date("End Date"),
        })
    }

    async fn apply(
        &self,
        transfer: RivalryTransfer,
        existing: Option<Rivalry>,
    ) -> Result<Rivalry, SyncError> {
        let owner = format!("Rivalry '{}'", transfer.name);
        let wrestler_ids = resolve_all(
            self.store.wrestlers.as_ref(),
            &transfer.wrestlers,
            "wrestler",
            &owner,
        )
        .await?;

        let mut rivalry = existing.unwrap_or_default();
        rivalry.name = transfer.name;
        rivalry.wrestler_ids = wrestler_ids;
        rivalry.started_on = transfer.started_on;
        rivalry.ended_on = transfer.ended_on;
        Ok(rivalry)
    }
}
