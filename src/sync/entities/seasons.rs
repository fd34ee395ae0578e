use crate::source::RawPage;
use crate::store::Season;
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonTransfer {
    pub external_id: String,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
}

impl TransferObject for SeasonTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct SeasonMapping;

#[async_trait::async_trait]
impl EntityMapping for SeasonMapping {
    type Transfer = SeasonTransfer;
    type Record = Season;

    fn entity_type(&self) -> EntityType {
        EntityType::Seasons
    }

    fn convert(&self, page: &RawPage) -> Result<SeasonTransfer, SyncError> {
        let start_date = page.date("Start Date");
        let end_date = page.date("End Date");
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(SyncError::Validation(format!(
                    "Season '{}' ends ({}) before it starts ({})",
                    page.name(),
                    end,
                    start
                )));
            }
        }

        Ok(SeasonTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            start_date,
            end_date,
            // A season without an explicit flag is current until it has an end date
            active: page.boolean("Active").unwrap_or(end_date.is_none()),
        })
    }

    async fn apply(
        &self,
        transfer: SeasonTransfer,
        existing: Option<Season>,
    ) -> Result<Season, SyncError> {
        let mut season = existing.unwrap_or_default();
        season.name = transfer.name;
        season.start_date = transfer.start_date;
        season.end_date = transfer.end_date;
        season.active = transfer.active;
        Ok(season)
    }
}
