use super::{references, require, resolve};
use crate::source::RawPage;
use crate::store::{Show, Store};
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};
use chrono::NaiveDate;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct ShowTransfer {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub show_date: Option<NaiveDate>,
    pub show_type: Option<String>,
    pub season: Option<String>,
    pub template: Option<String>,
}

impl TransferObject for ShowTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct ShowMapping {
    store: Store,
}

impl ShowMapping {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl EntityMapping for ShowMapping {
    type Transfer = ShowTransfer;
    type Record = Show;

    fn entity_type(&self) -> EntityType {
        EntityType::Shows
    }

    fn convert(&self, page: &RawPage) -> Result<ShowTransfer, SyncError> {
        Ok(ShowTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            description: page.description(),
            show_date: page.date("Date"),
            show_type: references(page, "Show Type").into_iter().next(),
            season: references(page, "Season").into_iter().next(),
            template: references(page, "Template").into_iter().next(),
        })
    }

    /// The show type is required. An unknown season or template only drops that link.
    async fn apply(&self, transfer: ShowTransfer, existing: Option<Show>) -> Result<Show, SyncError> {
        let owner = format!("Show '{}'", transfer.name);
        let show_type_id = require(
            self.store.show_types.as_ref(),
            transfer.show_type.as_deref(),
            "show type",
            &owner,
        )
        .await?;

        let season_id = match &transfer.season {
            Some(season) => {
                let id = resolve(self.store.seasons.as_ref(), season).await?;
                if id.is_none() {
                    warn!("{}: unknown season '{}'", owner, season);
                }
                id
            }
            None => None,
        };
        let template_id = match &transfer.template {
            Some(template) => resolve(self.store.show_templates.as_ref(), template).await?,
            None => None,
        };

        let mut show = existing.unwrap_or_default();
        show.name = transfer.name;
        show.description = transfer.description;
        show.show_date = transfer.show_date;
        show.show_type_id = show_type_id;
        show.season_id = season_id;
        show.template_id = template_id;
        Ok(show)
    }
}
