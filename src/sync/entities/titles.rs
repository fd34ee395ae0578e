use crate::source::RawPage;
use crate::store::Title;
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub struct TitleTransfer {
    pub external_id: String,
    pub name: String,
    pub tier: Option<String>,
    pub gender: Option<String>,
    pub active: bool,
}

impl TransferObject for TitleTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// Championship titles. The current champion is decided by match results, so the source never
/// overwrites it.
pub struct TitleMapping;

#[async_trait::async_trait]
impl EntityMapping for TitleMapping {
    type Transfer = TitleTransfer;
    type Record = Title;

    fn entity_type(&self) -> EntityType {
        EntityType::Titles
    }

    fn convert(&self, page: &RawPage) -> Result<TitleTransfer, SyncError> {
        Ok(TitleTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            tier: page.text("Tier"),
            gender: page.text("Gender"),
            active: page.boolean("Active").unwrap_or(true),
        })
    }

    async fn apply(&self, transfer: TitleTransfer, existing: Option<Title>) -> Result<Title, SyncError> {
        let mut title = existing.unwrap_or_default();
        title.name = transfer.name;
        title.tier = transfer.tier;
        title.gender = transfer.gender;
        title.active = transfer.active;
        Ok(title)
    }
}
