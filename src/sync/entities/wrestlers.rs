//! Wrestlers are the roster's root entity: nothing they carry refers to another entity type.

use super::stat;
use crate::source::RawPage;
use crate::store::Wrestler;
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub struct WrestlerTransfer {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub gender: Option<String>,
    pub tier: Option<String>,
    pub fans: Option<i64>,
    pub starting_health: Option<i32>,
    pub low_health: Option<i32>,
    pub starting_stamina: Option<i32>,
    pub low_stamina: Option<i32>,
    pub deck_size: Option<i32>,
    pub is_player: bool,
}

impl TransferObject for WrestlerTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct WrestlerMapping;

#[async_trait::async_trait]
impl EntityMapping for WrestlerMapping {
    type Transfer = WrestlerTransfer;
    type Record = Wrestler;

    fn entity_type(&self) -> EntityType {
        EntityType::Wrestlers
    }

    fn convert(&self, page: &RawPage) -> Result<WrestlerTransfer, SyncError> {
        let fans = page.integer("Fans");
        if fans.is_some_and(|fans| fans < 0) {
            return Err(SyncError::Validation(format!(
                "Wrestler '{}' has a negative fan count",
                page.name()
            )));
        }

        Ok(WrestlerTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            description: page.description(),
            gender: page.text("Gender"),
            tier: page.text("Tier"),
            fans,
            starting_health: stat(page, "Starting Health"),
            low_health: stat(page, "Low Health"),
            starting_stamina: stat(page, "Starting Stamina"),
            low_stamina: stat(page, "Low Stamina"),
            deck_size: stat(page, "Deck Size"),
            is_player: page.boolean("Player").unwrap_or(false),
        })
    }

    /// Absent stats keep their local value; the win/loss record is never touched.
    async fn apply(
        &self,
        transfer: WrestlerTransfer,
        existing: Option<Wrestler>,
    ) -> Result<Wrestler, SyncError> {
        let mut wrestler = existing.unwrap_or_default();
        wrestler.name = transfer.name;
        wrestler.is_player = transfer.is_player;
        wrestler.description = transfer.description.or(wrestler.description);
        wrestler.gender = transfer.gender.or(wrestler.gender);
        wrestler.tier = transfer.tier.or(wrestler.tier);
        wrestler.fans = transfer.fans.or(wrestler.fans);
        wrestler.starting_health = transfer.starting_health.or(wrestler.starting_health);
        wrestler.low_health = transfer.low_health.or(wrestler.low_health);
        wrestler.starting_stamina = transfer.starting_stamina.or(wrestler.starting_stamina);
        wrestler.low_stamina = transfer.low_stamina.or(wrestler.low_stamina);
        wrestler.deck_size = transfer.deck_size.or(wrestler.deck_size);
        Ok(wrestler)
    }
}
