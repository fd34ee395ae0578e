use crate::source::RawPage;
use crate::store::Npc;
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub struct NpcTransfer {
    pub external_id: String,
    pub name: String,
    pub role: Option<String>,
    pub description: Option<String>,
}

impl TransferObject for NpcTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// Referees, managers, commentators and other non-wrestling personalities
pub struct NpcMapping;

#[async_trait::async_trait]
impl EntityMapping for NpcMapping {
    type Transfer = NpcTransfer;
    type Record = Npc;

    fn entity_type(&self) -> EntityType {
        EntityType::Npcs
    }

    fn convert(&self, page: &RawPage) -> Result<NpcTransfer, SyncError> {
        Ok(NpcTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            role: page.text("Role").or_else(|| page.text("Type")),
            description: page.description(),
        })
    }

    async fn apply(&self, transfer: NpcTransfer, existing: Option<Npc>) -> Result<Npc, SyncError> {
        let mut npc = existing.unwrap_or_default();
        npc.name = transfer.name;
        npc.role = transfer.role;
        npc.description = transfer.description;
        Ok(npc)
    }
}
