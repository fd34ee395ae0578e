use super::{references, resolve, resolve_known};
use crate::source::RawPage;
use crate::store::{Faction, Store};
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct FactionTransfer {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub leader: Option<String>,
    pub members: Vec<String>,
    pub active: bool,
}

impl TransferObject for FactionTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct FactionMapping {
    store: Store,
}

impl FactionMapping {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl EntityMapping for FactionMapping {
    type Transfer = FactionTransfer;
    type Record = Faction;

    fn entity_type(&self) -> EntityType {
        EntityType::Factions
    }

    fn convert(&self, page: &RawPage) -> Result<FactionTransfer, SyncError> {
        let active = page.boolean("Active").unwrap_or_else(|| {
            page.text("Status")
                .is_none_or(|status| !status.eq_ignore_ascii_case("disbanded"))
        });

        Ok(FactionTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            description: page.description(),
            leader: references(page, "Leader").into_iter().next(),
            members: references(page, "Members"),
            active,
        })
    }

    /// Unknown members are left out. The leader is always counted as a member.
    async fn apply(
        &self,
        transfer: FactionTransfer,
        existing: Option<Faction>,
    ) -> Result<Faction, SyncError> {
        let owner = format!("Faction '{}'", transfer.name);
        let wrestlers = self.store.wrestlers.as_ref();

        let mut member_ids = resolve_known(wrestlers, &transfer.members, "member", &owner).await?;
        let leader_id = match &transfer.leader {
            Some(leader) => {
                let id = resolve(wrestlers, leader).await?;
                if id.is_none() {
                    warn!("{}: unknown leader '{}'", owner, leader);
                }
                id
            }
            None => None,
        };
        if let Some(leader_id) = leader_id {
            if !member_ids.contains(&leader_id) {
                member_ids.insert(0, leader_id);
            }
        }

        let mut faction = existing.unwrap_or_default();
        faction.name = transfer.name;
        faction.description = transfer.description;
        faction.leader_id = leader_id;
        faction.member_ids = member_ids;
        faction.active = transfer.active;
        Ok(faction)
    }
}
