use super::{references, resolve, resolve_all};
use crate::source::RawPage;
use crate::store::{Store, Team};
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};

/// Members a tag team needs
const MIN_MEMBERS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct TeamTransfer {
    pub external_id: String,
    pub name: String,
    pub members: Vec<String>,
    pub faction: Option<String>,
    pub active: bool,
}

impl TransferObject for TeamTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct TeamMapping {
    store: Store,
}

impl TeamMapping {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl EntityMapping for TeamMapping {
    type Transfer = TeamTransfer;
    type Record = Team;

    fn entity_type(&self) -> EntityType {
        EntityType::Teams
    }

    fn convert(&self, page: &RawPage) -> Result<TeamTransfer, SyncError> {
        let mut members = references(page, "Members");
        if members.is_empty() {
            members = ["Member 1", "Member 2"]
                .iter()
                .flat_map(|property| references(page, property))
                .collect();
        }
        if members.len() < MIN_MEMBERS {
            return Err(SyncError::Validation(format!(
                "Team '{}' needs at least {} members, found {}",
                page.name(),
                MIN_MEMBERS,
                members.len()
            )));
        }

        Ok(TeamTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            members,
            faction: references(page, "Faction").into_iter().next(),
            active: page.boolean("Active").unwrap_or(true),
        })
    }

    /// Every member must already be known; a team with a missing wrestler is skipped.
    async fn apply(&self, transfer: TeamTransfer, existing: Option<Team>) -> Result<Team, SyncError> {
        let owner = format!("Team '{}'", transfer.name);
        let member_ids = resolve_all(
            self.store.wrestlers.as_ref(),
            &transfer.members,
            "member",
            &owner,
        )
        .await?;
        let faction_id = match &transfer.faction {
            Some(faction) => resolve(self.store.factions.as_ref(), faction).await?,
            None => None,
        };

        let mut team = existing.unwrap_or_default();
        team.name = transfer.name;
        team.member_ids = member_ids;
        team.faction_id = faction_id;
        team.active = transfer.active;
        Ok(team)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityRepository, Wrestler};
    use serde_json::json;

    async fn store() -> Store {
        let store = Store::in_memory();
        for name in ["Bubba Ray Dudley", "D-Von Dudley"] {
            store
                .wrestlers
                .save(Wrestler {
                    name: name.to_string(),
                    ..Wrestler::default()
                })
                .await
                .expect("Failed while seeding");
        }
        store
    }

    #[tokio::test]
    async fn test_members_from_numbered_properties() {
        let mapping = TeamMapping::new(store().await);
        let page = RawPage::new("t-1")
            .with("Name", json!("The Dudley Boyz"))
            .with("Member 1", json!("Bubba Ray Dudley"))
            .with("Member 2", json!("D-Von Dudley"));
        let existing = Team {
            id: Some(1),
            name: "The Dudley Boyz".to_string(),
            wins: 21,
            losses: 4,
            ..Team::default()
        };

        let team = mapping
            .apply(
                mapping.convert(&page).expect("Failed while converting"),
                Some(existing),
            )
            .await
            .expect("Failed while applying");

        assert_eq!(team.member_ids, vec![1, 2]);
        assert_eq!((team.wins, team.losses), (21, 4));
        assert!(team.active);
    }

    #[tokio::test]
    async fn test_unknown_member_is_unresolved() {
        let mapping = TeamMapping::new(store().await);
        let page = RawPage::new("t-2")
            .with("Name", json!("Team Extreme"))
            .with("Members", json!("Matt Hardy, Jeff Hardy"));

        let result = mapping
            .apply(mapping.convert(&page).expect("Failed while converting"), None)
            .await;

        assert!(matches!(result, Err(SyncError::UnresolvedReference(_))));
    }

    #[test]
    fn test_single_member_rejected() {
        let mapping = TeamMapping::new(Store::in_memory());
        let page = RawPage::new("t-3").with("Members", json!(["Solo"]));

        assert!(matches!(
            mapping.convert(&page),
            Err(SyncError::Validation(_))
        ));
    }
}
