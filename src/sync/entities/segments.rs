//! Segments are the matches and promos that make up a show's card.

use super::{references, require, resolve_known};
use crate::source::{MAX_DESCRIPTION_CHARS, RawPage, truncate};
use crate::store::{Segment, Store};
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentTransfer {
    pub external_id: String,
    pub name: String,
    pub show: Option<String>,
    pub segment_type: Option<String>,
    pub participants: Vec<String>,
    pub winners: Vec<String>,
    pub segment_date: Option<NaiveDate>,
    pub narration: Option<String>,
}

impl TransferObject for SegmentTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct SegmentMapping {
    store: Store,
}

impl SegmentMapping {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl EntityMapping for SegmentMapping {
    type Transfer = SegmentTransfer;
    type Record = Segment;

    fn entity_type(&self) -> EntityType {
        EntityType::Segments
    }

    fn convert(&self, page: &RawPage) -> Result<SegmentTransfer, SyncError> {
        let narration = page
            .content
            .as_deref()
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(|content| truncate(content, MAX_DESCRIPTION_CHARS));

        Ok(SegmentTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            show: references(page, "Show").into_iter().next(),
            segment_type: page.text("Segment Type"),
            participants: references(page, "Participants"),
            winners: references(page, "Winners"),
            segment_date: page.date("Date"),
            narration,
        })
    }

    /// A segment cannot exist without its show and type. Unknown participants are left out, and
    /// winners are kept only when they also participated.
    async fn apply(
        &self,
        transfer: SegmentTransfer,
        existing: Option<Segment>,
    ) -> Result<Segment, SyncError> {
        let owner = format!("Segment '{}'", transfer.name);
        let show_id = require(
            self.store.shows.as_ref(),
            transfer.show.as_deref(),
            "show",
            &owner,
        )
        .await?;
        let Some(segment_type) = transfer.segment_type else {
            return Err(SyncError::UnresolvedReference(format!(
                "{} has no segment type",
                owner
            )));
        };

        let wrestlers = self.store.wrestlers.as_ref();
        let participant_ids =
            resolve_known(wrestlers, &transfer.participants, "participant", &owner).await?;
        let winner_ids: Vec<u64> = resolve_known(wrestlers, &transfer.winners, "winner", &owner)
            .await?
            .into_iter()
            .filter(|id| participant_ids.contains(id))
            .collect();

        let mut segment = existing.unwrap_or_default();
        segment.name = transfer.name;
        segment.show_id = show_id;
        segment.segment_type = segment_type;
        segment.participant_ids = participant_ids;
        segment.winner_ids = winner_ids;
        segment.segment_date = transfer.segment_date;
        segment.narration = transfer.narration.or(segment.narration);
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityRepository, Show, Wrestler};
    use serde_json::json;

    async fn store() -> Store {
        let store = Store::in_memory();
        store
            .shows
            .save(Show {
                external_id: Some("show-1".to_string()),
                name: "WrestleMania X-Seven".to_string(),
                ..Show::default()
            })
            .await
            .expect("Failed while seeding");
        for name in ["Stone Cold", "The Rock", "Vince McMahon"] {
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
    async fn test_segment_resolves_show_and_participants() {
        let mapping = SegmentMapping::new(store().await);
        let page = RawPage::new("seg-1")
            .with("Name", json!("Austin vs Rock"))
            .with("Show", json!([{ "id": "show-1" }]))
            .with("Segment Type", json!("Singles Match"))
            .with("Participants", json!("Stone Cold, The Rock, Mankind"))
            .with("Winners", json!(["Stone Cold", "Vince McMahon"]))
            .with("Date", json!("April 1, 2001"))
            .with_content("  Austin turns heel.  ");
        let existing = Segment {
            id: Some(1),
            name: "Austin vs Rock".to_string(),
            rating: Some(5),
            ..Segment::default()
        };

        let segment = mapping
            .apply(
                mapping.convert(&page).expect("Failed while converting"),
                Some(existing),
            )
            .await
            .expect("Failed while applying");

        assert_eq!(segment.show_id, 1);
        assert_eq!(segment.segment_type, "Singles Match");
        assert_eq!(segment.participant_ids, vec![1, 2]);
        assert_eq!(segment.winner_ids, vec![1]);
        assert_eq!(segment.segment_date, NaiveDate::from_ymd_opt(2001, 4, 1));
        assert_eq!(segment.narration.as_deref(), Some("Austin turns heel."));
        assert_eq!(segment.rating, Some(5));
    }

    #[tokio::test]
    async fn test_segment_for_unknown_show_is_unresolved() {
        let mapping = SegmentMapping::new(store().await);
        let page = RawPage::new("seg-2")
            .with("Name", json!("Dark match"))
            .with("Show", json!("Some House Show"))
            .with("Segment Type", json!("Singles Match"));

        let result = mapping
            .apply(mapping.convert(&page).expect("Failed while converting"), None)
            .await;

        assert!(matches!(result, Err(SyncError::UnresolvedReference(_))));
    }
}
