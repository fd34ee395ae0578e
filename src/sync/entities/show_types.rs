use super::{count, references, require};
use crate::source::RawPage;
use crate::store::{ShowTemplate, ShowType, Store};
use crate::sync::reconcile::{EntityMapping, TransferObject};
use crate::sync::types::{EntityType, SyncError};

#[derive(Debug, Clone, PartialEq)]
pub struct ShowTypeTransfer {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub expected_segments: Option<u32>,
}

impl TransferObject for ShowTypeTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

pub struct ShowTypeMapping;

#[async_trait::async_trait]
impl EntityMapping for ShowTypeMapping {
    type Transfer = ShowTypeTransfer;
    type Record = ShowType;

    fn entity_type(&self) -> EntityType {
        EntityType::ShowTypes
    }

    fn convert(&self, page: &RawPage) -> Result<ShowTypeTransfer, SyncError> {
        Ok(ShowTypeTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            description: page.description(),
            expected_segments: count(page, "Expected Segments"),
        })
    }

    async fn apply(
        &self,
        transfer: ShowTypeTransfer,
        existing: Option<ShowType>,
    ) -> Result<ShowType, SyncError> {
        let mut show_type = existing.unwrap_or_default();
        show_type.name = transfer.name;
        show_type.description = transfer.description;
        show_type.expected_segments = transfer.expected_segments;
        Ok(show_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowTemplateTransfer {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub show_type: Option<String>,
}

impl TransferObject for ShowTemplateTransfer {
    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// Templates belong to a show type, which must already be synchronized
pub struct ShowTemplateMapping {
    store: Store,
}

impl ShowTemplateMapping {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl EntityMapping for ShowTemplateMapping {
    type Transfer = ShowTemplateTransfer;
    type Record = ShowTemplate;

    fn entity_type(&self) -> EntityType {
        EntityType::ShowTemplates
    }

    fn convert(&self, page: &RawPage) -> Result<ShowTemplateTransfer, SyncError> {
        Ok(ShowTemplateTransfer {
            external_id: page.id.clone(),
            name: page.name(),
            description: page.description(),
            show_type: references(page, "Show Type").into_iter().next(),
        })
    }

    async fn apply(
        &self,
        transfer: ShowTemplateTransfer,
        existing: Option<ShowTemplate>,
    ) -> Result<ShowTemplate, SyncError> {
        let owner = format!("Show template '{}'", transfer.name);
        let show_type_id = require(
            self.store.show_types.as_ref(),
            transfer.show_type.as_deref(),
            "show type",
            &owner,
        )
        .await?;

        let mut template = existing.unwrap_or_default();
        template.name = transfer.name;
        template.description = transfer.description;
        template.show_type_id = show_type_id;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::EntityRepository;
    use serde_json::json;

    #[tokio::test]
    async fn test_show_type_keeps_display_order() {
        let existing = ShowType {
            id: Some(4),
            name: "Weekly".to_string(),
            display_order: Some(2),
            ..ShowType::default()
        };
        let page = RawPage::new("st-1")
            .with("Name", json!("Weekly"))
            .with("Expected Segments", json!("7"));

        let mapping = ShowTypeMapping;
        let transfer = mapping.convert(&page).expect("Failed while converting");
        let show_type = mapping
            .apply(transfer, Some(existing))
            .await
            .expect("Failed while applying");

        assert_eq!(show_type.expected_segments, Some(7));
        assert_eq!(show_type.display_order, Some(2));
    }

    #[tokio::test]
    async fn test_template_requires_known_show_type() {
        let store = Store::in_memory();
        store
            .show_types
            .save(ShowType {
                external_id: Some("st-1".to_string()),
                name: "Premium Live Event".to_string(),
                ..ShowType::default()
            })
            .await
            .expect("Failed while seeding");
        let mapping = ShowTemplateMapping::new(store);

        let known = RawPage::new("tpl-1")
            .with("Name", json!("Summer Spectacular"))
            .with("Show Type", json!([{ "id": "st-1" }]));
        let unknown = RawPage::new("tpl-2")
            .with("Name", json!("Winter Warfare"))
            .with("Show Type", json!("Pay Per View"));

        let template = mapping
            .apply(mapping.convert(&known).expect("Failed while converting"), None)
            .await
            .expect("Failed while applying");
        assert_eq!(template.show_type_id, 1);

        let result = mapping
            .apply(mapping.convert(&unknown).expect("Failed while converting"), None)
            .await;
        assert!(matches!(result, Err(SyncError::UnresolvedReference(_))));
    }
}
