//! Checks on fetched pages before they are reconciled.
//!
//! A page without an id or a usable name cannot be correlated with a local record, so it is
//! rejected and counted as a record error. Duplicate names and unusually large result sets are
//! only reported.

use super::types::EntityType;
use crate::source::RawPage;
use serde::Serialize;
use std::collections::HashMap;

/// Name `RawPage::name` falls back to when a page has neither `Name` nor `Title`
const UNNAMED: &str = "Unknown";

/// A page left out of reconciliation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedPage {
    /// Position in the fetched result set
    pub index: usize,
    pub page_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct PageValidation {
    pub accepted: Vec<RawPage>,
    pub rejected: Vec<RejectedPage>,
    pub warnings: Vec<String>,
}

/// Result-set size above which a warning is logged
fn large_dataset_threshold(entity: EntityType) -> usize {
    match entity {
        EntityType::Wrestlers => 50_000,
        _ => 10_000,
    }
}

/// Split fetched pages into those safe to reconcile and those rejected.
pub fn validate_pages(entity: EntityType, pages: Vec<RawPage>) -> PageValidation {
    let mut validation = PageValidation::default();
    let label = entity.display_name().to_lowercase();

    if pages.is_empty() {
        validation
            .warnings
            .push(format!("No {} to validate", label));
        return validation;
    }
    if pages.len() > large_dataset_threshold(entity) {
        validation.warnings.push(format!(
            "Large {} dataset ({} pages), sync may take a while",
            label,
            pages.len()
        ));
    }

    let mut names: HashMap<String, usize> = HashMap::new();
    for (index, page) in pages.into_iter().enumerate() {
        let name = page.name();
        let reason = if page.id.trim().is_empty() {
            Some(format!("{} page at index {} has no ID", entity, index))
        } else if name.trim().is_empty() || name == UNNAMED {
            Some(format!("{} page at index {} has no name", entity, index))
        } else {
            None
        };

        match reason {
            Some(reason) => validation.rejected.push(RejectedPage {
                index,
                page_id: page.id,
                reason,
            }),
            None => {
                *names.entry(name).or_default() += 1;
                validation.accepted.push(page);
            }
        }
    }

    let mut duplicates: Vec<_> = names
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect();
    if !duplicates.is_empty() {
        duplicates.sort();
        validation.warnings.push(format!(
            "Duplicate {} names detected, some records may be overwritten: {}",
            label,
            duplicates.join(", ")
        ));
    }

    validation
}
