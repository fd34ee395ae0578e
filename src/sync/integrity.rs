//! Post-run integrity check over the local store.
//!
//! Errors are states the booking screens cannot work with: shows without a show type, unnamed
//! records, teams without members and references to records that do not exist. Warnings are
//! suspicious but usable: duplicate external ids, factions without members, single-member teams
//! and shows dated far in the future.

use super::types::{EntityType, SyncError};
use crate::store::{Record, Store};
use chrono::{DateTime, Months, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shows dated further ahead than this are reported
const MAX_FUTURE_MONTHS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Record counts per entity key, plus `dangling_references`
    pub statistics: BTreeMap<String, usize>,
    pub checked_at: DateTime<Utc>,
    pub duration: Duration,
}

impl IntegrityReport {
    fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            statistics: BTreeMap::new(),
            checked_at: Utc::now(),
            duration: Duration::ZERO,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Integrity check {}: {} errors, {} warnings",
            if self.valid { "passed" } else { "failed" },
            self.errors.len(),
            self.warnings.len()
        )
    }

    fn error(&mut self, count: usize, what: &str) {
        if count > 0 {
            self.errors.push(format!("{} {}", count, what));
        }
    }

    fn warning(&mut self, count: usize, what: &str) {
        if count > 0 {
            self.warnings.push(format!("{} {}", count, what));
        }
    }

    /// Count references that do not resolve and report them as one error
    fn dangling<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a u64>,
        known: &HashSet<u64>,
        what: &str,
    ) {
        let missing = ids.into_iter().filter(|id| !known.contains(id)).count();
        if missing > 0 {
            *self
                .statistics
                .entry("dangling_references".to_string())
                .or_default() += missing;
            self.error(missing, what);
        }
    }

    /// Record the count, unnamed records and duplicate external ids of one entity type
    fn scan<R: Record>(&mut self, entity: EntityType, records: &[R]) -> HashSet<u64> {
        self.statistics
            .insert(entity.key().to_string(), records.len());

        let unnamed = records
            .iter()
            .filter(|r| r.natural_key().trim().is_empty())
            .count();
        self.error(unnamed, &format!("{} without a name", entity));

        let duplicates = duplicate_external_ids(records);
        if !duplicates.is_empty() {
            self.warnings.push(format!(
                "Duplicate {} external ids: {}",
                entity,
                duplicates.join(", ")
            ));
        }

        records.iter().filter_map(Record::local_id).collect()
    }
}

/// External ids carried by more than one record, sorted
pub fn duplicate_external_ids<R: Record>(records: &[R]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for external_id in records.iter().filter_map(Record::external_id) {
        *seen.entry(external_id).or_default() += 1;
    }
    let mut duplicates: Vec<String> = seen
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(id, _)| id.to_string())
        .collect();
    duplicates.sort();
    duplicates
}

/// Checks the local store for consistency after a run
pub struct IntegrityChecker {
    store: Store,
}

impl IntegrityChecker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Scan every repository.
    ///
    /// # Errors
    /// `SyncError::Persistence` when a repository cannot be read.
    pub async fn check(&self) -> Result<IntegrityReport, SyncError> {
        let started = Instant::now();
        let mut report = IntegrityReport::new();
        let store = &self.store;

        let show_types = store.show_types.find_all().await?;
        let seasons = store.seasons.find_all().await?;
        let templates = store.show_templates.find_all().await?;
        let shows = store.shows.find_all().await?;
        let wrestlers = store.wrestlers.find_all().await?;
        let npcs = store.npcs.find_all().await?;
        let factions = store.factions.find_all().await?;
        let teams = store.teams.find_all().await?;
        let titles = store.titles.find_all().await?;
        let injuries = store.injuries.find_all().await?;
        let rivalries = store.rivalries.find_all().await?;
        let segments = store.segments.find_all().await?;

        let show_type_ids = report.scan(EntityType::ShowTypes, &show_types);
        let season_ids = report.scan(EntityType::Seasons, &seasons);
        let template_ids = report.scan(EntityType::ShowTemplates, &templates);
        let show_ids = report.scan(EntityType::Shows, &shows);
        let wrestler_ids = report.scan(EntityType::Wrestlers, &wrestlers);
        report.scan(EntityType::Npcs, &npcs);
        let faction_ids = report.scan(EntityType::Factions, &factions);
        report.scan(EntityType::Teams, &teams);
        report.scan(EntityType::Titles, &titles);
        report.scan(EntityType::Injuries, &injuries);
        report.scan(EntityType::Rivalries, &rivalries);
        report.scan(EntityType::Segments, &segments);

        let untyped = shows
            .iter()
            .filter(|show| !show_type_ids.contains(&show.show_type_id))
            .count();
        report.error(untyped, "shows without a show type");
        report.dangling(
            shows.iter().filter_map(|show| show.season_id.as_ref()),
            &season_ids,
            "shows referencing a missing season",
        );
        report.dangling(
            shows.iter().filter_map(|show| show.template_id.as_ref()),
            &template_ids,
            "shows referencing a missing show template",
        );
        let horizon = Utc::now()
            .date_naive()
            .checked_add_months(Months::new(MAX_FUTURE_MONTHS));
        let far_future = shows
            .iter()
            .filter(|show| show.show_date.zip(horizon).is_some_and(|(date, limit)| date > limit))
            .count();
        report.warning(far_future, "shows dated more than 10 years ahead");

        report.dangling(
            templates.iter().map(|template| &template.show_type_id),
            &show_type_ids,
            "show templates referencing a missing show type",
        );

        let empty_factions = factions.iter().filter(|f| f.member_ids.is_empty()).count();
        report.warning(empty_factions, "factions without members");
        report.dangling(
            factions.iter().flat_map(|f| f.member_ids.iter().chain(f.leader_id.as_ref())),
            &wrestler_ids,
            "faction members or leaders referencing a missing wrestler",
        );

        let empty_teams = teams.iter().filter(|t| t.member_ids.is_empty()).count();
        report.error(empty_teams, "teams without members");
        let single_teams = teams.iter().filter(|t| t.member_ids.len() == 1).count();
        report.warning(single_teams, "teams with only one member");
        report.dangling(
            teams.iter().flat_map(|t| t.member_ids.iter()),
            &wrestler_ids,
            "team members referencing a missing wrestler",
        );
        report.dangling(
            teams.iter().filter_map(|t| t.faction_id.as_ref()),
            &faction_ids,
            "teams referencing a missing faction",
        );

        report.dangling(
            titles.iter().flat_map(|t| t.champion_ids.iter()),
            &wrestler_ids,
            "champions referencing a missing wrestler",
        );
        report.dangling(
            injuries.iter().map(|i| &i.wrestler_id),
            &wrestler_ids,
            "injuries referencing a missing wrestler",
        );
        report.dangling(
            rivalries.iter().flat_map(|r| r.wrestler_ids.iter()),
            &wrestler_ids,
            "rivals referencing a missing wrestler",
        );
        report.dangling(
            segments.iter().map(|s| &s.show_id),
            &show_ids,
            "segments referencing a missing show",
        );
        report.dangling(
            segments
                .iter()
                .flat_map(|s| s.participant_ids.iter().chain(s.winner_ids.iter())),
            &wrestler_ids,
            "segment participants referencing a missing wrestler",
        );

        report.valid = report.errors.is_empty();
        report.duration = started.elapsed();
        if report.valid {
            info!("{}", report.summary());
        } else {
            warn!(errors = ?report.errors, "{}", report.summary());
        }
        Ok(report)
    }
}
