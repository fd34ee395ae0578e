//! Local entity records.
//!
//! Every record carries a local id assigned by its repository and an optional external id that
//! correlates it with its page in the content source. Fields documented as local-only are never
//! present in the content source and must survive re-synchronization.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Common surface the reconciliation and repositories need from a record
pub trait Record: Clone + Send + Sync + 'static {
    fn local_id(&self) -> Option<u64>;
    fn assign_local_id(&mut self, id: u64);
    fn external_id(&self) -> Option<&str>;
    fn assign_external_id(&mut self, external_id: &str);
    /// Fallback correlation key, the record's name
    fn natural_key(&self) -> &str;
}

macro_rules! named_record {
    ($($record:ty),+ $(,)?) => {
        $(
            impl Record for $record {
                fn local_id(&self) -> Option<u64> {
                    self.id
                }

                fn assign_local_id(&mut self, id: u64) {
                    self.id = Some(id);
                }

                fn external_id(&self) -> Option<&str> {
                    self.external_id.as_deref()
                }

                fn assign_external_id(&mut self, external_id: &str) {
                    self.external_id = Some(external_id.to_string());
                }

                fn natural_key(&self) -> &str {
                    &self.name
                }
            }
        )+
    };
}

named_record!(
    ShowType,
    Season,
    ShowTemplate,
    Show,
    Wrestler,
    Npc,
    Faction,
    Team,
    Title,
    Injury,
    Rivalry,
    Segment,
);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowType {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub expected_segments: Option<u32>,
    /// Local-only ordering used by the booking screens
    pub display_order: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub active: bool,
    /// Local-only
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowTemplate {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub show_type_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Show {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub show_date: Option<NaiveDate>,
    pub show_type_id: u64,
    pub season_id: Option<u64>,
    pub template_id: Option<u64>,
    /// Local-only, filled in when the show is simulated
    pub attendance: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wrestler {
    pub id: Option<u64>,
    pub external_id: Option<String>,
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
    /// Gameplay counters, local-only
    pub wins: u32,
    pub losses: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub role: Option<String>,
    pub description: Option<String>,
    /// Local-only
    pub appearances: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Faction {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub leader_id: Option<u64>,
    pub member_ids: Vec<u64>,
    pub active: bool,
    /// Local-only
    pub reputation: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub member_ids: Vec<u64>,
    pub faction_id: Option<u64>,
    pub active: bool,
    /// Gameplay counters, local-only
    pub wins: u32,
    pub losses: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub tier: Option<String>,
    pub gender: Option<String>,
    pub active: bool,
    /// Local-only. Title changes are decided by match results, not by the content source.
    pub champion_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Injury {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub wrestler_id: u64,
    pub severity: Option<String>,
    pub health_penalty: Option<i32>,
    pub active: bool,
    /// Local-only
    pub healed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rivalry {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub wrestler_ids: Vec<u64>,
    pub started_on: Option<NaiveDate>,
    pub ended_on: Option<NaiveDate>,
    /// Local-only, grows with every confrontation
    pub heat: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: Option<u64>,
    pub external_id: Option<String>,
    pub name: String,
    pub show_id: u64,
    pub segment_type: String,
    pub participant_ids: Vec<u64>,
    pub winner_ids: Vec<u64>,
    pub segment_date: Option<NaiveDate>,
    pub narration: Option<String>,
    /// Local-only
    pub rating: Option<u8>,
}
