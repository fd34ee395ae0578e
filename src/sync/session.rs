//! Run sessions.
//!
//! A session is the caller-defined scope of one logical run, such as one scheduler tick or one
//! manual trigger. Within a session each entity type is synchronized at most once: a claim is
//! refused while another trigger holds the entity type, and after it has been synced. A claim
//! that is dropped without being completed is released, so a failed entity type can be retried
//! by a later trigger of the same session.

use super::locks::guard;
use super::types::EntityType;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    InFlight,
    Synced,
}

/// Why a claim was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimRefused {
    AlreadySynced,
    InFlight,
}

#[derive(Default)]
pub struct SessionManager {
    sessions: Mutex<HashMap<String, BTreeMap<EntityType, EntryState>>>,
    counter: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh, unique session id
    pub fn new_session_id(&self, prefix: &str) -> String {
        format!(
            "{}-{}-{}",
            prefix,
            Utc::now().format("%Y%m%d%H%M%S"),
            self.counter.fetch_add(1, Ordering::Relaxed) + 1
        )
    }

    /// Claim an entity type for synchronization within a session
    pub fn claim(&self, session_id: &str, entity: EntityType) -> Result<SessionClaim<'_>, ClaimRefused> {
        let mut sessions = guard(&self.sessions);
        let entries = sessions.entry(session_id.to_string()).or_default();
        match entries.get(&entity) {
            Some(EntryState::Synced) => Err(ClaimRefused::AlreadySynced),
            Some(EntryState::InFlight) => Err(ClaimRefused::InFlight),
            None => {
                entries.insert(entity, EntryState::InFlight);
                debug!("Session {} claimed {}", session_id, entity);
                Ok(SessionClaim {
                    manager: self,
                    session_id: session_id.to_string(),
                    entity,
                    completed: false,
                })
            }
        }
    }

    pub fn is_synced(&self, session_id: &str, entity: EntityType) -> bool {
        guard(&self.sessions)
            .get(session_id)
            .and_then(|entries| entries.get(&entity))
            .is_some_and(|state| *state == EntryState::Synced)
    }

    /// Entity types synced in a session, in priority order
    pub fn synced_entities(&self, session_id: &str) -> Vec<EntityType> {
        guard(&self.sessions)
            .get(session_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, state)| **state == EntryState::Synced)
                    .map(|(entity, _)| *entity)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forget a session. Returns whether it existed.
    pub fn end_session(&self, session_id: &str) -> bool {
        let removed = guard(&self.sessions).remove(session_id).is_some();
        if removed {
            debug!("Session {} ended", session_id);
        }
        removed
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = guard(&self.sessions).keys().cloned().collect();
        sessions.sort();
        sessions
    }

    fn finish(&self, session_id: &str, entity: EntityType, synced: bool) {
        let mut sessions = guard(&self.sessions);
        let Some(entries) = sessions.get_mut(session_id) else {
            return;
        };
        if synced {
            entries.insert(entity, EntryState::Synced);
        } else {
            entries.remove(&entity);
        }
    }
}

/// An entity type held by one trigger of a session, released on drop unless completed
pub struct SessionClaim<'a> {
    manager: &'a SessionManager,
    session_id: String,
    entity: EntityType,
    completed: bool,
}

impl SessionClaim<'_> {
    pub fn entity(&self) -> EntityType {
        self.entity
    }

    /// Mark the entity type synced for the rest of the session
    pub fn complete(mut self) {
        self.completed = true;
        self.manager.finish(&self.session_id, self.entity, true);
    }
}

impl Drop for SessionClaim<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.manager.finish(&self.session_id, self.entity, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_claim_blocks_session() {
        let sessions = SessionManager::new();

        let claim = sessions
            .claim("tick-1", EntityType::Shows)
            .expect("First claim should succeed");
        assert_eq!(
            sessions.claim("tick-1", EntityType::Shows).err(),
            Some(ClaimRefused::InFlight)
        );
        claim.complete();

        assert!(sessions.is_synced("tick-1", EntityType::Shows));
        assert_eq!(
            sessions.claim("tick-1", EntityType::Shows).err(),
            Some(ClaimRefused::AlreadySynced)
        );
        assert!(sessions.claim("tick-2", EntityType::Shows).is_ok());
    }

    #[test]
    fn test_dropped_claim_is_released() {
        let sessions = SessionManager::new();
        {
            let _claim = sessions
                .claim("tick-1", EntityType::Wrestlers)
                .expect("Claim should succeed");
        }

        assert!(!sessions.is_synced("tick-1", EntityType::Wrestlers));
        assert!(sessions.claim("tick-1", EntityType::Wrestlers).is_ok());
    }

    #[test]
    fn test_end_session_forgets_state() {
        let sessions = SessionManager::new();
        sessions
            .claim("manual", EntityType::Titles)
            .expect("Claim should succeed")
            .complete();
        sessions
            .claim("manual", EntityType::Factions)
            .expect("Claim should succeed")
            .complete();

        assert_eq!(
            sessions.synced_entities("manual"),
            vec![EntityType::Factions, EntityType::Titles]
        );
        assert_eq!(sessions.active_sessions(), vec!["manual".to_string()]);
        assert!(sessions.end_session("manual"));
        assert!(!sessions.end_session("manual"));
        assert!(sessions.synced_entities("manual").is_empty());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let sessions = SessionManager::new();
        let first = sessions.new_session_id("scheduled");
        let second = sessions.new_session_id("scheduled");

        assert!(first.starts_with("scheduled-"));
        assert_ne!(first, second);
    }
}
