//! Presence Tracker
//!
//! Live roster of other connected participants. Each broadcast snapshot
//! replaces the roster wholesale; the online count arrives on its own
//! channel and is tracked independently.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::core::ids::ParticipantId;
use crate::network::protocol::{ProtocolError, RosterEntry};

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceEntry {
    /// Display name.
    pub display_name: String,
    /// Busy in a game.
    pub in_game: bool,
}

/// Read-only roster view.
pub type Roster = Arc<BTreeMap<ParticipantId, PresenceEntry>>;

/// Roster plus online count.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    local: ParticipantId,
    roster: Roster,
    online_count: Option<u64>,
}

impl PresenceTracker {
    /// Tracker that hides `local` from the roster.
    pub fn new(local: ParticipantId) -> Self {
        Self {
            local,
            roster: Arc::new(BTreeMap::new()),
            online_count: None,
        }
    }

    /// Replace the roster with a snapshot.
    pub fn replace(&mut self, snapshot: Vec<RosterEntry>) {
        let roster: BTreeMap<_, _> = snapshot
            .into_iter()
            .filter(|entry| entry.participant_id != self.local)
            .map(|entry| {
                (
                    entry.participant_id,
                    PresenceEntry {
                        display_name: entry.display_name,
                        in_game: entry.in_game,
                    },
                )
            })
            .collect();
        debug!(others = roster.len(), "Roster replaced");
        self.roster = Arc::new(roster);
    }

    /// Parse and apply a roster broadcast.
    pub fn apply_roster_json(&mut self, destination: &str, body: &str) -> Result<(), ProtocolError> {
        let snapshot: Vec<RosterEntry> = serde_json::from_str(body).map_err(|e| ProtocolError::Malformed {
            destination: destination.to_string(),
            reason: e.to_string(),
        })?;
        self.replace(snapshot);
        Ok(())
    }

    /// Record the aggregate online count.
    pub fn set_online_count(&mut self, count: u64) {
        self.online_count = Some(count);
    }

    /// Parse and apply an online-count broadcast.
    pub fn apply_count_json(&mut self, destination: &str, body: &str) -> Result<(), ProtocolError> {
        let count: u64 = serde_json::from_str(body.trim()).map_err(|e| ProtocolError::Malformed {
            destination: destination.to_string(),
            reason: e.to_string(),
        })?;
        self.set_online_count(count);
        Ok(())
    }

    /// Other participants, keyed by id.
    pub fn roster(&self) -> Roster {
        Arc::clone(&self.roster)
    }

    /// Last reported online count.
    pub fn online_count(&self) -> Option<u64> {
        self.online_count
    }

    /// Forget everything, e.g. after the link drops.
    pub fn clear(&mut self) {
        self.roster = Arc::new(BTreeMap::new());
        self.online_count = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str, in_game: bool) -> RosterEntry {
        RosterEntry {
            participant_id: ParticipantId::new(id),
            display_name: name.into(),
            in_game,
        }
    }

    #[test]
    fn test_snapshot_replaces_and_hides_self() {
        let mut tracker = PresenceTracker::new(ParticipantId::new("me"));
        tracker.replace(vec![entry("me", "alice", false), entry("b", "bob", true), entry("c", "carol", false)]);
        let roster = tracker.roster();
        assert_eq!(roster.len(), 2);
        assert!(!roster.contains_key(&ParticipantId::new("me")));
        assert!(roster[&ParticipantId::new("b")].in_game);

        // bob left; no merge with the previous snapshot.
        tracker.replace(vec![entry("c", "carol", true)]);
        assert_eq!(tracker.roster().len(), 1);
        assert!(tracker.roster()[&ParticipantId::new("c")].in_game);

        // Earlier readers keep their snapshot.
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_count_is_independent() {
        let mut tracker = PresenceTracker::new(ParticipantId::new("me"));
        assert_eq!(tracker.online_count(), None);
        tracker.apply_count_json("/topic/online-count", "7").unwrap();
        tracker.replace(vec![entry("b", "bob", false)]);
        assert_eq!(tracker.online_count(), Some(7));
        assert_eq!(tracker.roster().len(), 1);
    }

    #[test]
    fn test_malformed_broadcasts_keep_state() {
        let mut tracker = PresenceTracker::new(ParticipantId::new("me"));
        tracker.replace(vec![entry("b", "bob", false)]);
        tracker.set_online_count(2);

        let err = tracker.apply_roster_json("/topic/online-players", "{").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
        assert!(tracker.apply_count_json("/topic/online-count", "many").is_err());

        assert_eq!(tracker.roster().len(), 1);
        assert_eq!(tracker.online_count(), Some(2));
    }

    #[test]
    fn test_roster_json_uses_broker_fields() {
        let mut tracker = PresenceTracker::new(ParticipantId::new("me"));
        tracker
            .apply_roster_json(
                "/topic/online-players",
                r#"[{"userId":"me","username":"alice"},{"userId":"b","username":"bob","inGame":true}]"#,
            )
            .unwrap();
        let roster = tracker.roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[&ParticipantId::new("b")].display_name, "bob");
    }
}
