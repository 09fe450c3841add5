//! Online presence tracking
//!
//! A user is online while at least one of their connections is registered.
//! Every mutation touches the user's entry under a single shard lock, so a
//! tab closing concurrently with another opening cannot lose the transition.
//! A connection belongs to the first identity it is marked online for.

use std::collections::HashSet;

use dashmap::{mapref::entry::Entry, DashMap};

use crate::websocket::ConnectionId;

/// Result of removing a connection from the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub user_id: String,
    /// True when this was the user's last connection
    pub last: bool,
}

pub trait PresenceTracker: Send + Sync {
    /// Register `conn` for `user_id`. Returns true only for the user's first connection.
    /// A connection already registered, under any identity, is left as is.
    fn mark_online(&self, user_id: &str, conn: ConnectionId) -> bool;

    /// Forget `conn`, reporting its owner if it had one.
    fn mark_offline(&self, conn: ConnectionId) -> Option<Departure>;

    fn is_online(&self, user_id: &str) -> bool;
}

/// Single-process tracker backed by a bidirectional index.
#[derive(Default)]
pub struct InMemoryPresence {
    /// user_id -> live connections
    users: DashMap<String, HashSet<ConnectionId>>,
    /// connection -> user_id, for O(1) removal
    owners: DashMap<ConnectionId, String>,
}

impl InMemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresenceTracker for InMemoryPresence {
    fn mark_online(&self, user_id: &str, conn: ConnectionId) -> bool {
        match self.owners.entry(conn) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(entry) => {
                entry.insert(user_id.to_string());
            }
        }

        let first = match self.users.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                let set = entry.get_mut();
                let first = set.is_empty();
                set.insert(conn);
                first
            }
            Entry::Vacant(entry) => {
                entry.insert(HashSet::from([conn]));
                true
            }
        };

        first
    }

    fn mark_offline(&self, conn: ConnectionId) -> Option<Departure> {
        let (_, user_id) = self.owners.remove(&conn)?;

        let last = match self.users.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().remove(&conn);
                if entry.get().is_empty() {
                    entry.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        };

        Some(Departure { user_id, last })
    }

    fn is_online(&self, user_id: &str) -> bool {
        self.users.get(user_id).map(|c| !c.is_empty()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_connection_presence() {
        let presence = InMemoryPresence::new();
        let (c1, c2) = (ConnectionId(1), ConnectionId(2));

        assert!(presence.mark_online("u1", c1));
        assert!(!presence.mark_online("u1", c2));
        assert!(presence.is_online("u1"));
        assert!(!presence.is_online("u2"));

        let departure = presence.mark_offline(c1).unwrap();
        assert_eq!(departure, Departure { user_id: "u1".into(), last: false });
        assert!(presence.is_online("u1"));

        let departure = presence.mark_offline(c2).unwrap();
        assert!(departure.last);
        assert!(!presence.is_online("u1"));
        assert!(presence.users.is_empty());
        assert!(presence.owners.is_empty());
    }

    #[test]
    fn test_mark_online_is_idempotent_per_connection() {
        let presence = InMemoryPresence::new();
        let c1 = ConnectionId(1);

        assert!(presence.mark_online("u1", c1));
        assert!(!presence.mark_online("u1", c1));

        // One removal is enough to go offline
        assert!(presence.mark_offline(c1).unwrap().last);
        assert!(!presence.is_online("u1"));
    }

    #[test]
    fn test_unknown_connection() {
        let presence = InMemoryPresence::new();
        assert!(presence.mark_offline(ConnectionId(7)).is_none());

        presence.mark_online("u1", ConnectionId(1));
        assert!(presence.mark_offline(ConnectionId(1)).is_some());
        assert!(presence.mark_offline(ConnectionId(1)).is_none());
    }

    #[test]
    fn test_connection_keeps_first_identity() {
        let presence = InMemoryPresence::new();
        let c1 = ConnectionId(1);

        assert!(presence.mark_online("u1", c1));
        assert!(!presence.mark_online("u2", c1));
        assert!(presence.is_online("u1"));
        assert!(!presence.is_online("u2"));

        // Its departure is reported for the identity it kept
        let departure = presence.mark_offline(c1).unwrap();
        assert_eq!(departure, Departure { user_id: "u1".into(), last: true });
        assert!(!presence.is_online("u1"));
    }
}
