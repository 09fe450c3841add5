//! WebSocket connection management for Scroll Server
//!
//! Connections are grouped into rooms, one per chat. Every fan-out in the
//! gateway goes through one of the broadcast primitives below.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{mapref::entry::Entry, DashMap};
use scroll_core::ServerEvent;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Represents an active WebSocket connection
#[derive(Clone)]
pub struct Connection {
    /// Identity supplied in the handshake
    pub user_id: String,
    pub sender: mpsc::UnboundedSender<ServerEvent>,
}

/// Manages all active WebSocket connections and their room memberships
pub struct ConnectionHub {
    next_id: AtomicU64,
    connections: DashMap<ConnectionId, Connection>,
    /// room -> member connections
    rooms: DashMap<String, HashSet<ConnectionId>>,
    /// connection -> joined rooms, for cleanup on disconnect
    memberships: DashMap<ConnectionId, HashSet<String>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: DashMap::new(),
            rooms: DashMap::new(),
            memberships: DashMap::new(),
        }
    }

    /// Register a new connection
    pub fn register(
        &self,
        user_id: &str,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.insert(
            id,
            Connection {
                user_id: user_id.to_string(),
                sender,
            },
        );

        tracing::info!("Connection registered: user={}, {}", user_id, id);
        id
    }

    /// Unregister a connection and drop it from every room
    pub fn unregister(&self, conn: ConnectionId) {
        if let Some((_, rooms)) = self.memberships.remove(&conn) {
            for room in rooms {
                self.remove_member(&room, conn);
            }
        }

        if let Some((_, connection)) = self.connections.remove(&conn) {
            tracing::info!("Connection unregistered: user={}, {}", connection.user_id, conn);
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Subscribe a connection to a room. Returns false if already a member.
    pub fn join(&self, conn: ConnectionId, room: &str) -> bool {
        if !self.connections.contains_key(&conn) {
            return false;
        }

        self.memberships
            .entry(conn)
            .or_default()
            .insert(room.to_string());

        self.rooms.entry(room.to_string()).or_default().insert(conn)
    }

    pub fn leave(&self, conn: ConnectionId, room: &str) -> bool {
        if let Some(mut rooms) = self.memberships.get_mut(&conn) {
            rooms.remove(room);
        }
        self.remove_member(room, conn)
    }

    fn remove_member(&self, room: &str, conn: ConnectionId) -> bool {
        match self.rooms.entry(room.to_string()) {
            Entry::Occupied(mut entry) => {
                let removed = entry.get_mut().remove(&conn);
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        }
    }

    pub fn room_members(&self, room: &str) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .rooms
            .get(room)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Send to a single connection
    pub fn send_to(&self, conn: ConnectionId, event: ServerEvent) {
        if let Some(connection) = self.connections.get(&conn) {
            if let Err(e) = connection.sender.send(event) {
                tracing::warn!("Failed to send to {}: {}", conn, e);
            }
        }
    }

    fn deliver(
        &self,
        targets: impl IntoIterator<Item = ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let mut delivered = 0;
        for conn in targets {
            if let Some(connection) = self.connections.get(&conn) {
                match connection.sender.send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(e) => tracing::warn!("Failed to send to {}: {}", conn, e),
                }
            }
        }
        delivered
    }

    /// Broadcast to every member of the room, the originating connection included
    pub fn broadcast_to_room(&self, room: &str, event: ServerEvent) -> usize {
        self.deliver(self.room_members(room), &event)
    }

    /// Broadcast to every member of the room except `exclude`
    pub fn broadcast_to_room_except(
        &self,
        room: &str,
        exclude: ConnectionId,
        event: ServerEvent,
    ) -> usize {
        let targets = self.room_members(room).into_iter().filter(|c| *c != exclude);
        self.deliver(targets, &event)
    }

    /// Broadcast to every connection except `exclude`
    pub fn broadcast_except(&self, exclude: ConnectionId, event: ServerEvent) -> usize {
        let targets: Vec<ConnectionId> = self
            .connections
            .iter()
            .map(|entry| *entry.key())
            .filter(|c| *c != exclude)
            .collect();
        self.deliver(targets, &event)
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll_core::PresenceStatus;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_room_membership() {
        let hub = ConnectionHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let c1 = hub.register("u1", tx.clone());
        let c2 = hub.register("a1", tx);
        assert_ne!(c1, c2);

        assert!(hub.join(c1, "chat-1"));
        assert!(!hub.join(c1, "chat-1"));
        assert!(hub.join(c2, "chat-1"));
        assert!(hub.join(c1, "chat-2"));
        assert_eq!(hub.room_members("chat-1"), vec![c1, c2]);

        assert!(hub.leave(c2, "chat-1"));
        assert_eq!(hub.room_members("chat-1"), vec![c1]);

        hub.unregister(c1);
        assert!(hub.room_members("chat-1").is_empty());
        assert!(hub.room_members("chat-2").is_empty());
        assert_eq!(hub.connection_count(), 1);

        // Unknown connections cannot join
        assert!(!hub.join(c1, "chat-1"));
    }

    #[test]
    fn test_broadcast_primitives() {
        let hub = ConnectionHub::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let (tx3, mut rx3) = mpsc::unbounded_channel();

        let c1 = hub.register("u1", tx1);
        let c2 = hub.register("a1", tx2);
        let _c3 = hub.register("u2", tx3);
        hub.join(c1, "chat-1");
        hub.join(c2, "chat-1");

        assert_eq!(hub.broadcast_to_room("chat-1", ServerEvent::Pong), 2);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx3).is_empty());

        let typing = ServerEvent::typing("chat-1", "u1", true);
        assert_eq!(hub.broadcast_to_room_except("chat-1", c1, typing.clone()), 1);
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2), vec![typing]);

        let online = ServerEvent::status("u1", PresenceStatus::Online);
        assert_eq!(hub.broadcast_except(c1, online), 2);
        assert!(drain(&mut rx1).is_empty());
        assert_eq!(drain(&mut rx2).len(), 1);
        assert_eq!(drain(&mut rx3).len(), 1);

        // Broadcasting to an empty room is a no-op
        assert_eq!(hub.broadcast_to_room("nobody-here", ServerEvent::Pong), 0);
    }

    #[test]
    fn test_closed_receiver_is_skipped() {
        let hub = ConnectionHub::new();
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();

        let c1 = hub.register("u1", tx1);
        let c2 = hub.register("u2", tx2);
        hub.join(c1, "room");
        hub.join(c2, "room");
        drop(rx1);

        assert_eq!(hub.broadcast_to_room("room", ServerEvent::Pong), 1);
        assert_eq!(drain(&mut rx2), vec![ServerEvent::Pong]);
    }
}
