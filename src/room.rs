//! Rooms and the room registry
//!
//! A room is a named multicast group over session handles. The registry
//! creates rooms on first join, destroys them when the last member leaves,
//! and performs broadcast fan-out under its lock so every recipient sees a
//! consistent per-room order of messages.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::error::RoomError;
use crate::session::SessionHandle;
use crate::types::{SessionId, MAX_ROOMS, MAX_SESSIONS};

/// A named chat room
///
/// Members are kept in join order; fan-out iterates that order. A room only
/// exists while it has at least one member, so there is no separate active
/// flag: presence in the registry map is liveness.
#[derive(Debug)]
pub struct Room {
    members: Vec<SessionHandle>,
}

impl Room {
    fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Number of members in the room
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Whether the given session is a member
    pub fn contains(&self, id: SessionId) -> bool {
        self.members.iter().any(|m| m.id == id)
    }

    /// Remove a member, preserving the order of the rest
    fn remove(&mut self, id: SessionId) {
        self.members.retain(|m| m.id != id);
    }
}

/// Registry of all active rooms
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Room>>,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session to the named room, creating the room on demand
    ///
    /// The caller validates the name and guarantees the session is not a
    /// member of any room. Creation and first-member insertion are one
    /// critical section, so a room is never observable with zero members.
    pub async fn join(&self, room_name: &str, handle: SessionHandle) -> Result<(), RoomError> {
        let mut rooms = self.rooms.lock().await;
        match rooms.get_mut(room_name) {
            Some(room) => {
                if room.member_count() >= MAX_SESSIONS {
                    return Err(RoomError::Full);
                }
                room.members.push(handle);
            }
            None => {
                if rooms.len() >= MAX_ROOMS {
                    return Err(RoomError::NoSlot);
                }
                let mut room = Room::new();
                room.members.push(handle);
                rooms.insert(room_name.to_string(), room);
            }
        }
        Ok(())
    }

    /// Remove a session from the named room
    ///
    /// Destroys the room in the same critical section when the last member
    /// leaves.
    pub async fn leave(&self, room_name: &str, id: SessionId) {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get_mut(room_name) {
            room.remove(id);
            if room.member_count() == 0 {
                rooms.remove(room_name);
            }
        }
    }

    /// Fan a formatted room message out to every member except the sender
    ///
    /// Sends happen under the registry lock, which serializes broadcasts to
    /// a room into one total order. Each send is best-effort: a dead member
    /// neither stops the fan-out nor blocks the others.
    pub async fn broadcast(&self, room_name: &str, sender: SessionId, sender_name: &str, msg: &str) {
        let rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_name) {
            let line = format!("[{}] {}: {}\n", room_name, sender_name, msg);
            for member in &room.members {
                if member.id != sender {
                    let _ = member.send(line.clone());
                }
            }
        }
    }

    /// Whether the named room currently exists
    pub async fn exists(&self, room_name: &str) -> bool {
        self.rooms.lock().await.contains_key(room_name)
    }

    /// Member count of the named room (0 if it does not exist)
    pub async fn member_count(&self, room_name: &str) -> usize {
        self.rooms
            .lock()
            .await
            .get(room_name)
            .map(Room::member_count)
            .unwrap_or(0)
    }

    /// Number of active rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Names of every room the session currently appears in
    ///
    /// Membership is disjoint, so the result holds at most one name.
    pub async fn rooms_containing(&self, id: SessionId) -> Vec<String> {
        self.rooms
            .lock()
            .await
            .iter()
            .filter(|(_, room)| room.contains(id))
            .map(|(name, _)| name.clone())
            .collect()
    }
}
