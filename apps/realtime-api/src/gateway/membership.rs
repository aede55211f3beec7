//! Which chat room each connection last addressed.
//!
//! A connection has at most one room binding. Binding again overwrites the
//! previous room; the binding is only cleared when the connection goes away.

use dashmap::DashMap;

use super::connection::Connection;

/// Thread-safe, DashMap-backed connection → room map.
#[derive(Default)]
pub struct RoomMembership {
    rooms: DashMap<String, String>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Bind `connection` to `room_id`, returning the room it was bound to before.
    pub fn bind(&self, connection: &Connection, room_id: &str) -> Option<String> {
        self.rooms
            .insert(connection.id.clone(), room_id.to_string())
    }

    /// Remove and return the connection's binding.
    pub fn unbind(&self, connection: &Connection) -> Option<String> {
        self.rooms.remove(&connection.id).map(|(_, room_id)| room_id)
    }

    /// Current room for a connection, if bound.
    pub fn room_of(&self, connection: &Connection) -> Option<String> {
        self.rooms.get(&connection.id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
