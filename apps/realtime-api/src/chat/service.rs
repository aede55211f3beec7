use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use super::room::{ChatRoom, RoomSummary};
use super::{ChatService, RoomState};

/// Process-local room directory. Rooms live until removed or the process exits.
#[derive(Default)]
pub struct InMemoryChatService {
    rooms: DashMap<String, Arc<ChatRoom>>,
}

impl InMemoryChatService {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    pub fn create_room(&self, name: &str) -> Arc<ChatRoom> {
        let room = Arc::new(ChatRoom::new(name));
        self.rooms.insert(room.id.clone(), Arc::clone(&room));
        tracing::info!(room_id = %room.id, name = %room.name, "chat room created");
        room
    }

    /// All rooms, oldest first.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self.rooms.iter().map(|r| r.value().summary()).collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rooms
    }

    pub fn get_room(&self, room_id: &str) -> Option<Arc<ChatRoom>> {
        self.rooms.get(room_id).map(|r| Arc::clone(r.value()))
    }

    pub fn remove_room(&self, room_id: &str) -> Option<Arc<ChatRoom>> {
        let removed = self.rooms.remove(room_id).map(|(_, room)| room);
        if removed.is_some() {
            tracing::info!(%room_id, "chat room removed");
        }
        removed
    }
}

#[async_trait]
impl ChatService for InMemoryChatService {
    async fn find_room(&self, room_id: &str) -> Option<Arc<dyn RoomState>> {
        self.get_room(room_id)
            .map(|room| room as Arc<dyn RoomState>)
    }
}
