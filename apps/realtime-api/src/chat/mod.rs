//! Chat rooms, as seen by the gateway.
//!
//! The gateway only knows the two capability traits below. `room` and
//! `service` hold the in-memory implementation served by this binary.

pub mod room;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;

use crate::gateway::connection::Connection;
use crate::gateway::events::ChatEnvelope;
use crate::gateway::membership::RoomMembership;
use crate::gateway::registry::SessionRegistry;

/// Failures raised by a room while handling an event.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid chat message: {0}")]
    InvalidMessage(#[source] serde_json::Error),
    #[error("failed to encode chat frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Gateway state a room may consult while handling an event.
pub struct RoomContext<'a> {
    pub sessions: &'a SessionRegistry,
    pub membership: &'a RoomMembership,
}

/// Resolves room ids to room state.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn find_room(&self, room_id: &str) -> Option<Arc<dyn RoomState>>;
}

/// Per-room behaviour invoked by the gateway.
#[async_trait]
pub trait RoomState: Send + Sync {
    /// Handle a chat event sent by `connection` to this room.
    async fn handle_action(
        &self,
        connection: &Arc<Connection>,
        event: &ChatEnvelope,
        ctx: &RoomContext<'_>,
    ) -> Result<(), ChatError>;

    /// `connection` closed while bound to this room.
    async fn handle_disconnect(
        &self,
        connection: &Arc<Connection>,
        ctx: &RoomContext<'_>,
    ) -> Result<(), ChatError>;

    /// `connection` addressed another room and is no longer bound here.
    async fn handle_rebind(
        &self,
        _connection: &Arc<Connection>,
        _ctx: &RoomContext<'_>,
    ) -> Result<(), ChatError> {
        Ok(())
    }
}
