//! Connection lifecycle and per-message routing.
//!
//! Each inbound frame is decoded once and then checked against both the
//! comment-notification shape and the chat shape; either, both or neither
//! may apply. Nothing that goes wrong while handling a frame closes the
//! connection. Only the transport ends a connection, via `disconnect`.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::chat::{ChatService, RoomContext};

use super::connection::{Connection, Frame};
use super::events::{
    decode_payload, ChatEnvelope, CommentNotification, GatewayError, NotificationFrame,
};
use super::identity::resolve_identity;
use super::membership::RoomMembership;
use super::registry::{DeliveryReport, SessionRegistry};

/// What happened to the chat part of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatDispatch {
    Handled { room_id: String },
    UnknownRoom { room_id: String },
    Failed { room_id: String },
}

/// Summary of one processed frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub notification: Option<DeliveryReport>,
    pub chat: Option<ChatDispatch>,
}

impl MessageOutcome {
    /// The frame matched neither shape.
    pub fn is_noop(&self) -> bool {
        self.notification.is_none() && self.chat.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStats {
    pub connections: usize,
    pub identities: usize,
    pub room_bindings: usize,
}

pub struct Gateway {
    sessions: SessionRegistry,
    membership: RoomMembership,
    chat: Arc<dyn ChatService>,
    notification_prefix: String,
}

impl Gateway {
    pub fn new(chat: Arc<dyn ChatService>, notification_prefix: impl Into<String>) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            membership: RoomMembership::new(),
            chat,
            notification_prefix: notification_prefix.into(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn membership(&self) -> &RoomMembership {
        &self.membership
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            connections: self.sessions.connection_count(),
            identities: self.sessions.identity_count(),
            room_bindings: self.membership.len(),
        }
    }

    fn room_context(&self) -> RoomContext<'_> {
        RoomContext {
            sessions: &self.sessions,
            membership: &self.membership,
        }
    }

    /// Resolve the caller's routing key and register a new connection under it.
    pub fn connect(
        &self,
        query: Option<&str>,
        remote_addr: SocketAddr,
        outbound: mpsc::Sender<Frame>,
    ) -> Arc<Connection> {
        let identity = resolve_identity(query, remote_addr);
        let connection = Arc::new(Connection::new(identity, remote_addr, outbound));
        self.sessions
            .register(connection.identity(), Arc::clone(&connection));

        tracing::info!(
            conn_id = %connection.id,
            identity = %connection.identity(),
            %remote_addr,
            "gateway connection established"
        );
        connection
    }

    /// Process one inbound text frame. Errors are logged and absorbed; `None`
    /// means the frame was rejected.
    pub async fn handle_text(&self, connection: &Arc<Connection>, text: &str) -> Option<MessageOutcome> {
        match self.dispatch(connection, text).await {
            Ok(outcome) => {
                if outcome.is_noop() {
                    tracing::debug!(conn_id = %connection.id, "payload matched no known shape");
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::warn!(conn_id = %connection.id, error = %e, "failed to handle message");
                None
            }
        }
    }

    async fn dispatch(
        &self,
        connection: &Arc<Connection>,
        text: &str,
    ) -> Result<MessageOutcome, GatewayError> {
        let payload = decode_payload(text)?;

        // A failed notification must not keep the chat step from running.
        let notification = match CommentNotification::probe(&payload) {
            Some(comment) => match self.notify_author(&comment) {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::warn!(conn_id = %connection.id, error = %e, "failed to send comment notification");
                    None
                }
            },
            None => None,
        };

        let chat = match ChatEnvelope::probe(&payload) {
            Some(envelope) => Some(self.dispatch_chat(connection, envelope).await),
            None => None,
        };

        Ok(MessageOutcome { notification, chat })
    }

    fn notify_author(&self, comment: &CommentNotification) -> Result<DeliveryReport, GatewayError> {
        let frame = NotificationFrame::for_comment(&self.notification_prefix, comment).encode()?;
        let report = self.sessions.broadcast_to(comment.recipient(), &frame);
        tracing::debug!(
            recipient = %comment.recipient(),
            delivered = report.delivered,
            skipped = report.skipped_closed,
            failed = report.failed,
            "comment notification sent"
        );
        Ok(report)
    }

    async fn dispatch_chat(&self, connection: &Arc<Connection>, envelope: ChatEnvelope) -> ChatDispatch {
        let room_id = envelope.room_id.clone();
        if let Some(previous) = self.membership.bind(connection, &room_id) {
            if previous != room_id {
                self.leave_previous_room(connection, &previous).await;
            }
        }

        let Some(room) = self.chat.find_room(&room_id).await else {
            tracing::warn!(conn_id = %connection.id, %room_id, "chat room not found");
            return ChatDispatch::UnknownRoom { room_id };
        };

        match room
            .handle_action(connection, &envelope, &self.room_context())
            .await
        {
            Ok(()) => ChatDispatch::Handled { room_id },
            Err(e) => {
                tracing::warn!(conn_id = %connection.id, %room_id, error = %e, "chat room rejected event");
                ChatDispatch::Failed { room_id }
            }
        }
    }

    async fn leave_previous_room(&self, connection: &Arc<Connection>, room_id: &str) {
        let Some(room) = self.chat.find_room(room_id).await else {
            tracing::debug!(conn_id = %connection.id, %room_id, "previous chat room no longer exists");
            return;
        };
        if let Err(e) = room.handle_rebind(connection, &self.room_context()).await {
            tracing::warn!(conn_id = %connection.id, %room_id, error = %e, "room failed to release rebound connection");
        }
    }

    /// Tear down a connection. Runs once per connection; later calls return
    /// `false` and do nothing.
    pub async fn disconnect(&self, connection: &Arc<Connection>, reason: Option<&str>) -> bool {
        if !connection.close() {
            tracing::debug!(conn_id = %connection.id, "connection already torn down");
            return false;
        }

        self.sessions.deregister(connection.identity(), connection);

        match self.membership.unbind(connection) {
            Some(room_id) => match self.chat.find_room(&room_id).await {
                Some(room) => {
                    if let Err(e) = room.handle_disconnect(connection, &self.room_context()).await {
                        tracing::warn!(conn_id = %connection.id, %room_id, error = %e, "room failed to handle disconnect");
                    }
                }
                None => {
                    tracing::warn!(conn_id = %connection.id, %room_id, "chat room not found for closed connection");
                }
            },
            None => {
                tracing::debug!(conn_id = %connection.id, "closed connection had no room binding");
            }
        }

        tracing::info!(
            conn_id = %connection.id,
            identity = %connection.identity(),
            reason = reason.unwrap_or("none"),
            "gateway connection closed"
        );
        true
    }
}
