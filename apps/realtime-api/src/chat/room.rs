//! In-memory chat room.
//!
//! Clients drive a room with `{type, roomId, sender, message}` events where
//! `type` is `ENTER`, `TALK` or `LEAVE`. Every event is rebroadcast to the
//! room's current participants.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use forum_common::id::{prefix, PrefixedId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::gateway::connection::{Connection, Frame};
use crate::gateway::events::ChatEnvelope;
use crate::gateway::registry::DeliveryReport;

use super::{ChatError, RoomContext, RoomState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Enter,
    Talk,
    Leave,
}

/// Room event sent by a client.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub message: String,
}

/// Room event sent to participants.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomFrame<'a> {
    #[serde(rename = "type")]
    kind: MessageKind,
    room_id: &'a str,
    sender: &'a str,
    message: &'a str,
    sent_at: DateTime<Utc>,
}

/// Public view of a room for the REST API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub participants: usize,
}

struct Participant {
    connection: Arc<Connection>,
    /// Display name from the participant's last ENTER.
    sender: String,
}

pub struct ChatRoom {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    participants: Mutex<Vec<Participant>>,
}

impl PrefixedId for ChatRoom {
    const PREFIX: &'static str = prefix::ROOM;
}

impl ChatRoom {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Self::generate(),
            name: name.into(),
            created_at: Utc::now(),
            participants: Mutex::new(Vec::new()),
        }
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            created_at: self.created_at,
            participants: self.participant_count(),
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participants.lock().len()
    }

    /// Add a participant, or refresh its display name if already present.
    fn join(&self, connection: &Arc<Connection>, sender: &str) {
        let mut participants = self.participants.lock();
        match participants.iter_mut().find(|p| p.connection.id == connection.id) {
            Some(existing) => existing.sender = sender.to_string(),
            None => participants.push(Participant {
                connection: Arc::clone(connection),
                sender: sender.to_string(),
            }),
        }
    }

    /// Remove a participant, returning its display name if it was present.
    fn leave(&self, connection: &Connection) -> Option<String> {
        let mut participants = self.participants.lock();
        let pos = participants
            .iter()
            .position(|p| p.connection.id == connection.id)?;
        Some(participants.remove(pos).sender)
    }

    fn encode(&self, kind: MessageKind, sender: &str, message: &str) -> Result<Frame, ChatError> {
        let frame = RoomFrame {
            kind,
            room_id: &self.id,
            sender,
            message,
            sent_at: Utc::now(),
        };
        serde_json::to_string(&frame)
            .map(Frame::from)
            .map_err(ChatError::Encode)
    }

    /// Remove `connection` and tell the remaining participants it left.
    fn announce_departure(
        &self,
        connection: &Connection,
        ctx: &RoomContext<'_>,
    ) -> Result<bool, ChatError> {
        let Some(sender) = self.leave(connection) else {
            return Ok(false);
        };
        let text = format!("{sender} left the room");
        let frame = self.encode(MessageKind::Leave, &sender, &text)?;
        self.broadcast(&frame, ctx);
        Ok(true)
    }

    /// Send a frame to the room's participants.
    ///
    /// Participants now bound to another room are dropped. Unbound ones are
    /// mid-disconnect and stay until `handle_disconnect` removes them.
    fn broadcast(&self, frame: &Frame, ctx: &RoomContext<'_>) -> DeliveryReport {
        let recipients: Vec<Arc<Connection>> = {
            let mut participants = self.participants.lock();
            let before = participants.len();
            participants.retain(|p| match ctx.membership.room_of(&p.connection) {
                Some(room_id) => room_id == self.id,
                None => true,
            });
            if participants.len() != before {
                tracing::debug!(
                    room_id = %self.id,
                    pruned = before - participants.len(),
                    "dropped participants bound to another room"
                );
            }
            participants.iter().map(|p| Arc::clone(&p.connection)).collect()
        };

        let mut report = DeliveryReport::default();
        for conn in recipients {
            if !conn.is_open() {
                tracing::warn!(room_id = %self.id, conn_id = %conn.id, "participant closed, skipping");
                report.skipped_closed += 1;
                continue;
            }
            match conn.send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(room_id = %self.id, conn_id = %conn.id, error = %e, "failed to deliver room frame");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[async_trait]
impl RoomState for ChatRoom {
    async fn handle_action(
        &self,
        connection: &Arc<Connection>,
        event: &ChatEnvelope,
        ctx: &RoomContext<'_>,
    ) -> Result<(), ChatError> {
        let msg = ChatMessage::deserialize(&event.body).map_err(ChatError::InvalidMessage)?;

        let text = match msg.kind {
            MessageKind::Enter => {
                self.join(connection, &msg.sender);
                format!("{} joined the room", msg.sender)
            }
            MessageKind::Talk => msg.message.clone(),
            MessageKind::Leave => {
                self.leave(connection);
                format!("{} left the room", msg.sender)
            }
        };

        let frame = self.encode(msg.kind, &msg.sender, &text)?;
        let report = self.broadcast(&frame, ctx);
        tracing::debug!(
            room_id = %self.id,
            conn_id = %connection.id,
            kind = ?msg.kind,
            delivered = report.delivered,
            "room event broadcast"
        );
        Ok(())
    }

    async fn handle_disconnect(
        &self,
        connection: &Arc<Connection>,
        ctx: &RoomContext<'_>,
    ) -> Result<(), ChatError> {
        if self.announce_departure(connection, ctx)? {
            tracing::info!(room_id = %self.id, conn_id = %connection.id, "participant disconnected");
        }
        Ok(())
    }

    async fn handle_rebind(
        &self,
        connection: &Arc<Connection>,
        ctx: &RoomContext<'_>,
    ) -> Result<(), ChatError> {
        if self.announce_departure(connection, ctx)? {
            tracing::debug!(room_id = %self.id, conn_id = %connection.id, "participant moved to another room");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::connection::test_connection;
    use crate::gateway::membership::RoomMembership;
    use crate::gateway::registry::SessionRegistry;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    struct Fixture {
        room: ChatRoom,
        sessions: SessionRegistry,
        membership: RoomMembership,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                room: ChatRoom::new("general"),
                sessions: SessionRegistry::new(),
                membership: RoomMembership::new(),
            }
        }

        fn ctx(&self) -> RoomContext<'_> {
            RoomContext {
                sessions: &self.sessions,
                membership: &self.membership,
            }
        }

        fn envelope(&self, body: Value) -> ChatEnvelope {
            ChatEnvelope {
                room_id: self.room.id.clone(),
                body,
            }
        }

        async fn send(&self, conn: &Arc<Connection>, kind: &str, sender: &str, message: &str) {
            self.membership.bind(conn, &self.room.id);
            let event = self.envelope(json!({
                "type": kind,
                "roomId": self.room.id,
                "sender": sender,
                "message": message,
            }));
            self.room.handle_action(conn, &event, &self.ctx()).await.unwrap();
        }
    }

    fn recv_json(rx: &mut mpsc::Receiver<Frame>) -> Value {
        serde_json::from_str(&rx.try_recv().expect("frame")).unwrap()
    }

    #[tokio::test]
    async fn enter_announces_to_participants() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (bob, mut rx_bob) = test_connection("bob@x.com");

        fx.send(&alice, "ENTER", "alice", "").await;
        let frame = recv_json(&mut rx_alice);
        assert_eq!(frame["type"], "ENTER");
        assert_eq!(frame["message"], "alice joined the room");
        assert_eq!(frame["roomId"], fx.room.id.as_str());

        fx.send(&bob, "ENTER", "bob", "").await;
        assert_eq!(recv_json(&mut rx_alice)["message"], "bob joined the room");
        assert_eq!(recv_json(&mut rx_bob)["message"], "bob joined the room");
        assert_eq!(fx.room.participant_count(), 2);
    }

    #[tokio::test]
    async fn enter_twice_keeps_one_participant() {
        let fx = Fixture::new();
        let (alice, _rx) = test_connection("alice@x.com");

        fx.send(&alice, "ENTER", "alice", "").await;
        fx.send(&alice, "ENTER", "alice2", "").await;

        assert_eq!(fx.room.participant_count(), 1);
    }

    #[tokio::test]
    async fn talk_is_relayed_verbatim() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (bob, mut rx_bob) = test_connection("bob@x.com");
        fx.send(&alice, "ENTER", "alice", "").await;
        fx.send(&bob, "ENTER", "bob", "").await;
        while rx_alice.try_recv().is_ok() {}
        while rx_bob.try_recv().is_ok() {}

        fx.send(&alice, "TALK", "alice", "hello").await;

        let frame = recv_json(&mut rx_bob);
        assert_eq!(frame["type"], "TALK");
        assert_eq!(frame["sender"], "alice");
        assert_eq!(frame["message"], "hello");
        assert!(frame["sentAt"].is_string());
        assert_eq!(recv_json(&mut rx_alice)["message"], "hello");
    }

    #[tokio::test]
    async fn leave_removes_participant() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (bob, mut rx_bob) = test_connection("bob@x.com");
        fx.send(&alice, "ENTER", "alice", "").await;
        fx.send(&bob, "ENTER", "bob", "").await;
        while rx_alice.try_recv().is_ok() {}
        while rx_bob.try_recv().is_ok() {}

        fx.send(&bob, "LEAVE", "bob", "").await;

        assert_eq!(fx.room.participant_count(), 1);
        assert_eq!(recv_json(&mut rx_alice)["message"], "bob left the room");
        assert!(rx_bob.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_announces_with_last_sender_name() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (bob, _rx_bob) = test_connection("bob@x.com");
        fx.send(&alice, "ENTER", "alice", "").await;
        fx.send(&bob, "ENTER", "bob", "").await;
        while rx_alice.try_recv().is_ok() {}

        fx.membership.unbind(&bob);
        fx.room.handle_disconnect(&bob, &fx.ctx()).await.unwrap();

        assert_eq!(fx.room.participant_count(), 1);
        let frame = recv_json(&mut rx_alice);
        assert_eq!(frame["type"], "LEAVE");
        assert_eq!(frame["message"], "bob left the room");
    }

    #[tokio::test]
    async fn disconnect_of_non_participant_is_silent() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (stranger, _rx) = test_connection("s@x.com");
        fx.send(&alice, "ENTER", "alice", "").await;
        while rx_alice.try_recv().is_ok() {}

        fx.room.handle_disconnect(&stranger, &fx.ctx()).await.unwrap();

        assert!(rx_alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn participant_moved_to_another_room_is_pruned() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (bob, mut rx_bob) = test_connection("bob@x.com");
        fx.send(&alice, "ENTER", "alice", "").await;
        fx.send(&bob, "ENTER", "bob", "").await;
        while rx_bob.try_recv().is_ok() {}
        while rx_alice.try_recv().is_ok() {}

        fx.membership.bind(&bob, "room_elsewhere");
        fx.send(&alice, "TALK", "alice", "still here?").await;

        assert!(rx_bob.try_recv().is_err());
        assert_eq!(recv_json(&mut rx_alice)["message"], "still here?");
        assert_eq!(fx.room.participant_count(), 1);
    }

    #[tokio::test]
    async fn talk_during_disconnect_keeps_leave_notice() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (bob, _rx_bob) = test_connection("bob@x.com");
        fx.send(&alice, "ENTER", "alice", "").await;
        fx.send(&bob, "ENTER", "bob", "").await;
        while rx_alice.try_recv().is_ok() {}

        // Bob's teardown has started: closed and unbound, room not yet told.
        bob.close();
        fx.membership.unbind(&bob);
        fx.send(&alice, "TALK", "alice", "anyone?").await;
        assert_eq!(recv_json(&mut rx_alice)["message"], "anyone?");

        fx.room.handle_disconnect(&bob, &fx.ctx()).await.unwrap();

        let frame = recv_json(&mut rx_alice);
        assert_eq!(frame["type"], "LEAVE");
        assert_eq!(frame["message"], "bob left the room");
        assert_eq!(fx.room.participant_count(), 1);
    }

    #[tokio::test]
    async fn rebind_removes_participant_and_announces() {
        let fx = Fixture::new();
        let (alice, mut rx_alice) = test_connection("alice@x.com");
        let (bob, mut rx_bob) = test_connection("bob@x.com");
        fx.send(&alice, "ENTER", "alice", "").await;
        fx.send(&bob, "ENTER", "bobby", "").await;
        while rx_alice.try_recv().is_ok() {}
        while rx_bob.try_recv().is_ok() {}

        fx.membership.bind(&bob, "room_elsewhere");
        fx.room.handle_rebind(&bob, &fx.ctx()).await.unwrap();

        assert_eq!(fx.room.participant_count(), 1);
        assert_eq!(recv_json(&mut rx_alice)["message"], "bobby left the room");
        assert!(rx_bob.try_recv().is_err());

        // A second rebind is a no-op.
        fx.room.handle_rebind(&bob, &fx.ctx()).await.unwrap();
        assert!(rx_alice.try_recv().is_err());
    }

    #[tokio::test]
    async fn invalid_message_is_an_error() {
        let fx = Fixture::new();
        let (alice, _rx) = test_connection("alice@x.com");
        let event = fx.envelope(json!({ "roomId": fx.room.id, "type": "DANCE" }));

        let result = fx.room.handle_action(&alice, &event, &fx.ctx()).await;

        assert!(matches!(result, Err(ChatError::InvalidMessage(_))));
        assert_eq!(fx.room.participant_count(), 0);
    }

    #[test]
    fn summary_reports_participants() {
        let room = ChatRoom::new("general");
        let summary = room.summary();
        assert!(summary.id.starts_with("room_"));
        assert_eq!(summary.name, "general");
        assert_eq!(summary.participants, 0);
    }
}
