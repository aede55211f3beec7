//! Inbound payload shapes and outbound notification frames.
//!
//! An inbound text frame is decoded once into JSON and then probed against
//! each shape independently. A frame can match both, one, or neither.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::connection::Frame;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while handling a single inbound frame. Never escapes the router.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("malformed payload: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decode a raw text frame into a JSON object.
pub fn decode_payload(text: &str) -> Result<Value, GatewayError> {
    let value: Value = serde_json::from_str(text).map_err(GatewayError::Decode)?;
    if !value.is_object() {
        return Err(GatewayError::NotAnObject);
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Comment notification (client → server)
// ---------------------------------------------------------------------------

/// "Someone commented on your post" request, addressed to the post's author.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentNotification {
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub comment_content: Option<String>,
}

impl CommentNotification {
    /// Match the payload against the comment-notification shape. Only a
    /// non-empty `authorEmail` counts as a match.
    pub fn probe(payload: &Value) -> Option<Self> {
        let comment = Self::deserialize(payload).ok()?;
        comment
            .author_email
            .as_deref()
            .is_some_and(|email| !email.is_empty())
            .then_some(comment)
    }

    /// Routing key of the post author.
    pub fn recipient(&self) -> &str {
        self.author_email.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Chat envelope (client → server)
// ---------------------------------------------------------------------------

/// A room-scoped chat event. Only `roomId` is interpreted by the gateway;
/// the rest of `body` belongs to the room implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEnvelope {
    pub room_id: String,
    pub body: Value,
}

#[derive(Deserialize)]
struct RoomProbe {
    #[serde(rename = "roomId", default)]
    room_id: Option<String>,
}

impl ChatEnvelope {
    /// Match the payload against the chat shape (a non-empty string `roomId`).
    pub fn probe(payload: &Value) -> Option<Self> {
        let room_id = RoomProbe::deserialize(payload).ok()?.room_id?;
        if room_id.is_empty() {
            return None;
        }
        Some(Self {
            room_id,
            body: payload.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Notification frame (server → client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NotificationFrame {
    pub message: String,
}

impl NotificationFrame {
    pub fn for_comment(prefix: &str, comment: &CommentNotification) -> Self {
        Self {
            message: format!("{prefix}{}", comment.comment_content.as_deref().unwrap_or_default()),
        }
    }

    pub fn encode(&self) -> Result<Frame, GatewayError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(GatewayError::Encode)
    }
}
