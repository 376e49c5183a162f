//! Conversation message and envelope types.
//!
//! These are the value objects owned by the conversation store. The
//! orchestration core reads them for history and produces new ones as
//! replies; it never mutates a message after construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a message comes from or is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    /// The end customer
    Customer,
    /// A human support agent
    Agent,
    /// An automated robot
    Robot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Message,
    Event,
}

/// The body of a message. Only `text/plain` is consumed by robots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MessageContent {
    #[serde(rename = "text/plain")]
    Text(String),
    #[serde(rename = "application/json")]
    Json(serde_json::Value),
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Fold an error into user-visible content.
    pub fn error(err: &dyn std::fmt::Display) -> Self {
        Self::Text(format!("Sorry, I ran into a problem: {err}"))
    }

    /// The text payload, if this is a `text/plain` body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text(_) => "text/plain",
            Self::Json(_) => "application/json",
        }
    }
}

/// A message as persisted by the conversation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: ConversationId,
    pub from_role: Participant,
    pub to_role: Participant,
    #[serde(default)]
    pub message_type: MessageType,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationMessage {
    /// Build a fresh message with a generated id and current timestamps.
    pub fn new(
        conversation_id: ConversationId,
        from_role: Participant,
        to_role: Participant,
        content: MessageContent,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id,
            from_role,
            to_role,
            message_type: MessageType::Message,
            content,
            created_at: now,
            updated_at: now,
        }
    }

    /// A plain-text message from a customer to the robot.
    pub fn customer(conversation_id: ConversationId, text: impl Into<String>) -> Self {
        Self::new(
            conversation_id,
            Participant::Customer,
            Participant::Robot,
            MessageContent::text(text),
        )
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

/// Creation payload handed to the conversation store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub from_role: Participant,
    pub to_role: Participant,
    #[serde(default)]
    pub message_type: MessageType,
    pub content: MessageContent,
}

impl NewMessage {
    /// A robot reply addressed back to whoever sent `to`.
    pub fn robot_reply(to: &ConversationMessage, content: MessageContent) -> Self {
        Self {
            conversation_id: to.conversation_id.clone(),
            from_role: Participant::Robot,
            to_role: to.from_role,
            message_type: MessageType::Message,
            content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    Request,
    Response,
}

/// Transient wrapper used at the request/response boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub message_id: String,
    pub request_or_response: EnvelopeKind,
    pub envelope_payload: ConversationMessage,
}

impl MessageEnvelope {
    pub fn request(message: ConversationMessage) -> Self {
        Self {
            message_id: message.id.clone(),
            request_or_response: EnvelopeKind::Request,
            envelope_payload: message,
        }
    }

    pub fn response(message: ConversationMessage) -> Self {
        Self {
            message_id: message.id.clone(),
            request_or_response: EnvelopeKind::Response,
            envelope_payload: message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_message_is_addressed_to_robot() {
        let msg = ConversationMessage::customer(ConversationId::from("c1"), "hi");
        assert_eq!(msg.from_role, Participant::Customer);
        assert_eq!(msg.to_role, Participant::Robot);
        assert_eq!(msg.text(), Some("hi"));
    }

    #[test]
    fn content_uses_tagged_wire_shape() {
        let content = MessageContent::text("hello");
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "text/plain");
        assert_eq!(json["payload"], "hello");
    }

    #[test]
    fn message_fields_are_camel_case() {
        let msg = ConversationMessage::customer(ConversationId::from("c1"), "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["fromRole"], "customer");
        assert_eq!(json["toRole"], "robot");
    }

    #[test]
    fn json_content_has_no_text() {
        let content = MessageContent::Json(serde_json::json!({"a": 1}));
        assert!(content.as_text().is_none());
        assert_eq!(content.content_type(), "application/json");
    }

    #[test]
    fn robot_reply_swaps_roles() {
        let msg = ConversationMessage::new(
            ConversationId::from("c1"),
            Participant::Agent,
            Participant::Robot,
            MessageContent::text("status?"),
        );
        let reply = NewMessage::robot_reply(&msg, MessageContent::text("ok"));
        assert_eq!(reply.from_role, Participant::Robot);
        assert_eq!(reply.to_role, Participant::Agent);
        assert_eq!(reply.conversation_id, msg.conversation_id);
    }

    #[test]
    fn envelope_keeps_message_id() {
        let msg = ConversationMessage::customer(ConversationId::from("c1"), "hi");
        let env = MessageEnvelope::request(msg.clone());
        assert_eq!(env.message_id, msg.id);
        assert_eq!(env.request_or_response, EnvelopeKind::Request);
    }
}
