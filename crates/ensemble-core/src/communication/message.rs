//! Messages exchanged between agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Task,
    Result,
    Feedback,
    Coordination,
    Notification,
    Query,
    Response,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A message on the bus. `to_agent_id = None` means broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub from_agent_id: String,
    pub to_agent_id: Option<String>,
    pub message_type: MessageType,
    pub content: Value,
    pub priority: MessagePriority,
    pub timestamp: DateTime<Utc>,
    pub requires_response: bool,
    /// Id of the message this one answers, if any.
    pub correlation_id: Option<Uuid>,
}

impl Message {
    /// A message addressed to a single agent.
    pub fn direct(
        from: impl Into<String>,
        to: impl Into<String>,
        message_type: MessageType,
        content: impl Into<Value>,
    ) -> Self {
        Self::build(from.into(), Some(to.into()), message_type, content.into())
    }

    /// A message for every subscriber.
    pub fn broadcast(
        from: impl Into<String>,
        message_type: MessageType,
        content: impl Into<Value>,
    ) -> Self {
        Self::build(from.into(), None, message_type, content.into())
    }

    fn build(from: String, to: Option<String>, message_type: MessageType, content: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_agent_id: from,
            to_agent_id: to,
            message_type,
            content,
            priority: MessagePriority::Normal,
            timestamp: Utc::now(),
            requires_response: false,
            correlation_id: None,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    /// Build a direct reply to this message, correlated by id.
    pub fn reply(&self, from: impl Into<String>, content: impl Into<Value>) -> Self {
        let mut reply = Self::build(
            from.into(),
            Some(self.from_agent_id.clone()),
            MessageType::Response,
            content.into(),
        );
        reply.correlation_id = Some(self.id);
        reply
    }

    pub fn is_broadcast(&self) -> bool {
        self.to_agent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_is_correlated_and_addressed_to_sender() {
        let query =
            Message::direct("a", "b", MessageType::Query, json!({"q": 1})).requiring_response();
        let reply = query.reply("b", json!({"a": 2}));

        assert_eq!(reply.to_agent_id.as_deref(), Some("a"));
        assert_eq!(reply.correlation_id, Some(query.id));
        assert_eq!(reply.message_type, MessageType::Response);
        assert!(query.requires_response);
    }

    #[test]
    fn test_broadcast_has_no_recipient() {
        let msg = Message::broadcast("a", MessageType::Notification, "hi");
        assert!(msg.is_broadcast());
        assert_eq!(msg.priority, MessagePriority::Normal);
    }

    #[test]
    fn test_message_serde_roundtrip() {
        let msg = Message::direct("a", "b", MessageType::Task, json!([1, 2]))
            .with_priority(MessagePriority::Urgent);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
