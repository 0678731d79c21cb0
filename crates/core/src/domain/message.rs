use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ids::{HandoffId, MessageId, SessionId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            "tool" => Ok(Self::Tool),
            other => Err(format!("unknown message role `{other}`")),
        }
    }
}

/// A tool call the engine requested while producing a response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: serde_json::Value,
}

/// Structured per-message annotations. The schema is fixed; every field is
/// optional rather than an open-ended map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needs_human_intervention: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_id: Option<HandoffId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff_reason: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.confidence_score.is_none()
            && self.needs_human_intervention.is_none()
            && self.handoff_id.is_none()
            && self.handoff_reason.is_none()
            && self.tool_calls.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl ChatMessage {
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId(Uuid::new_v4().to_string()),
            session_id,
            user_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: MessageMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, MessageMetadata, MessageRole};
    use crate::domain::ids::{SessionId, UserId};

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::System,
            MessageRole::Tool,
        ] {
            assert_eq!(role.as_str().parse::<MessageRole>(), Ok(role));
        }
        assert!("operator".parse::<MessageRole>().is_err());
    }

    #[test]
    fn default_metadata_is_empty() {
        let message = ChatMessage::new(
            SessionId("s-1".to_string()),
            UserId("u-1".to_string()),
            MessageRole::User,
            "hello",
        );
        assert!(message.metadata.is_empty());
    }

    #[test]
    fn metadata_serializes_without_absent_fields() {
        let metadata =
            MessageMetadata { needs_human_intervention: Some(true), ..MessageMetadata::default() };
        let json = serde_json::to_string(&metadata).expect("serialize metadata");
        assert_eq!(json, r#"{"needs_human_intervention":true}"#);
    }
}
