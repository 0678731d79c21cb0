use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::{MessageId, SessionId};
use crate::domain::message::ChatMessage;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

/// User feedback on a single assistant message, rated 1..=5.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub session_id: SessionId,
    pub message_id: MessageId,
    pub rating: u8,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Conversation persistence consumed by the orchestrator. Backends decide
/// durability; the orchestrator only relies on ordered history per session.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist a message and return its id.
    async fn add_message(&self, message: ChatMessage) -> Result<MessageId, StoreError>;

    /// Full history for a session, oldest first.
    async fn history(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>, StoreError>;

    /// The most recent `count` messages for a session, oldest first.
    async fn recent(
        &self,
        session_id: &SessionId,
        count: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn record_feedback(&self, feedback: Feedback) -> Result<(), StoreError>;

    async fn feedback_for_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Feedback>, StoreError>;
}
