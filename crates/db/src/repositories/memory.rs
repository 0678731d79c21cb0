use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use helpdesk_core::domain::ids::{MessageId, SessionId};
use helpdesk_core::domain::message::ChatMessage;
use helpdesk_core::memory::{ConversationStore, Feedback, StoreError};

/// In-memory conversation store, used by tests and by embedders that do not
/// need durability.
#[derive(Default)]
pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
    feedback: RwLock<HashMap<String, Feedback>>,
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn add_message(&self, message: ChatMessage) -> Result<MessageId, StoreError> {
        let id = message.id.clone();
        let mut sessions = self.sessions.write().await;
        sessions.entry(message.session_id.0.clone()).or_default().push(message);
        Ok(id)
    }

    async fn history(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&session_id.0).cloned().unwrap_or_default())
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        count: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let sessions = self.sessions.read().await;
        let messages = sessions.get(&session_id.0).map(Vec::as_slice).unwrap_or_default();
        let start = messages.len().saturating_sub(count);
        Ok(messages[start..].to_vec())
    }

    async fn record_feedback(&self, feedback: Feedback) -> Result<(), StoreError> {
        let mut entries = self.feedback.write().await;
        entries.insert(feedback.message_id.0.clone(), feedback);
        Ok(())
    }

    async fn feedback_for_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Feedback>, StoreError> {
        let entries = self.feedback.read().await;
        Ok(entries.get(&message_id.0).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use helpdesk_core::domain::ids::{SessionId, UserId};
    use helpdesk_core::domain::message::{ChatMessage, MessageRole};
    use helpdesk_core::memory::{ConversationStore, Feedback};

    use super::InMemoryConversationStore;

    fn message(session: &str, content: &str) -> ChatMessage {
        ChatMessage::new(
            SessionId(session.to_string()),
            UserId("u-1".to_string()),
            MessageRole::User,
            content,
        )
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryConversationStore::default();
        store.add_message(message("s-1", "one")).await.expect("add");
        store.add_message(message("s-2", "two")).await.expect("add");

        let history = store.history(&SessionId("s-1".to_string())).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "one");
    }

    #[tokio::test]
    async fn recent_caps_at_available_messages() {
        let store = InMemoryConversationStore::default();
        store.add_message(message("s-1", "one")).await.expect("add");
        store.add_message(message("s-1", "two")).await.expect("add");

        let recent = store.recent(&SessionId("s-1".to_string()), 10).await.expect("recent");
        assert_eq!(recent.len(), 2);
        let recent = store.recent(&SessionId("s-1".to_string()), 1).await.expect("recent");
        assert_eq!(recent[0].content, "two");
    }

    #[tokio::test]
    async fn feedback_round_trip() {
        let store = InMemoryConversationStore::default();
        let message_id =
            store.add_message(message("s-1", "answer")).await.expect("add");

        store
            .record_feedback(Feedback {
                session_id: SessionId("s-1".to_string()),
                message_id: message_id.clone(),
                rating: 5,
                comment: Some("great".to_string()),
                timestamp: Utc::now(),
            })
            .await
            .expect("record");

        let found = store.feedback_for_message(&message_id).await.expect("fetch").expect("some");
        assert_eq!(found.rating, 5);
    }
}
