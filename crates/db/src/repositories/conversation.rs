use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use helpdesk_core::domain::ids::{MessageId, SessionId, UserId};
use helpdesk_core::domain::message::{ChatMessage, MessageMetadata, MessageRole};
use helpdesk_core::memory::{ConversationStore, Feedback, StoreError};

use crate::DbPool;

/// SQLite-backed conversation store. Timestamps are persisted as RFC 3339
/// text; ordering ties fall back to insertion order via rowid.
pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for SqlConversationStore {
    async fn add_message(&self, message: ChatMessage) -> Result<MessageId, StoreError> {
        let metadata_json = if message.metadata.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&message.metadata)
                    .map_err(|error| StoreError::Decode(error.to_string()))?,
            )
        };

        sqlx::query(
            "INSERT INTO messages (id, session_id, user_id, role, content, metadata_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.session_id.0)
        .bind(&message.user_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(metadata_json)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(message.id)
    }

    async fn history(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_id, role, content, metadata_json, created_at
             FROM messages
             WHERE session_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        count: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_id, role, content, metadata_json, created_at
             FROM messages
             WHERE session_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&session_id.0)
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut messages =
            rows.into_iter().map(message_from_row).collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn record_feedback(&self, feedback: Feedback) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO feedback (message_id, session_id, rating, comment, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (message_id) DO UPDATE SET
                rating = excluded.rating,
                comment = excluded.comment,
                created_at = excluded.created_at",
        )
        .bind(&feedback.message_id.0)
        .bind(&feedback.session_id.0)
        .bind(i64::from(feedback.rating))
        .bind(&feedback.comment)
        .bind(feedback.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn feedback_for_message(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<Feedback>, StoreError> {
        let row = sqlx::query(
            "SELECT message_id, session_id, rating, comment, created_at
             FROM feedback
             WHERE message_id = ?",
        )
        .bind(&message_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(feedback_from_row).transpose()
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

fn message_from_row(row: SqliteRow) -> Result<ChatMessage, StoreError> {
    let role: String = row.get("role");
    let role: MessageRole =
        role.parse().map_err(StoreError::Decode)?;

    let metadata = match row.get::<Option<String>, _>("metadata_json") {
        Some(json) => serde_json::from_str::<MessageMetadata>(&json)
            .map_err(|error| StoreError::Decode(error.to_string()))?,
        None => MessageMetadata::default(),
    };

    Ok(ChatMessage {
        id: MessageId(row.get("id")),
        session_id: SessionId(row.get("session_id")),
        user_id: UserId(row.get("user_id")),
        role,
        content: row.get("content"),
        timestamp: parse_timestamp(&row.get::<String, _>("created_at"))?,
        metadata,
    })
}

fn feedback_from_row(row: SqliteRow) -> Result<Feedback, StoreError> {
    let rating: i64 = row.get("rating");
    Ok(Feedback {
        session_id: SessionId(row.get("session_id")),
        message_id: MessageId(row.get("message_id")),
        rating: rating as u8,
        comment: row.get("comment"),
        timestamp: parse_timestamp(&row.get::<String, _>("created_at"))?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| StoreError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use helpdesk_core::domain::ids::{HandoffId, MessageId, SessionId, UserId};
    use helpdesk_core::domain::message::{ChatMessage, MessageMetadata, MessageRole};
    use helpdesk_core::memory::{ConversationStore, Feedback};

    use super::SqlConversationStore;
    use crate::connect_with_settings;
    use crate::migrations::run_pending;

    async fn store() -> SqlConversationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlConversationStore::new(pool)
    }

    fn message(session: &str, role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage::new(
            SessionId(session.to_string()),
            UserId("u-1".to_string()),
            role,
            content,
        )
    }

    #[tokio::test]
    async fn history_preserves_insertion_order_per_session() {
        let store = store().await;

        store.add_message(message("s-1", MessageRole::User, "first")).await.expect("add");
        store
            .add_message(message("s-1", MessageRole::Assistant, "second"))
            .await
            .expect("add");
        store.add_message(message("s-2", MessageRole::User, "other session")).await.expect("add");

        let history = store.history(&SessionId("s-1".to_string())).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "first");
        assert_eq!(history[1].content, "second");
        assert_eq!(history[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn recent_returns_the_tail_in_chronological_order() {
        let store = store().await;
        for index in 0..5 {
            store
                .add_message(message("s-1", MessageRole::User, &format!("m{index}")))
                .await
                .expect("add");
        }

        let recent = store.recent(&SessionId("s-1".to_string()), 2).await.expect("recent");
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn metadata_round_trips_through_the_json_column() {
        let store = store().await;
        let metadata = MessageMetadata {
            confidence_score: Some(0.42),
            needs_human_intervention: Some(true),
            handoff_id: Some(HandoffId("h-1".to_string())),
            handoff_reason: Some("Low confidence score (0.42)".to_string()),
            tool_calls: Vec::new(),
        };
        let stored = message("s-1", MessageRole::Assistant, "escalating").with_metadata(metadata);

        store.add_message(stored.clone()).await.expect("add");
        let history = store.history(&SessionId("s-1".to_string())).await.expect("history");

        assert_eq!(history[0].metadata, stored.metadata);
        assert_eq!(history[0].id, stored.id);
    }

    #[tokio::test]
    async fn feedback_round_trips_and_upserts() {
        let store = store().await;
        let message_id = store
            .add_message(message("s-1", MessageRole::Assistant, "answer"))
            .await
            .expect("add");

        let feedback = Feedback {
            session_id: SessionId("s-1".to_string()),
            message_id: message_id.clone(),
            rating: 2,
            comment: Some("not helpful".to_string()),
            timestamp: Utc::now(),
        };
        store.record_feedback(feedback).await.expect("record");

        let revised = Feedback {
            session_id: SessionId("s-1".to_string()),
            message_id: message_id.clone(),
            rating: 4,
            comment: None,
            timestamp: Utc::now(),
        };
        store.record_feedback(revised).await.expect("revise");

        let found = store.feedback_for_message(&message_id).await.expect("fetch").expect("some");
        assert_eq!(found.rating, 4);
        assert_eq!(found.comment, None);

        let missing = store
            .feedback_for_message(&MessageId("m-404".to_string()))
            .await
            .expect("fetch");
        assert!(missing.is_none());
    }
}
