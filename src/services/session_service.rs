use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::conversation_service::ConversationService;

/// Analytics counters for one participant of a conversation.
#[derive(Debug, Serialize)]
pub struct ConversationAnalytics {
    pub conversation_id: Uuid,
    pub session_count: i64,
    pub total_session_minutes: i64,
    pub messages_sent: i64,
    pub messages_received: i64,
    pub unread_count: i64,
    pub last_exited_at: Option<DateTime<Utc>>,
}

pub struct SessionService;

impl SessionService {
    /// Open a chat session unless one is already open for this
    /// (conversation, user) pair.
    pub async fn open_if_absent(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO chat_session_logs (id, conversation_id, user_id, started_at) \
             SELECT $1, $2, $3, now() \
             WHERE NOT EXISTS ( \
                SELECT 1 FROM chat_session_logs \
                WHERE conversation_id = $2 AND user_id = $3 AND ended_at IS NULL)",
        )
        .bind(Uuid::new_v4())
        .bind(conversation_id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Close the open session, computing its duration. Returns false when no
    /// session was open.
    pub async fn close_open(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        ConversationService::require_participant(db, conversation_id, user_id).await?;

        let result = sqlx::query(
            "UPDATE chat_session_logs SET \
                ended_at = now(), \
                duration_minutes = CEIL(EXTRACT(EPOCH FROM (now() - started_at)) / 60)::int \
             WHERE conversation_id = $1 AND user_id = $2 AND ended_at IS NULL",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn analytics(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<ConversationAnalytics> {
        let conversation =
            ConversationService::require_participant(db, conversation_id, user_id).await?;

        let session_row = sqlx::query(
            "SELECT COUNT(*)::bigint AS session_count, \
                    COALESCE(SUM(duration_minutes), 0)::bigint AS total_minutes \
             FROM chat_session_logs \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation.id)
        .bind(user_id)
        .fetch_one(db)
        .await?;

        let message_row = sqlx::query(
            "SELECT COUNT(*) FILTER (WHERE sender_id = $2)::bigint AS sent, \
                    COUNT(*) FILTER (WHERE sender_id <> $2)::bigint AS received, \
                    COUNT(*) FILTER (WHERE sender_id <> $2 AND read_at IS NULL)::bigint AS unread \
             FROM messages WHERE conversation_id = $1",
        )
        .bind(conversation.id)
        .bind(user_id)
        .fetch_one(db)
        .await?;

        let last_exited_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT last_exited_at FROM conversation_states \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation.id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        Ok(ConversationAnalytics {
            conversation_id: conversation.id,
            session_count: session_row.get("session_count"),
            total_session_minutes: session_row.get("total_minutes"),
            messages_sent: message_row.get("sent"),
            messages_received: message_row.get("received"),
            unread_count: message_row.get("unread"),
            last_exited_at,
        })
    }
}
