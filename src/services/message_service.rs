use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Message;
use crate::services::conversation_service::ConversationService;
use crate::services::session_service::SessionService;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

pub struct MessageService;

impl MessageService {
    /// The message delivery pipeline, persistence side: validate, authorize,
    /// insert, refresh the conversation's last-message projection, and open
    /// a chat session if the sender has none. Fan-out to live sockets is the
    /// caller's concern.
    pub async fn send_message(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("message content is required".into()));
        }

        // NotFound when the conversation is missing, Forbidden for outsiders
        let conversation =
            ConversationService::require_participant(db, conversation_id, sender_id).await?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(conversation.id)
        .bind(sender_id)
        .bind(content)
        .bind(now)
        .execute(db)
        .await?;

        ConversationService::touch_last_message(db, conversation.id, content, now).await?;
        SessionService::open_if_absent(db, conversation.id, sender_id).await?;

        Ok(Message {
            id,
            conversation_id: conversation.id,
            sender_id,
            content: content.to_string(),
            created_at: now,
            read_at: None,
            is_saved: false,
            tags: vec![],
        })
    }

    /// One page of messages in chronological order (oldest first).
    ///
    /// Pagination walks backwards from the cursor message (exclusive), then
    /// the page is re-ordered for display. Viewing a page eagerly marks every
    /// unread message from the other participant in it as read; `read_at`
    /// transitions exactly once.
    pub async fn fetch_messages(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        cursor: Option<Uuid>,
        take: Option<i64>,
    ) -> AppResult<Vec<Message>> {
        let conversation =
            ConversationService::require_participant(db, conversation_id, user_id).await?;
        let take = take.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let before: Option<DateTime<Utc>> = match cursor {
            Some(cursor_id) => {
                let anchor = sqlx::query_scalar(
                    "SELECT created_at FROM messages WHERE id = $1 AND conversation_id = $2",
                )
                .bind(cursor_id)
                .bind(conversation.id)
                .fetch_optional(db)
                .await?
                .ok_or(AppError::NotFound)?;
                Some(anchor)
            }
            None => None,
        };

        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, created_at, read_at, is_saved, tags \
             FROM messages \
             WHERE conversation_id = $1 \
               AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC \
             LIMIT $3",
        )
        .bind(conversation.id)
        .bind(before)
        .bind(take)
        .fetch_all(db)
        .await?;

        let mut messages: Vec<Message> = rows.into_iter().map(row_to_message).collect();
        messages.reverse();

        let unread_from_peer: Vec<Uuid> = messages
            .iter()
            .filter(|m| m.sender_id != user_id && m.read_at.is_none())
            .map(|m| m.id)
            .collect();

        if !unread_from_peer.is_empty() {
            let read_at = Utc::now();
            // Guard on read_at IS NULL so a concurrent fetch cannot move an
            // already-set timestamp
            sqlx::query("UPDATE messages SET read_at = $1 WHERE id = ANY($2) AND read_at IS NULL")
                .bind(read_at)
                .bind(&unread_from_peer)
                .execute(db)
                .await?;

            for message in &mut messages {
                if unread_from_peer.contains(&message.id) {
                    message.read_at = Some(read_at);
                }
            }
        }

        Ok(messages)
    }

    pub async fn get(db: &Pool<Postgres>, message_id: Uuid) -> AppResult<Message> {
        let row = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, created_at, read_at, is_saved, tags \
             FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;

        Ok(row_to_message(row))
    }

    /// Toggle the retention exemption. Any participant may save or unsave;
    /// the flag is global to the message.
    pub async fn set_saved(
        db: &Pool<Postgres>,
        message_id: Uuid,
        user_id: Uuid,
        is_saved: bool,
    ) -> AppResult<()> {
        let message = Self::get(db, message_id).await?;
        ConversationService::require_participant(db, message.conversation_id, user_id).await?;

        sqlx::query("UPDATE messages SET is_saved = $1 WHERE id = $2")
            .bind(is_saved)
            .bind(message_id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Replace the free-text tag set. Sender-only.
    pub async fn set_tags(
        db: &Pool<Postgres>,
        message_id: Uuid,
        user_id: Uuid,
        tags: &[String],
    ) -> AppResult<()> {
        let message = Self::get(db, message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::Forbidden);
        }

        sqlx::query("UPDATE messages SET tags = $1 WHERE id = $2")
            .bind(tags)
            .bind(message_id)
            .execute(db)
            .await?;
        Ok(())
    }
}

fn row_to_message(row: sqlx::postgres::PgRow) -> Message {
    Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        sender_id: row.get("sender_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        read_at: row.get("read_at"),
        is_saved: row.get("is_saved"),
        tags: row.get("tags"),
    }
}
