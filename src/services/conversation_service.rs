use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, RetentionPolicy};
use crate::services::retention_service::RetentionService;

pub struct ConversationService;

impl ConversationService {
    /// Create the single conversation row for an unordered participant pair,
    /// or return the existing one. Uniqueness is enforced by the pair index.
    pub async fn create(db: &Pool<Postgres>, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        if a == b {
            return Err(AppError::BadRequest(
                "a conversation needs two distinct participants".into(),
            ));
        }

        if let Some(existing) = Self::find_by_pair(db, a, b).await? {
            return Ok(existing);
        }

        // Lost races fall through to the re-fetch below
        sqlx::query(
            "INSERT INTO conversations (id, participant_a, participant_b, retention_policy) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(a)
        .bind(b)
        .bind(RetentionPolicy::OneDay.as_str())
        .execute(db)
        .await?;

        Self::find_by_pair(db, a, b)
            .await?
            .ok_or(AppError::Internal)
    }

    pub async fn find_by_pair(
        db: &Pool<Postgres>,
        a: Uuid,
        b: Uuid,
    ) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, participant_a, participant_b, last_message, last_message_at, \
                    retention_policy, created_at \
             FROM conversations \
             WHERE LEAST(participant_a, participant_b) = LEAST($1, $2) \
               AND GREATEST(participant_a, participant_b) = GREATEST($1, $2)",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(db)
        .await?;

        row.map(row_to_conversation).transpose()
    }

    pub async fn get(db: &Pool<Postgres>, conversation_id: Uuid) -> AppResult<Conversation> {
        let row = sqlx::query(
            "SELECT id, participant_a, participant_b, last_message, last_message_at, \
                    retention_policy, created_at \
             FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)?;

        row_to_conversation(row)
    }

    /// Fetch the conversation and fail with `Forbidden` unless `user_id` is
    /// one of its two participants.
    pub async fn require_participant(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = Self::get(db, conversation_id).await?;
        if !conversation.is_participant(user_id) {
            return Err(AppError::Forbidden);
        }
        Ok(conversation)
    }

    pub async fn is_participant(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS( \
                SELECT 1 FROM conversations \
                WHERE id = $1 AND (participant_a = $2 OR participant_b = $2))",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(db)
        .await?;
        Ok(exists)
    }

    /// Change the retention policy. The `1day` sweep runs immediately on any
    /// change to that policy, not only on exit; returns the deleted count.
    pub async fn set_retention(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        policy: RetentionPolicy,
    ) -> AppResult<u64> {
        Self::require_participant(db, conversation_id, user_id).await?;

        sqlx::query("UPDATE conversations SET retention_policy = $1 WHERE id = $2")
            .bind(policy.as_str())
            .bind(conversation_id)
            .execute(db)
            .await?;

        let deleted = match policy {
            RetentionPolicy::OneDay => {
                RetentionService::apply_policy(db, conversation_id, policy).await?
            }
            RetentionPolicy::Immediately => 0,
        };

        if deleted > 0 {
            Self::recompute_last_message(db, conversation_id).await?;
        }
        Ok(deleted)
    }

    /// Refresh the denormalized last-message projection from the newest
    /// remaining message, or clear it when none remain. Last-write-wins:
    /// the projection is a cache, not a source of truth.
    pub async fn recompute_last_message(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversations SET \
                last_message = (SELECT content FROM messages \
                                WHERE conversation_id = $1 \
                                ORDER BY created_at DESC LIMIT 1), \
                last_message_at = (SELECT created_at FROM messages \
                                   WHERE conversation_id = $1 \
                                   ORDER BY created_at DESC LIMIT 1) \
             WHERE id = $1",
        )
        .bind(conversation_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Denormalized update on send.
    pub async fn touch_last_message(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        content: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE conversations SET last_message = $1, last_message_at = $2 WHERE id = $3")
            .bind(content)
            .bind(at)
            .bind(conversation_id)
            .execute(db)
            .await?;
        Ok(())
    }
}

fn row_to_conversation(row: sqlx::postgres::PgRow) -> AppResult<Conversation> {
    let policy: String = row.get("retention_policy");
    let retention_policy = RetentionPolicy::parse(&policy).ok_or_else(|| {
        tracing::error!(value = %policy, "unknown retention policy in database");
        AppError::Internal
    })?;

    Ok(Conversation {
        id: row.get("id"),
        participant_a: row.get("participant_a"),
        participant_b: row.get("participant_b"),
        last_message: row.get("last_message"),
        last_message_at: row.get("last_message_at"),
        retention_policy,
        created_at: row.get("created_at"),
    })
}
