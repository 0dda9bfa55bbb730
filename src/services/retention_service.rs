use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::RetentionPolicy;
use crate::services::conversation_service::ConversationService;

pub struct RetentionService;

impl RetentionService {
    /// Record that a participant left the conversation view, then apply the
    /// conversation's retention policy. Returns the number of deleted
    /// messages. Calling this twice in a row with no new messages deletes
    /// nothing the second time.
    ///
    /// Retention runs opportunistically at conversation boundaries rather
    /// than from a background sweep.
    pub async fn record_exit(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<u64> {
        let conversation =
            ConversationService::require_participant(db, conversation_id, user_id).await?;

        sqlx::query(
            "INSERT INTO conversation_states (conversation_id, user_id, last_exited_at) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (conversation_id, user_id) \
             DO UPDATE SET last_exited_at = EXCLUDED.last_exited_at",
        )
        .bind(conversation.id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(db)
        .await?;

        let deleted =
            Self::apply_policy(db, conversation.id, conversation.retention_policy).await?;
        if deleted > 0 {
            ConversationService::recompute_last_message(db, conversation.id).await?;
        }
        Ok(deleted)
    }

    /// Delete every message currently eligible under `policy`. SQL twin of
    /// `RetentionPolicy::eligible_for_deletion`.
    pub async fn apply_policy(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        policy: RetentionPolicy,
    ) -> AppResult<u64> {
        let result = match policy {
            RetentionPolicy::Immediately => {
                // Messages the recipient has already seen, regardless of
                // whether both participants have exited
                sqlx::query(
                    "DELETE FROM messages \
                     WHERE conversation_id = $1 AND NOT is_saved AND read_at IS NOT NULL",
                )
                .bind(conversation_id)
                .execute(db)
                .await?
            }
            RetentionPolicy::OneDay => {
                sqlx::query(
                    "DELETE FROM messages \
                     WHERE conversation_id = $1 AND NOT is_saved \
                       AND created_at < now() - interval '24 hours'",
                )
                .bind(conversation_id)
                .execute(db)
                .await?
            }
        };

        let deleted = result.rows_affected();
        if deleted > 0 {
            tracing::info!(
                %conversation_id,
                policy = policy.as_str(),
                deleted,
                "retention applied"
            );
        }
        Ok(deleted)
    }
}
