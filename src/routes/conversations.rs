use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{Conversation, RetentionPolicy};
use crate::services::conversation_service::ConversationService;
use crate::services::retention_service::RetentionService;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ConversationDto {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub last_message: Option<String>,
    pub last_message_at: Option<String>,
    pub retention_policy: &'static str,
    pub created_at: String,
}

impl From<Conversation> for ConversationDto {
    fn from(c: Conversation) -> Self {
        Self {
            id: c.id,
            participant_a: c.participant_a,
            participant_b: c.participant_b,
            last_message: c.last_message,
            last_message_at: c.last_message_at.map(|t| t.to_rfc3339()),
            retention_policy: c.retention_policy.as_str(),
            created_at: c.created_at.to_rfc3339(),
        }
    }
}

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    pub participant_id: Uuid,
}

pub async fn create_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationDto>), AppError> {
    let conversation =
        ConversationService::create(&state.db, user.id, body.participant_id).await?;
    Ok((StatusCode::CREATED, Json(conversation.into())))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationDto>, AppError> {
    let conversation = ConversationService::require_participant(&state.db, id, user.id).await?;
    Ok(Json(conversation.into()))
}

#[derive(Serialize)]
pub struct ExitResponse {
    pub deleted_count: u64,
}

/// Record a conversation exit and apply the retention policy.
pub async fn record_exit(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<ExitResponse>, AppError> {
    let deleted_count = RetentionService::record_exit(&state.db, id, user.id).await?;
    Ok(Json(ExitResponse { deleted_count }))
}

#[derive(Serialize)]
pub struct RetentionResponse {
    pub retention_policy: &'static str,
    pub deleted_count: u64,
}

pub async fn get_retention(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<RetentionResponse>, AppError> {
    let conversation = ConversationService::require_participant(&state.db, id, user.id).await?;
    Ok(Json(RetentionResponse {
        retention_policy: conversation.retention_policy.as_str(),
        deleted_count: 0,
    }))
}

#[derive(Deserialize)]
pub struct SetRetentionRequest {
    pub retention_policy: String,
}

pub async fn set_retention(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<SetRetentionRequest>,
) -> Result<Json<RetentionResponse>, AppError> {
    let policy = RetentionPolicy::parse(&body.retention_policy).ok_or_else(|| {
        AppError::BadRequest("retention_policy must be 'immediately' or '1day'".into())
    })?;

    let deleted_count = ConversationService::set_retention(&state.db, id, user.id, policy).await?;
    Ok(Json(RetentionResponse {
        retention_policy: policy.as_str(),
        deleted_count,
    }))
}
