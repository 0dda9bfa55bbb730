use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::Message;
use crate::services::message_service::MessageService;
use crate::state::AppState;
use crate::websocket::events::{self, WsEvent};
use crate::websocket::Topic;

#[derive(Serialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: String,
    pub read_at: Option<String>,
    pub is_saved: bool,
    pub tags: Vec<String>,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            content: m.content,
            created_at: m.created_at.to_rfc3339(),
            read_at: m.read_at.map(|t| t.to_rfc3339()),
            is_saved: m.is_saved,
            tags: m.tags,
        }
    }
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageDto>), AppError> {
    let message =
        MessageService::send_message(&state.db, conversation_id, user.id, &body.content).await?;

    // Live fan-out to the conversation room; best-effort, no receipt
    let event = WsEvent::MessageNew {
        id: message.id,
        conversation_id: message.conversation_id,
        sender_id: message.sender_id,
        sender_name: user.name.clone(),
        sender_avatar_url: user.avatar_url.clone(),
        content: message.content.clone(),
        read: false,
    };
    events::broadcast_event(
        &state.registry,
        Topic::Conversation(message.conversation_id),
        user.id,
        event,
    )
    .await;

    Ok((StatusCode::CREATED, Json(message.into())))
}

#[derive(Deserialize)]
pub struct FetchMessagesParams {
    pub cursor: Option<Uuid>,
    pub take: Option<i64>,
}

/// One chronological page; viewing marks the peer's unread messages in the
/// page as read.
pub async fn list_messages(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<FetchMessagesParams>,
) -> Result<Json<Vec<MessageDto>>, AppError> {
    let messages = MessageService::fetch_messages(
        &state.db,
        conversation_id,
        user.id,
        params.cursor,
        params.take,
    )
    .await?;
    Ok(Json(messages.into_iter().map(MessageDto::from).collect()))
}

pub async fn save_message(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::set_saved(&state.db, id, user.id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unsave_message(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    MessageService::set_saved(&state.db, id, user.id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SetTagsRequest {
    pub tags: Vec<String>,
}

pub async fn set_tags(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
    Json(body): Json<SetTagsRequest>,
) -> Result<StatusCode, AppError> {
    MessageService::set_tags(&state.db, id, user.id, &body.tags).await?;
    Ok(StatusCode::NO_CONTENT)
}
