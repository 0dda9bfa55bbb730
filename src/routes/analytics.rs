use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::services::session_service::{ConversationAnalytics, SessionService};
use crate::state::AppState;

pub async fn get_analytics(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationAnalytics>, AppError> {
    let analytics = SessionService::analytics(&state.db, id, user.id).await?;
    Ok(Json(analytics))
}

#[derive(Serialize)]
pub struct EndSessionResponse {
    pub closed: bool,
}

/// Close the caller's open chat session for this conversation.
pub async fn end_session(
    State(state): State<AppState>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<EndSessionResponse>, AppError> {
    let closed = SessionService::close_open(&state.db, id, user.id).await?;
    Ok(Json(EndSessionResponse { closed }))
}
