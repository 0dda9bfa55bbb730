use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, warn};

use crate::middleware::auth::{verify_token, AuthUser};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::state::AppState;
use crate::websocket::events::{self, WsEvent};
use crate::websocket::message_types::WsInboundEvent;
use crate::websocket::{ConnectionId, Topic};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let token = params.token.clone().or_else(|| bearer_from_headers(&headers));
    let user = match token.as_deref().map(|t| verify_token(t, &state.config.jwt_secret)) {
        Some(Ok(user)) => user,
        _ => {
            warn!("websocket connection rejected: missing or invalid token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user, socket))
}

async fn handle_socket(state: AppState, user: AuthUser, socket: WebSocket) {
    let (connection_id, mut rx) = state.registry.connect().await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            // Fan-out from rooms this connection joined
            maybe = rx.recv() => {
                match maybe {
                    Some(msg) => {
                        if sender.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // Inbound client events, one at a time per connection
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(txt))) => {
                        match serde_json::from_str::<WsInboundEvent>(&txt) {
                            Ok(evt) => handle_ws_event(evt, connection_id, &user, &state).await,
                            Err(_) => warn!(%connection_id, "ignoring malformed client event"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong handled by the framework
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // An in-flight persistence call has already completed by the time the
    // loop exits; only the live fan-out loses its recipient here.
    if let Some(change) = state.registry.disconnect(connection_id).await {
        events::broadcast_presence(&state.registry, change, connection_id).await;
    }
}

async fn handle_ws_event(
    evt: WsInboundEvent,
    connection_id: ConnectionId,
    user: &AuthUser,
    state: &AppState,
) {
    match evt {
        WsInboundEvent::Register { user_id } => {
            if user_id != user.id {
                warn!(%connection_id, declared = %user_id, authenticated = %user.id,
                    "registration identity does not match token subject");
                return;
            }
            if let Some(change) = state.registry.register(connection_id, user.id).await {
                events::broadcast_presence(&state.registry, change, connection_id).await;
            }
        }

        WsInboundEvent::Join { conversation_id } => {
            match ConversationService::is_participant(&state.db, conversation_id, user.id).await {
                Ok(true) => {
                    state
                        .registry
                        .join(connection_id, Topic::Conversation(conversation_id))
                        .await
                }
                Ok(false) => warn!(%conversation_id, user = %user.id,
                    "join rejected: not a participant"),
                Err(e) => error!(%conversation_id, error = %e, "join membership check failed"),
            }
        }

        WsInboundEvent::Leave { conversation_id } => {
            state
                .registry
                .leave(connection_id, Topic::Conversation(conversation_id))
                .await;
        }

        WsInboundEvent::TypingStart { conversation_id } => {
            relay_typing(state, connection_id, user.id, conversation_id, true).await;
        }

        WsInboundEvent::TypingEnd { conversation_id } => {
            relay_typing(state, connection_id, user.id, conversation_id, false).await;
        }

        WsInboundEvent::MessageSend {
            conversation_id,
            content,
        } => {
            match MessageService::send_message(&state.db, conversation_id, user.id, &content).await
            {
                Ok(message) => {
                    let topic = Topic::Conversation(message.conversation_id);
                    // Sending implies room membership
                    state.registry.join(connection_id, topic).await;
                    let event = WsEvent::MessageNew {
                        id: message.id,
                        conversation_id: message.conversation_id,
                        sender_id: message.sender_id,
                        sender_name: user.name.clone(),
                        sender_avatar_url: user.avatar_url.clone(),
                        content: message.content,
                        read: false,
                    };
                    events::broadcast_event(&state.registry, topic, user.id, event).await;
                }
                // The sender sees an explicit error; nothing is retried
                Err(err) => events::send_error(&state.registry, connection_id, user.id, &err).await,
            }
        }

        WsInboundEvent::MessageRead {
            conversation_id,
            message_ids,
        } => {
            match ConversationService::is_participant(&state.db, conversation_id, user.id).await {
                Ok(true) => {
                    let event = WsEvent::MessageRead {
                        conversation_id,
                        message_ids,
                    };
                    events::broadcast_event(
                        &state.registry,
                        Topic::Conversation(conversation_id),
                        user.id,
                        event,
                    )
                    .await;
                }
                Ok(false) => {}
                Err(e) => error!(%conversation_id, error = %e, "read relay membership check failed"),
            }
        }
    }
}

/// Ephemeral fire-and-forget relay to the conversation's other connections.
/// Duplicate starts are harmless; any stop-after-timeout is a client concern.
async fn relay_typing(
    state: &AppState,
    connection_id: ConnectionId,
    user_id: uuid::Uuid,
    conversation_id: uuid::Uuid,
    started: bool,
) {
    // Only registered connections may signal typing
    if state.registry.user_of(connection_id).await != Some(user_id) {
        return;
    }

    let event = if started {
        WsEvent::TypingStarted { conversation_id }
    } else {
        WsEvent::TypingStopped { conversation_id }
    };
    events::broadcast_event_except(
        &state.registry,
        Topic::Conversation(conversation_id),
        connection_id,
        user_id,
        event,
    )
    .await;
}
