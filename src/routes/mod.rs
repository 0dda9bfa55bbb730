use crate::state::AppState;
use axum::middleware;
use axum::{
    routing::{get, post, put},
    Router,
};

pub mod analytics;
pub mod conversations;
pub mod messages;

use analytics::{end_session, get_analytics};
use conversations::{
    create_conversation, get_conversation, get_retention, record_exit, set_retention,
};
use messages::{list_messages, save_message, send_message, set_tags, unsave_message};

use crate::websocket::handlers::ws_handler;

pub fn build_router(state: AppState) -> Router {
    // Introspection stays public for healthchecks
    let introspection = Router::new().route("/health", get(|| async { "OK" }));

    let api_v1 = Router::new()
        .route("/conversations", post(create_conversation))
        .route("/conversations/:id", get(get_conversation))
        .route(
            "/conversations/:id/messages",
            post(send_message).get(list_messages),
        )
        .route("/conversations/:id/exit", post(record_exit))
        .route(
            "/conversations/:id/retention",
            get(get_retention).patch(set_retention),
        )
        .route("/conversations/:id/analytics", get(get_analytics))
        .route("/conversations/:id/sessions/end", post(end_session))
        .route(
            "/messages/:id/save",
            post(save_message).delete(unsave_message),
        )
        .route("/messages/:id/tags", put(set_tags))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::auth::auth_middleware,
        ));

    // The websocket upgrade authenticates itself (token query parameter or
    // Authorization header), so it sits outside the bearer middleware
    let ws = Router::new().route("/ws", get(ws_handler));

    introspection
        .merge(Router::new().nest("/api/v1", api_v1.merge(ws)))
        .with_state(state)
}
