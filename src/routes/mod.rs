use axum::routing::{get, post, put};
use axum::{middleware, Router};

use crate::middleware::auth::auth_middleware;
use crate::state::AppState;
use crate::websocket::handlers::ws_handler;

pub mod conversations;
pub mod messages;

use conversations::{
    create_direct_conversation, create_group_conversation, get_conversation, list_conversations,
    mark_seen, unread_count,
};
use messages::{list_messages, send_message};

pub fn build_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(create_direct_conversation),
        )
        .route("/conversations/group", post(create_group_conversation))
        .route("/conversations/unread/count", get(unread_count))
        .route("/conversations/:id", get(get_conversation))
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/:id/seen", put(mark_seen))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        // Added after the auth layer on purpose: upgrade requests cannot
        // always carry headers, so the handler validates its own token.
        .route("/ws", get(ws_handler));

    let router = Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api/v1", api_v1)
        .with_state(state);

    crate::middleware::with_defaults(router)
}
