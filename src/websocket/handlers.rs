use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::middleware::auth::verify_token;
use crate::services::conversation_service::ConversationService;
use crate::state::AppState;
use crate::websocket::events::{self, ChannelEvent, InboundFrame};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Channel endpoint. Browsers cannot set headers on an upgrade request, so
/// the token is accepted as a query parameter as well.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.clone().or_else(|| {
        headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|s| s.to_string())
    });

    let user_id = match token.as_deref().map(|t| verify_token(t, &state.config.jwt_secret)) {
        Some(Ok(user_id)) => user_id,
        _ => {
            tracing::warn!("channel connection rejected: missing or invalid token");
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(state, user_id, socket))
}

async fn handle_socket(state: AppState, user_id: Uuid, socket: WebSocket) {
    tracing::info!(%user_id, "channel connected");
    let mut rx = state.registry.attach(user_id).await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(msg) => {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(frame) = serde_json::from_str::<InboundFrame>(&text) {
                        handle_frame(&state, user_id, frame).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }

    state.typing.clear_user(user_id).await;
    tracing::info!(%user_id, "channel disconnected");
}

async fn handle_frame(state: &AppState, user_id: Uuid, frame: InboundFrame) {
    match frame {
        InboundFrame::TypingStart { conversation_id } => {
            if !frame_allowed(state, conversation_id, user_id).await {
                return;
            }
            state.typing.start(conversation_id, user_id).await;
            notify_peers(
                state,
                conversation_id,
                user_id,
                ChannelEvent::TypingStart {
                    conversation_id,
                    user_id,
                },
            )
            .await;
        }
        InboundFrame::TypingStop { conversation_id } => {
            if !frame_allowed(state, conversation_id, user_id).await {
                return;
            }
            // A stop after the idle window already expired silently.
            if state.typing.stop(conversation_id, user_id).await {
                notify_peers(
                    state,
                    conversation_id,
                    user_id,
                    ChannelEvent::TypingStop {
                        conversation_id,
                        user_id,
                    },
                )
                .await;
            }
        }
    }
}

async fn frame_allowed(state: &AppState, conversation_id: Uuid, user_id: Uuid) -> bool {
    match ConversationService::is_participant(&state.db, conversation_id, user_id).await {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(%user_id, %conversation_id, "typing frame from non-participant dropped");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "membership check failed for typing frame");
            false
        }
    }
}

async fn notify_peers(
    state: &AppState,
    conversation_id: Uuid,
    actor: Uuid,
    event: ChannelEvent,
) {
    match ConversationService::participants(&state.db, conversation_id).await {
        Ok(participants) => {
            events::fan_out(&state.registry, &participants, Some(actor), &event).await;
        }
        Err(e) => {
            tracing::error!(error = %e, %conversation_id, "failed to load participants for fan-out");
        }
    }
}
