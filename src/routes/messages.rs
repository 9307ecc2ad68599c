use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{Message, MessagePage, MessagePreview};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::unread_service::UnreadService;
use crate::state::AppState;
use crate::websocket::events::{self, ChannelEvent};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list_messages(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessagePage>, AppError> {
    ConversationService::require_participant(&state.db, conversation_id, user.id).await?;
    let page = MessageService::list(&state.db, conversation_id, query.cursor, query.limit).await?;
    Ok(Json(page))
}

/// Append a message, then fan the confirmed message out to the other
/// participants and push each one their updated unread count.
pub async fn send_message(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), AppError> {
    let message = MessageService::append(
        &state.db,
        conversation_id,
        user.id,
        body.content,
        body.image_url,
    )
    .await?;

    let participants = ConversationService::participants(&state.db, conversation_id).await?;

    // The sender reconciles through the response; everyone else gets a push.
    events::fan_out(
        &state.registry,
        &participants,
        Some(user.id),
        &ChannelEvent::MessageNew {
            conversation_id,
            message: message.clone(),
        },
    )
    .await;

    let preview = MessagePreview::from(&message);
    for &participant in &participants {
        let unread_count =
            UnreadService::count_for(&state.db, conversation_id, participant).await?;
        events::send_to_user(
            &state.registry,
            participant,
            &ChannelEvent::ConversationUpdated {
                conversation_id,
                unread_count,
                last_message: Some(preview.clone()),
            },
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(message)))
}
