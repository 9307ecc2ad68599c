use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{Conversation, ConversationSummary};
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::unread_service::UnreadService;
use crate::state::AppState;
use crate::websocket::events::{self, ChannelEvent};

#[derive(Debug, Deserialize)]
pub struct CreateDirectRequest {
    pub participant_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub participant_ids: Vec<Uuid>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SeenResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadTotal {
    pub count: i64,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: User,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    let summaries =
        ConversationService::list_for_user(&state.db, user.id, query.page, query.limit).await?;
    Ok(Json(summaries))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Conversation>, AppError> {
    ConversationService::require_participant(&state.db, conversation_id, user.id).await?;
    let conversation = ConversationService::get(&state.db, conversation_id).await?;
    Ok(Json(conversation))
}

/// Get-or-create the direct conversation between the caller and another user.
pub async fn create_direct_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateDirectRequest>,
) -> Result<Json<Conversation>, AppError> {
    let conversation =
        ConversationService::create_direct(&state.db, user.id, body.participant_id).await?;
    Ok(Json(conversation))
}

pub async fn create_group_conversation(
    State(state): State<AppState>,
    user: User,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Conversation>), AppError> {
    let conversation = ConversationService::create_group(
        &state.db,
        user.id,
        &body.name,
        &body.participant_ids,
        body.image_url,
    )
    .await?;

    // Let the other members' conversation lists pick up the new group.
    let preview = ConversationService::last_message(&state.db, conversation.id).await?;
    for &participant in &conversation.participants {
        if participant == user.id {
            continue;
        }
        let unread_count =
            UnreadService::count_for(&state.db, conversation.id, participant).await?;
        events::send_to_user(
            &state.registry,
            participant,
            &ChannelEvent::ConversationUpdated {
                conversation_id: conversation.id,
                unread_count,
                last_message: preview.clone(),
            },
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Mark every message in the conversation as seen by the caller.
pub async fn mark_seen(
    State(state): State<AppState>,
    user: User,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<SeenResponse>, AppError> {
    ConversationService::require_participant(&state.db, conversation_id, user.id).await?;
    let update = MessageService::mark_seen(&state.db, conversation_id, user.id).await?;

    if update.updated > 0 {
        let participants = ConversationService::participants(&state.db, conversation_id).await?;
        events::fan_out(
            &state.registry,
            &participants,
            Some(user.id),
            &ChannelEvent::MessageSeen {
                conversation_id,
                message_ids: update.message_ids.clone(),
                seen_by: user.id,
            },
        )
        .await;
    }

    // Other tabs of the seer converge on the authoritative zero.
    let preview = ConversationService::last_message(&state.db, conversation_id).await?;
    events::send_to_user(
        &state.registry,
        user.id,
        &ChannelEvent::ConversationUpdated {
            conversation_id,
            unread_count: 0,
            last_message: preview,
        },
    )
    .await;

    Ok(Json(SeenResponse {
        updated: update.updated,
    }))
}

/// Aggregate unread count across the caller's conversations.
pub async fn unread_count(
    State(state): State<AppState>,
    user: User,
) -> Result<Json<UnreadTotal>, AppError> {
    let count = UnreadService::total_for(&state.db, user.id).await?;
    Ok(Json(UnreadTotal { count }))
}
