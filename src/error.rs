use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("a direct conversation needs two distinct participants")]
    InvalidParticipants,

    #[error("a group conversation needs at least two other participants")]
    InsufficientMembers,

    #[error("message needs text content or an image")]
    EmptyMessage,

    #[error("caller is not a participant of this conversation")]
    NotAParticipant,

    #[error("conversation not found")]
    ConversationNotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal,
}

/// Wire shape of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl AppError {
    /// Stable machine-readable kind, used by clients to branch on failures.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::StartServer(_) => "server_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidParticipants => "invalid_participants",
            AppError::InsufficientMembers => "insufficient_members",
            AppError::EmptyMessage => "empty_message",
            AppError::NotAParticipant => "not_a_participant",
            AppError::ConversationNotFound => "conversation_not_found",
            AppError::Database(_) => "database_error",
            AppError::Internal => "internal_error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_)
            | AppError::InvalidParticipants
            | AppError::InsufficientMembers
            | AppError::EmptyMessage => 400,
            AppError::Unauthorized => 401,
            AppError::NotAParticipant => 403,
            AppError::ConversationNotFound => 404,
            AppError::Config(_)
            | AppError::StartServer(_)
            | AppError::Database(_)
            | AppError::Internal => 500,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_violations_map_to_client_errors() {
        assert_eq!(AppError::EmptyMessage.status_code(), 400);
        assert_eq!(AppError::InsufficientMembers.status_code(), 400);
        assert_eq!(AppError::InvalidParticipants.status_code(), 400);
        assert_eq!(AppError::NotAParticipant.status_code(), 403);
        assert_eq!(AppError::ConversationNotFound.status_code(), 404);
        assert_eq!(AppError::Unauthorized.status_code(), 401);
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(AppError::EmptyMessage.kind(), "empty_message");
        assert_eq!(AppError::NotAParticipant.kind(), "not_a_participant");
    }
}
