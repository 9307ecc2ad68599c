pub mod conversation_service;
pub mod message_service;
pub mod unread_service;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::AppError;

/// Timestamps are stored as fixed-width RFC 3339 TEXT so that string
/// comparison and SQL MAX() agree with chronological order.
pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AppError::Internal)
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|_| AppError::Internal)
}
