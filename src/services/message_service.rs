use std::collections::HashMap;

use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Message, MessagePage};
use crate::services::conversation_service::ConversationService;
use crate::services::unread_service::UnreadService;
use crate::services::{now_ts, parse_ts, parse_uuid};

/// Result of a mark-seen sweep: how many messages were newly stamped and
/// which ones, so the caller can notify the other participants.
#[derive(Debug, Clone)]
pub struct SeenUpdate {
    pub updated: u64,
    pub message_ids: Vec<Uuid>,
}

pub struct MessageService;

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl MessageService {
    /// Append a message and increment every other participant's unread
    /// counter in the same transaction, so two concurrent sends to the same
    /// recipient cannot lose an increment.
    pub async fn append(
        db: &SqlitePool,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: Option<String>,
        image_url: Option<String>,
    ) -> AppResult<Message> {
        let content = normalize(content);
        let image_url = normalize(image_url);
        if content.is_none() && image_url.is_none() {
            return Err(AppError::EmptyMessage);
        }
        ConversationService::require_participant(db, conversation_id, sender_id).await?;

        let id = Uuid::new_v4();
        let created_at = now_ts();
        let mut tx = db.begin().await?;
        let seq = sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, image_url, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(id.to_string())
        .bind(conversation_id.to_string())
        .bind(sender_id.to_string())
        .bind(content.as_deref())
        .bind(image_url.as_deref())
        .bind(&created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        UnreadService::increment_for_recipients(&mut tx, conversation_id, Some(sender_id)).await?;
        tx.commit().await?;

        Ok(Message {
            id,
            seq,
            conversation_id,
            sender_id: Some(sender_id),
            content,
            image_url,
            created_at: parse_ts(&created_at)?,
            seen_by: Vec::new(),
        })
    }

    /// System messages have no sender. The acting user (e.g. the group
    /// creator) is excluded from the unread increment.
    pub(crate) async fn insert_system_message(
        tx: &mut Transaction<'_, Sqlite>,
        conversation_id: Uuid,
        content: &str,
        acting_user: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, created_at) \
             VALUES (?1, ?2, NULL, ?3, ?4)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(conversation_id.to_string())
        .bind(content)
        .bind(now_ts())
        .execute(&mut **tx)
        .await?;

        UnreadService::increment_for_recipients(tx, conversation_id, Some(acting_user)).await
    }

    /// Cursor-paginated history, newest first. The cursor is a message id
    /// resolved to its insertion sequence and used as an exclusive upper
    /// bound, so concurrent inserts never shift or duplicate pages.
    pub async fn list(
        db: &SqlitePool,
        conversation_id: Uuid,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> AppResult<MessagePage> {
        let limit = limit.clamp(1, 100);

        let before_seq = match cursor {
            None => None,
            Some(cursor) => {
                let seq: Option<i64> = sqlx::query_scalar(
                    "SELECT seq FROM messages WHERE id = ?1 AND conversation_id = ?2",
                )
                .bind(cursor.to_string())
                .bind(conversation_id.to_string())
                .fetch_optional(db)
                .await?;
                Some(seq.ok_or_else(|| AppError::BadRequest("unknown cursor".into()))?)
            }
        };

        let rows = match before_seq {
            Some(before) => {
                sqlx::query(
                    "SELECT id, seq, sender_id, content, image_url, created_at FROM messages \
                     WHERE conversation_id = ?1 AND seq < ?2 \
                     ORDER BY seq DESC LIMIT ?3",
                )
                .bind(conversation_id.to_string())
                .bind(before)
                .bind(limit + 1)
                .fetch_all(db)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, seq, sender_id, content, image_url, created_at FROM messages \
                     WHERE conversation_id = ?1 \
                     ORDER BY seq DESC LIMIT ?2",
                )
                .bind(conversation_id.to_string())
                .bind(limit + 1)
                .fetch_all(db)
                .await?
            }
        };

        let has_more = rows.len() as i64 > limit;
        let mut messages = Vec::with_capacity(rows.len().min(limit as usize));
        for row in rows.into_iter().take(limit as usize) {
            let id_raw: String = row.get("id");
            let sender_raw: Option<String> = row.get("sender_id");
            let created_raw: String = row.get("created_at");
            messages.push(Message {
                id: parse_uuid(&id_raw)?,
                seq: row.get("seq"),
                conversation_id,
                sender_id: sender_raw.as_deref().map(parse_uuid).transpose()?,
                content: row.get("content"),
                image_url: row.get("image_url"),
                created_at: parse_ts(&created_raw)?,
                seen_by: Vec::new(),
            });
        }

        Self::load_seen_by(db, &mut messages).await?;

        let next_cursor = messages.last().map(|m| m.id);
        Ok(MessagePage {
            messages,
            next_cursor,
            has_more,
        })
    }

    async fn load_seen_by(db: &SqlitePool, messages: &mut [Message]) -> AppResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; messages.len()].join(", ");
        let sql = format!(
            "SELECT message_id, user_id FROM message_seen WHERE message_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for message in messages.iter() {
            query = query.bind(message.id.to_string());
        }
        let rows = query.fetch_all(db).await?;

        let mut seen: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in rows {
            let message_raw: String = row.get("message_id");
            let user_raw: String = row.get("user_id");
            seen.entry(parse_uuid(&message_raw)?)
                .or_default()
                .push(parse_uuid(&user_raw)?);
        }
        for message in messages.iter_mut() {
            if let Some(mut users) = seen.remove(&message.id) {
                users.sort();
                message.seen_by = users;
            }
        }
        Ok(())
    }

    /// Stamp every message the user has not seen (and did not author) and
    /// reset their unread counter, in one transaction. Idempotent: a second
    /// call finds nothing to stamp and returns 0.
    pub async fn mark_seen(
        db: &SqlitePool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<SeenUpdate> {
        let mut tx = db.begin().await?;
        let rows = sqlx::query(
            "SELECT m.id FROM messages m \
             WHERE m.conversation_id = ?1 \
               AND (m.sender_id IS NULL OR m.sender_id != ?2) \
               AND NOT EXISTS (\
                   SELECT 1 FROM message_seen s \
                   WHERE s.message_id = m.id AND s.user_id = ?2\
               ) \
             ORDER BY m.seq ASC",
        )
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        let seen_at = now_ts();
        let mut message_ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id_raw: String = row.get("id");
            sqlx::query(
                "INSERT OR IGNORE INTO message_seen (message_id, user_id, seen_at) \
                 VALUES (?1, ?2, ?3)",
            )
            .bind(&id_raw)
            .bind(user_id.to_string())
            .bind(&seen_at)
            .execute(&mut *tx)
            .await?;
            message_ids.push(parse_uuid(&id_raw)?);
        }

        UnreadService::reset(&mut tx, conversation_id, user_id).await?;
        tx.commit().await?;

        Ok(SeenUpdate {
            updated: message_ids.len() as u64,
            message_ids,
        })
    }
}
