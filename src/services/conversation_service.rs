use std::collections::BTreeSet;

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKind, ConversationSummary, MessagePreview};
use crate::services::{now_ts, parse_ts, parse_uuid};

pub struct ConversationService;

/// Canonical key for a direct conversation: the unordered participant pair.
fn direct_pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

impl ConversationService {
    /// Get-or-create the direct conversation between two users.
    ///
    /// Idempotent per unordered pair: a second call (in either argument
    /// order) returns the existing conversation. A concurrent double-create
    /// collapses on the `pair_key` unique constraint.
    pub async fn create_direct(db: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Conversation> {
        if a == b {
            return Err(AppError::InvalidParticipants);
        }
        let pair_key = direct_pair_key(a, b);
        if let Some(existing) = Self::find_by_pair_key(db, &pair_key).await? {
            return Ok(existing);
        }

        let id = Uuid::new_v4();
        let created_at = now_ts();
        let mut tx = db.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO conversations (id, kind, pair_key, created_at) \
             VALUES (?1, 'direct', ?2, ?3) \
             ON CONFLICT(pair_key) DO NOTHING",
        )
        .bind(id.to_string())
        .bind(&pair_key)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 1 {
            for user in [a, b] {
                sqlx::query(
                    "INSERT INTO conversation_participants (conversation_id, user_id, joined_at) \
                     VALUES (?1, ?2, ?3)",
                )
                .bind(id.to_string())
                .bind(user.to_string())
                .bind(&created_at)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;

        // Lost the conflict race or won it; either way the row exists now.
        Self::find_by_pair_key(db, &pair_key)
            .await?
            .ok_or(AppError::Internal)
    }

    /// Create a group conversation. Requires at least two participants
    /// besides the creator. Appends a system message recording the creation;
    /// every participant except the creator starts with one unread.
    pub async fn create_group(
        db: &SqlitePool,
        creator: Uuid,
        name: &str,
        participant_ids: &[Uuid],
        image_url: Option<String>,
    ) -> AppResult<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("group name is required".into()));
        }
        let mut others: BTreeSet<Uuid> = participant_ids.iter().copied().collect();
        others.remove(&creator);
        if others.len() < 2 {
            return Err(AppError::InsufficientMembers);
        }

        let id = Uuid::new_v4();
        let created_at = now_ts();
        let mut tx = db.begin().await?;
        sqlx::query(
            "INSERT INTO conversations (id, kind, name, image_url, created_at) \
             VALUES (?1, 'group', ?2, ?3, ?4)",
        )
        .bind(id.to_string())
        .bind(name)
        .bind(image_url.as_deref())
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        for user in std::iter::once(creator).chain(others.iter().copied()) {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id, joined_at) \
                 VALUES (?1, ?2, ?3)",
            )
            .bind(id.to_string())
            .bind(user.to_string())
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;
        }

        super::message_service::MessageService::insert_system_message(
            &mut tx,
            id,
            &format!("Group \"{name}\" created"),
            creator,
        )
        .await?;
        tx.commit().await?;

        Self::get(db, id).await
    }

    pub async fn get(db: &SqlitePool, id: Uuid) -> AppResult<Conversation> {
        let row = sqlx::query(
            "SELECT id, kind, name, image_url, created_at FROM conversations WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(db)
        .await?
        .ok_or(AppError::ConversationNotFound)?;

        let kind_raw: String = row.get("kind");
        let created_raw: String = row.get("created_at");
        let participants = Self::participants(db, id).await?;

        Ok(Conversation {
            id,
            kind: ConversationKind::parse(&kind_raw).ok_or(AppError::Internal)?,
            name: row.get("name"),
            image_url: row.get("image_url"),
            participants,
            created_at: parse_ts(&created_raw)?,
        })
    }

    pub async fn participants(db: &SqlitePool, conversation_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows = sqlx::query(
            "SELECT user_id FROM conversation_participants \
             WHERE conversation_id = ?1 \
             ORDER BY joined_at ASC, user_id ASC",
        )
        .bind(conversation_id.to_string())
        .fetch_all(db)
        .await?;

        rows.iter()
            .map(|row| {
                let raw: String = row.get("user_id");
                parse_uuid(&raw)
            })
            .collect()
    }

    pub async fn is_participant(
        db: &SqlitePool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let found: i64 = sqlx::query_scalar(
            "SELECT EXISTS(\
                 SELECT 1 FROM conversation_participants \
                 WHERE conversation_id = ?1 AND user_id = ?2\
             )",
        )
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(db)
        .await?;
        Ok(found != 0)
    }

    /// Guard used by every conversation-scoped operation: the conversation
    /// must exist and the caller must be one of its participants.
    pub async fn require_participant(
        db: &SqlitePool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM conversations WHERE id = ?1")
                .bind(conversation_id.to_string())
                .fetch_optional(db)
                .await?;
        if exists.is_none() {
            return Err(AppError::ConversationNotFound);
        }
        if !Self::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::NotAParticipant);
        }
        Ok(())
    }

    /// Conversations the user participates in, most recent activity first
    /// (latest message time, else creation time), annotated with the user's
    /// unread count and the last message.
    pub async fn list_for_user(
        db: &SqlitePool,
        user_id: Uuid,
        page: i64,
        limit: i64,
    ) -> AppResult<Vec<ConversationSummary>> {
        let limit = limit.clamp(1, 100);
        let offset = (page.max(1) - 1) * limit;

        let rows = sqlx::query(
            r#"
            SELECT c.id, c.kind, c.name, c.image_url, c.created_at,
                   COALESCE(u.count, 0) AS unread_count
            FROM conversations c
            JOIN conversation_participants cp ON cp.conversation_id = c.id
            LEFT JOIN unread_counters u
                   ON u.conversation_id = c.id AND u.user_id = cp.user_id
            WHERE cp.user_id = ?1
            ORDER BY COALESCE(
                (SELECT MAX(m.created_at) FROM messages m WHERE m.conversation_id = c.id),
                c.created_at
            ) DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(user_id.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let id_raw: String = row.get("id");
            let kind_raw: String = row.get("kind");
            let created_raw: String = row.get("created_at");
            let id = parse_uuid(&id_raw)?;
            summaries.push(ConversationSummary {
                id,
                kind: ConversationKind::parse(&kind_raw).ok_or(AppError::Internal)?,
                name: row.get("name"),
                image_url: row.get("image_url"),
                created_at: parse_ts(&created_raw)?,
                unread_count: row.get("unread_count"),
                last_message: Self::last_message(db, id).await?,
            });
        }
        Ok(summaries)
    }

    pub async fn last_message(
        db: &SqlitePool,
        conversation_id: Uuid,
    ) -> AppResult<Option<MessagePreview>> {
        let row = sqlx::query(
            "SELECT id, sender_id, content, image_url, created_at FROM messages \
             WHERE conversation_id = ?1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(conversation_id.to_string())
        .fetch_optional(db)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let id_raw: String = row.get("id");
                let sender_raw: Option<String> = row.get("sender_id");
                let created_raw: String = row.get("created_at");
                Ok(Some(MessagePreview {
                    id: parse_uuid(&id_raw)?,
                    sender_id: sender_raw.as_deref().map(parse_uuid).transpose()?,
                    content: row.get("content"),
                    image_url: row.get("image_url"),
                    created_at: parse_ts(&created_raw)?,
                }))
            }
        }
    }

    async fn find_by_pair_key(db: &SqlitePool, pair_key: &str) -> AppResult<Option<Conversation>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM conversations WHERE pair_key = ?1")
                .bind(pair_key)
                .fetch_optional(db)
                .await?;
        match id {
            None => Ok(None),
            Some(raw) => Ok(Some(Self::get(db, parse_uuid(&raw)?).await?)),
        }
    }
}
