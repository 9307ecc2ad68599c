use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::AppResult;

/// Per-user, per-conversation unread counters, denormalized from the seen
/// table for O(1) reads. All mutations are single-statement upserts so a
/// racing pair of sends cannot lose an increment.
pub struct UnreadService;

impl UnreadService {
    /// Add one unread for every participant of the conversation except
    /// `skip` (the sender or acting user). Runs inside the caller's message
    /// transaction.
    pub(crate) async fn increment_for_recipients(
        tx: &mut Transaction<'_, Sqlite>,
        conversation_id: Uuid,
        skip: Option<Uuid>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO unread_counters (conversation_id, user_id, count) \
             SELECT cp.conversation_id, cp.user_id, 1 \
             FROM conversation_participants cp \
             WHERE cp.conversation_id = ?1 AND (?2 IS NULL OR cp.user_id != ?2) \
             ON CONFLICT(conversation_id, user_id) DO UPDATE SET count = count + 1",
        )
        .bind(conversation_id.to_string())
        .bind(skip.map(|u| u.to_string()))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Reset to zero; resetting an absent or already-zero counter is a no-op.
    pub(crate) async fn reset(
        tx: &mut Transaction<'_, Sqlite>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE unread_counters SET count = 0 \
             WHERE conversation_id = ?1 AND user_id = ?2",
        )
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn count_for(
        db: &SqlitePool,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COALESCE(\
                 (SELECT count FROM unread_counters \
                  WHERE conversation_id = ?1 AND user_id = ?2), \
                 0\
             )",
        )
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(db)
        .await?;
        Ok(count)
    }

    /// The user's global unread badge: sum of their per-conversation counters.
    pub async fn total_for(db: &SqlitePool, user_id: Uuid) -> AppResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(count), 0) FROM unread_counters WHERE user_id = ?1",
        )
        .bind(user_id.to_string())
        .fetch_one(db)
        .await?;
        Ok(total)
    }
}
