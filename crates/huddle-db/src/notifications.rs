use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub thread_id: Option<i64>,
    pub room_id: Option<String>,
    pub message_id: Option<i64>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewNotification<'a> {
    pub thread_id: Option<i64>,
    pub room_id: Option<&'a str>,
    pub message_id: Option<i64>,
}

pub async fn create_notification(
    pool: &DbPool,
    id: i64,
    user_id: &str,
    kind: &str,
    refs: NewNotification<'_>,
) -> Result<NotificationRow, DbError> {
    let row = sqlx::query_as::<_, NotificationRow>(
        "INSERT INTO notifications (id, user_id, kind, thread_id, room_id, message_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id, user_id, kind, thread_id, room_id, message_id, read_at, created_at",
    )
    .bind(id)
    .bind(user_id)
    .bind(kind)
    .bind(refs.thread_id)
    .bind(refs.room_id)
    .bind(refs.message_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Marks the caller's own notifications; ids belonging to others are ignored.
pub async fn mark_read(pool: &DbPool, user_id: &str, ids: &[i64]) -> Result<u64, DbError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    for id in ids {
        let result = sqlx::query(
            "UPDATE notifications SET read_at = ?3
             WHERE id = ?1 AND user_id = ?2 AND read_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }
    tx.commit().await?;
    Ok(updated)
}

pub async fn list_unread(
    pool: &DbPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<NotificationRow>, DbError> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        "SELECT id, user_id, kind, thread_id, room_id, message_id, read_at, created_at
         FROM notifications
         WHERE user_id = ?1 AND read_at IS NULL
         ORDER BY id DESC
         LIMIT ?2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
