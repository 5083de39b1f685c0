use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

/// A message joined with its sender's profile.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub room_id: Option<String>,
    pub thread_id: Option<i64>,
    pub sender_id: String,
    pub body: String,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub sender_name: String,
    pub sender_nickname: Option<String>,
    pub sender_avatar_url: Option<String>,
}

const SELECT_MESSAGE: &str =
    "SELECT m.id, m.room_id, m.thread_id, m.sender_id, m.body, m.edited_at, m.deleted, m.created_at,
            u.display_name AS sender_name, u.nickname AS sender_nickname, u.avatar_url AS sender_avatar_url
     FROM messages m
     INNER JOIN users u ON u.id = m.sender_id";

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!("{SELECT_MESSAGE} WHERE m.id = ?1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create_room_message(
    pool: &DbPool,
    id: i64,
    room_id: &str,
    sender_id: &str,
    body: &str,
) -> Result<MessageRow, DbError> {
    sqlx::query(
        "INSERT INTO messages (id, room_id, sender_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(id)
    .bind(room_id)
    .bind(sender_id)
    .bind(body)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    get_message(pool, id).await?.ok_or(DbError::NotFound)
}

/// Appends to a DM thread and bumps its `last_message_at`.
pub async fn create_thread_message(
    pool: &DbPool,
    id: i64,
    thread_id: i64,
    sender_id: &str,
    body: &str,
) -> Result<MessageRow, DbError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO messages (id, thread_id, sender_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(id)
    .bind(thread_id)
    .bind(sender_id)
    .bind(body)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE dm_threads SET last_message_at = ?2 WHERE id = ?1")
        .bind(thread_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    get_message(pool, id).await?.ok_or(DbError::NotFound)
}

/// Newest first, ids strictly below `before` when given.
pub async fn list_room_messages(
    pool: &DbPool,
    room_id: &str,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "{SELECT_MESSAGE}
         WHERE m.room_id = ?1 AND (?2 IS NULL OR m.id < ?2)
         ORDER BY m.id DESC
         LIMIT ?3"
    ))
    .bind(room_id)
    .bind(before)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_thread_messages(
    pool: &DbPool,
    thread_id: i64,
    before: Option<i64>,
    limit: i64,
) -> Result<Vec<MessageRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "{SELECT_MESSAGE}
         WHERE m.thread_id = ?1 AND (?2 IS NULL OR m.id < ?2)
         ORDER BY m.id DESC
         LIMIT ?3"
    ))
    .bind(thread_id)
    .bind(before)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn edit_message(pool: &DbPool, id: i64, body: &str) -> Result<MessageRow, DbError> {
    let result = sqlx::query(
        "UPDATE messages SET body = ?2, edited_at = ?3 WHERE id = ?1 AND deleted = 0",
    )
    .bind(id)
    .bind(body)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    get_message(pool, id).await?.ok_or(DbError::NotFound)
}

/// Soft delete: the row stays so history keeps its shape, the body is wiped.
pub async fn delete_message(pool: &DbPool, id: i64) -> Result<MessageRow, DbError> {
    let result = sqlx::query("UPDATE messages SET body = '', deleted = 1 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    get_message(pool, id).await?.ok_or(DbError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dms, rooms, test_support};

    #[tokio::test]
    async fn room_history_pages_newest_first() -> anyhow::Result<()> {
        let pool = test_support::pool().await?;
        test_support::user(&pool, "u1", "Ada").await?;
        rooms::create_room(&pool, "r1", "Lobby", true, "u1", None).await?;
        for id in 1..=5 {
            create_room_message(&pool, id, "r1", "u1", &format!("m{id}")).await?;
        }

        let first = list_room_messages(&pool, "r1", None, 2).await?;
        assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![5, 4]);
        assert_eq!(first[0].sender_name, "Ada");

        let older = list_room_messages(&pool, "r1", Some(4), 10).await?;
        assert_eq!(older.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 2, 1]);
        Ok(())
    }

    #[tokio::test]
    async fn thread_message_bumps_thread() -> anyhow::Result<()> {
        let pool = test_support::pool().await?;
        test_support::user(&pool, "a", "Ada").await?;
        test_support::user(&pool, "b", "Bob").await?;
        let thread = dms::get_or_create_thread(&pool, 10, "a", "b").await?;

        let msg = create_thread_message(&pool, 11, thread.id, "a", "hi").await?;
        let bumped = dms::get_thread(&pool, thread.id).await?.ok_or(DbError::NotFound)?;
        assert!(bumped.last_message_at >= thread.last_message_at);
        assert_eq!(msg.thread_id, Some(thread.id));
        Ok(())
    }

    #[tokio::test]
    async fn edit_and_soft_delete() -> anyhow::Result<()> {
        let pool = test_support::pool().await?;
        test_support::user(&pool, "u1", "Ada").await?;
        rooms::create_room(&pool, "r1", "Lobby", true, "u1", None).await?;
        create_room_message(&pool, 1, "r1", "u1", "draft").await?;

        let edited = edit_message(&pool, 1, "final").await?;
        assert_eq!(edited.body, "final");
        assert!(edited.edited_at.is_some());

        let deleted = delete_message(&pool, 1).await?;
        assert!(deleted.deleted);
        assert!(deleted.body.is_empty());
        assert!(matches!(edit_message(&pool, 1, "again").await, Err(DbError::NotFound)));
        Ok(())
    }
}
