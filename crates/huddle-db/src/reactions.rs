use crate::{DbError, DbPool};
use chrono::Utc;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReactionRow {
    pub message_id: i64,
    pub user_id: String,
    pub emoji: String,
}

pub async fn add_reaction(
    pool: &DbPool,
    message_id: i64,
    user_id: &str,
    emoji: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO reactions (message_id, user_id, emoji, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (message_id, user_id, emoji) DO NOTHING",
    )
    .bind(message_id)
    .bind(user_id)
    .bind(emoji)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn remove_reaction(
    pool: &DbPool,
    message_id: i64,
    user_id: &str,
    emoji: &str,
) -> Result<(), DbError> {
    sqlx::query("DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3")
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(pool)
        .await?;
    Ok(())
}

/// In the order the reactions were added.
pub async fn list_reactions(pool: &DbPool, message_id: i64) -> Result<Vec<ReactionRow>, DbError> {
    let rows = sqlx::query_as::<_, ReactionRow>(
        "SELECT message_id, user_id, emoji FROM reactions
         WHERE message_id = ?1
         ORDER BY created_at ASC, user_id ASC",
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
