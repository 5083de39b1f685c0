use crate::users::UserRow;
use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FriendRequestRow {
    pub id: i64,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// At most one pending request per direction; a duplicate is `Conflict`.
pub async fn create_request(
    pool: &DbPool,
    id: i64,
    from_user_id: &str,
    to_user_id: &str,
) -> Result<FriendRequestRow, DbError> {
    let row = sqlx::query_as::<_, FriendRequestRow>(
        "INSERT INTO friend_requests (id, from_user_id, to_user_id, status, created_at)
         VALUES (?1, ?2, ?3, 'pending', ?4)
         RETURNING id, from_user_id, to_user_id, status, created_at",
    )
    .bind(id)
    .bind(from_user_id)
    .bind(to_user_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(DbError::from_write)?;
    Ok(row)
}

pub async fn get_request(pool: &DbPool, id: i64) -> Result<Option<FriendRequestRow>, DbError> {
    let row = sqlx::query_as::<_, FriendRequestRow>(
        "SELECT id, from_user_id, to_user_id, status, created_at
         FROM friend_requests WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Only pending requests can be resolved.
pub async fn resolve_request(pool: &DbPool, id: i64, status: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE friend_requests SET status = ?2, responded_at = ?3
         WHERE id = ?1 AND status = 'pending'",
    )
    .bind(id)
    .bind(status)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

pub async fn list_pending_incoming(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<FriendRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, FriendRequestRow>(
        "SELECT id, from_user_id, to_user_id, status, created_at
         FROM friend_requests
         WHERE to_user_id = ?1 AND status = 'pending'
         ORDER BY id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_pending_outgoing(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<FriendRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, FriendRequestRow>(
        "SELECT id, from_user_id, to_user_id, status, created_at
         FROM friend_requests
         WHERE from_user_id = ?1 AND status = 'pending'
         ORDER BY id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// `user_a < user_b`. Creating an existing friendship is a no-op.
pub async fn create_friendship(pool: &DbPool, user_a: &str, user_b: &str) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO friendships (user_a_id, user_b_id, created_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (user_a_id, user_b_id) DO NOTHING",
    )
    .bind(user_a)
    .bind(user_b)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn are_friends(pool: &DbPool, user_a: &str, user_b: &str) -> Result<bool, DbError> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM friendships WHERE user_a_id = ?1 AND user_b_id = ?2",
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn list_friends(pool: &DbPool, user_id: &str) -> Result<Vec<UserRow>, DbError> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT u.id, u.display_name, u.nickname, u.avatar_url, u.status, u.created_at
         FROM friendships f
         INNER JOIN users u
            ON u.id = CASE WHEN f.user_a_id = ?1 THEN f.user_b_id ELSE f.user_a_id END
         WHERE f.user_a_id = ?1 OR f.user_b_id = ?1
         ORDER BY u.display_name ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
