use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub display_name: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Create the user or refresh their display name and avatar.
pub async fn upsert_user(
    pool: &DbPool,
    id: &str,
    display_name: &str,
    avatar_url: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, display_name, avatar_url, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (id) DO UPDATE SET
            display_name = excluded.display_name,
            avatar_url = COALESCE(excluded.avatar_url, users.avatar_url)
         RETURNING id, display_name, nickname, avatar_url, status, created_at",
    )
    .bind(id)
    .bind(display_name)
    .bind(avatar_url)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user(pool: &DbPool, id: &str) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, display_name, nickname, avatar_url, status, created_at
         FROM users WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// `nickname_lower` must already be normalized.
pub async fn get_user_by_nickname(
    pool: &DbPool,
    nickname_lower: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, display_name, nickname, avatar_url, status, created_at
         FROM users WHERE nickname_lower = ?1",
    )
    .bind(nickname_lower)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Substring match on the lowercase nickname, excluding `exclude_id`.
pub async fn search_users(
    pool: &DbPool,
    query_lower: &str,
    exclude_id: &str,
    limit: i64,
) -> Result<Vec<UserRow>, DbError> {
    let pattern = format!("%{}%", escape_like(query_lower));
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, display_name, nickname, avatar_url, status, created_at
         FROM users
         WHERE nickname_lower LIKE ?1 ESCAPE '\\' AND id <> ?2
         ORDER BY nickname_lower ASC
         LIMIT ?3",
    )
    .bind(pattern)
    .bind(exclude_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Uniqueness of the lowercase form is enforced by the schema; a clash
/// surfaces as `DbError::Conflict`.
pub async fn set_nickname(pool: &DbPool, id: &str, nickname: &str) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(
        "UPDATE users SET nickname = ?2, nickname_lower = ?3
         WHERE id = ?1
         RETURNING id, display_name, nickname, avatar_url, status, created_at",
    )
    .bind(id)
    .bind(nickname)
    .bind(nickname.to_lowercase())
    .fetch_optional(pool)
    .await
    .map_err(DbError::from_write)?;
    row.ok_or(DbError::NotFound)
}

pub async fn set_status(pool: &DbPool, id: &str, status: &str) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET status = ?2 WHERE id = ?1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
