use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub id: String,
    pub name: String,
    pub is_public: bool,
    pub locked: bool,
    pub host_id: String,
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn create_room(
    pool: &DbPool,
    id: &str,
    name: &str,
    is_public: bool,
    host_id: &str,
    password_hash: Option<&str>,
) -> Result<RoomRow, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(
        "INSERT INTO rooms (id, name, is_public, locked, host_id, password_hash, created_at)
         VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6)
         RETURNING id, name, is_public, locked, host_id, password_hash, created_at",
    )
    .bind(id)
    .bind(name)
    .bind(is_public)
    .bind(host_id)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(DbError::from_write)?;
    Ok(row)
}

pub async fn get_room(pool: &DbPool, id: &str) -> Result<Option<RoomRow>, DbError> {
    let row = sqlx::query_as::<_, RoomRow>(
        "SELECT id, name, is_public, locked, host_id, password_hash, created_at
         FROM rooms WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_rooms(pool: &DbPool) -> Result<Vec<RoomRow>, DbError> {
    let rows = sqlx::query_as::<_, RoomRow>(
        "SELECT id, name, is_public, locked, host_id, password_hash, created_at
         FROM rooms ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_room_locked(pool: &DbPool, id: &str, locked: bool) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE rooms SET locked = ?2 WHERE id = ?1")
        .bind(id)
        .bind(locked)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn create_then_lock() -> anyhow::Result<()> {
        let pool = test_support::pool().await?;
        test_support::user(&pool, "host", "Host").await?;

        let room = create_room(&pool, "r1", "Standup", false, "host", Some("$argon2id$x")).await?;
        assert!(!room.locked);
        assert!(!room.is_public);

        set_room_locked(&pool, "r1", true).await?;
        let stored = get_room(&pool, "r1").await?.ok_or(DbError::NotFound)?;
        assert!(stored.locked);
        assert_eq!(stored.password_hash.as_deref(), Some("$argon2id$x"));

        assert!(matches!(
            set_room_locked(&pool, "missing", true).await,
            Err(DbError::NotFound)
        ));
        assert_eq!(list_rooms(&pool).await?.len(), 1);
        Ok(())
    }
}
