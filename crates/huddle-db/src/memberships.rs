use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MembershipRow {
    pub id: i64,
    pub room_id: String,
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

/// Opens a membership interval unless one is already open.
pub async fn open_membership(pool: &DbPool, room_id: &str, user_id: &str) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO room_memberships (room_id, user_id, joined_at)
         SELECT ?1, ?2, ?3
         WHERE NOT EXISTS (
            SELECT 1 FROM room_memberships
            WHERE room_id = ?1 AND user_id = ?2 AND left_at IS NULL
         )",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn close_membership(pool: &DbPool, room_id: &str, user_id: &str) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE room_memberships SET left_at = ?3
         WHERE room_id = ?1 AND user_id = ?2 AND left_at IS NULL",
    )
    .bind(room_id)
    .bind(user_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_memberships(
    pool: &DbPool,
    room_id: &str,
) -> Result<Vec<MembershipRow>, DbError> {
    let rows = sqlx::query_as::<_, MembershipRow>(
        "SELECT id, room_id, user_id, joined_at, left_at
         FROM room_memberships WHERE room_id = ?1 ORDER BY id ASC",
    )
    .bind(room_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rooms, test_support};

    #[tokio::test]
    async fn intervals_open_once_and_close() -> anyhow::Result<()> {
        let pool = test_support::pool().await?;
        test_support::user(&pool, "u1", "Ada").await?;
        rooms::create_room(&pool, "r1", "Lobby", true, "u1", None).await?;

        open_membership(&pool, "r1", "u1").await?;
        open_membership(&pool, "r1", "u1").await?;
        let open = list_memberships(&pool, "r1").await?;
        assert_eq!(open.len(), 1);
        assert!(open[0].left_at.is_none());

        close_membership(&pool, "r1", "u1").await?;
        open_membership(&pool, "r1", "u1").await?;
        let all = list_memberships(&pool, "r1").await?;
        assert_eq!(all.len(), 2);
        assert!(all[0].left_at.is_some());
        assert!(all[1].left_at.is_none());
        Ok(())
    }
}
