use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DmThreadRow {
    pub id: i64,
    pub user_a_id: String,
    pub user_b_id: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DmThreadRow {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_a_id == user_id || self.user_b_id == user_id
    }

    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.user_a_id == user_id {
            &self.user_b_id
        } else {
            &self.user_a_id
        }
    }
}

/// A thread as listed for one of its participants.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DmThreadListRow {
    pub id: i64,
    pub last_message_at: DateTime<Utc>,
    pub other_id: String,
    pub other_name: String,
    pub other_nickname: Option<String>,
    pub other_avatar_url: Option<String>,
    pub other_status: String,
    pub last_message_preview: Option<String>,
}

pub async fn get_thread(pool: &DbPool, id: i64) -> Result<Option<DmThreadRow>, DbError> {
    let row = sqlx::query_as::<_, DmThreadRow>(
        "SELECT id, user_a_id, user_b_id, last_message_at, created_at
         FROM dm_threads WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// `user_a` and `user_b` must already be ordered (`user_a < user_b`).
/// `id` is only used when the thread does not exist yet.
pub async fn get_or_create_thread(
    pool: &DbPool,
    id: i64,
    user_a: &str,
    user_b: &str,
) -> Result<DmThreadRow, DbError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO dm_threads (id, user_a_id, user_b_id, last_message_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT (user_a_id, user_b_id) DO NOTHING",
    )
    .bind(id)
    .bind(user_a)
    .bind(user_b)
    .bind(now)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DmThreadRow>(
        "SELECT id, user_a_id, user_b_id, last_message_at, created_at
         FROM dm_threads WHERE user_a_id = ?1 AND user_b_id = ?2",
    )
    .bind(user_a)
    .bind(user_b)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Most recently active first.
pub async fn list_threads_for_user(
    pool: &DbPool,
    user_id: &str,
) -> Result<Vec<DmThreadListRow>, DbError> {
    let rows = sqlx::query_as::<_, DmThreadListRow>(
        "SELECT t.id, t.last_message_at,
                u.id AS other_id, u.display_name AS other_name, u.nickname AS other_nickname,
                u.avatar_url AS other_avatar_url, u.status AS other_status,
                (SELECT m.body FROM messages m
                 WHERE m.thread_id = t.id AND m.deleted = 0
                 ORDER BY m.id DESC LIMIT 1) AS last_message_preview
         FROM dm_threads t
         INNER JOIN users u
            ON u.id = CASE WHEN t.user_a_id = ?1 THEN t.user_b_id ELSE t.user_a_id END
         WHERE t.user_a_id = ?1 OR t.user_b_id = ?1
         ORDER BY t.last_message_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{messages, test_support};

    #[tokio::test]
    async fn get_or_create_reuses_the_pair() -> anyhow::Result<()> {
        let pool = test_support::pool().await?;
        test_support::user(&pool, "a", "Ada").await?;
        test_support::user(&pool, "b", "Bob").await?;

        let first = get_or_create_thread(&pool, 1, "a", "b").await?;
        let second = get_or_create_thread(&pool, 2, "a", "b").await?;
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 1);
        assert_eq!(first.other_participant("a"), "b");
        assert!(!first.has_participant("c"));
        Ok(())
    }

    #[tokio::test]
    async fn listing_shows_the_other_side_and_preview() -> anyhow::Result<()> {
        let pool = test_support::pool().await?;
        test_support::user(&pool, "a", "Ada").await?;
        test_support::user(&pool, "b", "Bob").await?;
        let thread = get_or_create_thread(&pool, 1, "a", "b").await?;
        messages::create_thread_message(&pool, 5, thread.id, "b", "ping").await?;

        let listed = list_threads_for_user(&pool, "a").await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].other_id, "b");
        assert_eq!(listed[0].last_message_preview.as_deref(), Some("ping"));
        Ok(())
    }
}
