//! Durable store seam. `SqlStore` is the production backend; `MemoryStore`
//! backs tests and throwaway servers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use huddle_db::{DbError, DbPool};
use huddle_models::presence::PresenceStatus;
use huddle_models::room::Visibility;
use huddle_models::social::{FriendRequestStatus, NotificationKind};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

use crate::registry::RoomMeta;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
}

impl UserRecord {
    /// Nickname when set, otherwise the display name.
    pub fn shown_name(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.display_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub id: String,
    pub name: String,
    pub visibility: Visibility,
    pub locked: bool,
    pub host_id: String,
    pub password_hash: Option<String>,
}

impl RoomRecord {
    pub fn meta(&self) -> RoomMeta {
        RoomMeta {
            room_id: self.id.clone(),
            name: self.name.clone(),
            visibility: self.visibility,
            locked: self.locked,
            host_id: self.host_id.clone(),
            password_hash: self.password_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeId {
    Room(String),
    Thread(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub scope: ScopeId,
    pub sender: UserRecord,
    pub body: String,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    pub id: i64,
    pub user_a: String,
    pub user_b: String,
    pub last_message_at: DateTime<Utc>,
}

impl ThreadRecord {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    pub fn other_participant(&self, user_id: &str) -> &str {
        if self.user_a == user_id {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSummary {
    pub id: i64,
    pub last_message_at: DateTime<Utc>,
    pub other: UserRecord,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRequestRecord {
    pub id: i64,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: String,
    pub kind: NotificationKind,
    pub thread_id: Option<i64>,
    pub room_id: Option<String>,
    pub message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub id: i64,
    pub user_id: String,
    pub kind: NotificationKind,
    pub thread_id: Option<i64>,
    pub room_id: Option<String>,
    pub message_id: Option<i64>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DbError>;
    /// Create the user from verified token claims, or refresh their display name.
    async fn upsert_user(&self, id: &str, display_name: &str) -> Result<UserRecord, DbError>;
    async fn get_user_by_nickname(&self, nickname_lower: &str) -> Result<Option<UserRecord>, DbError>;
    async fn search_users(
        &self,
        query_lower: &str,
        exclude_id: &str,
        limit: i64,
    ) -> Result<Vec<UserRecord>, DbError>;
    /// Atomic on the lowercase form; a clash is `DbError::Conflict`.
    async fn set_nickname(&self, user_id: &str, nickname: &str) -> Result<UserRecord, DbError>;
    async fn set_status(&self, user_id: &str, status: PresenceStatus) -> Result<(), DbError>;

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, DbError>;
    async fn get_room(&self, id: &str) -> Result<Option<RoomRecord>, DbError>;
    async fn create_room(&self, room: &RoomRecord) -> Result<(), DbError>;
    async fn set_room_locked(&self, id: &str, locked: bool) -> Result<(), DbError>;
    async fn open_membership(&self, room_id: &str, user_id: &str) -> Result<(), DbError>;
    async fn close_membership(&self, room_id: &str, user_id: &str) -> Result<(), DbError>;

    async fn append_message(
        &self,
        id: i64,
        scope: &ScopeId,
        sender_id: &str,
        body: &str,
    ) -> Result<MessageRecord, DbError>;
    async fn get_message(&self, id: i64) -> Result<Option<MessageRecord>, DbError>;
    /// Newest first, ids strictly below `before`.
    async fn list_messages(
        &self,
        scope: &ScopeId,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, DbError>;
    async fn edit_message(&self, id: i64, body: &str) -> Result<MessageRecord, DbError>;
    async fn delete_message(&self, id: i64) -> Result<MessageRecord, DbError>;
    async fn set_reaction(&self, message_id: i64, user_id: &str, emoji: &str, add: bool) -> Result<(), DbError>;
    /// emoji -> reacting user ids.
    async fn reactions(&self, message_id: i64) -> Result<BTreeMap<String, Vec<String>>, DbError>;

    /// `user_a < user_b`. `id` is used only when the thread is new.
    async fn get_or_create_thread(&self, id: i64, user_a: &str, user_b: &str) -> Result<ThreadRecord, DbError>;
    async fn get_thread(&self, id: i64) -> Result<Option<ThreadRecord>, DbError>;
    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadSummary>, DbError>;

    async fn create_friend_request(&self, id: i64, from: &str, to: &str) -> Result<FriendRequestRecord, DbError>;
    async fn get_friend_request(&self, id: i64) -> Result<Option<FriendRequestRecord>, DbError>;
    async fn resolve_friend_request(&self, id: i64, status: FriendRequestStatus) -> Result<(), DbError>;
    /// Pending requests as (incoming, outgoing).
    async fn pending_friend_requests(
        &self,
        user_id: &str,
    ) -> Result<(Vec<FriendRequestRecord>, Vec<FriendRequestRecord>), DbError>;
    /// `user_a < user_b`.
    async fn create_friendship(&self, user_a: &str, user_b: &str) -> Result<(), DbError>;
    async fn list_friends(&self, user_id: &str) -> Result<Vec<UserRecord>, DbError>;

    async fn create_notification(&self, notification: NewNotification) -> Result<NotificationRecord, DbError>;
    async fn mark_notifications_read(&self, user_id: &str, ids: &[i64]) -> Result<(), DbError>;
}

// ── SQL backend ────────────────────────────────────────────────────────────

pub struct SqlStore {
    pool: DbPool,
}

impl SqlStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn user_from_row(row: huddle_db::users::UserRow) -> UserRecord {
    UserRecord {
        id: row.id,
        display_name: row.display_name,
        nickname: row.nickname,
        avatar_url: row.avatar_url,
        status: PresenceStatus::from_stored(&row.status),
    }
}

fn room_from_row(row: huddle_db::rooms::RoomRow) -> RoomRecord {
    RoomRecord {
        id: row.id,
        name: row.name,
        visibility: Visibility::from_public_flag(row.is_public),
        locked: row.locked,
        host_id: row.host_id,
        password_hash: row.password_hash,
    }
}

fn message_from_row(row: huddle_db::messages::MessageRow) -> Result<MessageRecord, DbError> {
    let scope = match (row.room_id, row.thread_id) {
        (Some(room_id), None) => ScopeId::Room(room_id),
        (None, Some(thread_id)) => ScopeId::Thread(thread_id),
        _ => return Err(DbError::NotFound),
    };
    Ok(MessageRecord {
        id: row.id,
        scope,
        sender: UserRecord {
            id: row.sender_id,
            display_name: row.sender_name,
            nickname: row.sender_nickname,
            avatar_url: row.sender_avatar_url,
            status: PresenceStatus::Online,
        },
        body: row.body,
        edited_at: row.edited_at,
        deleted: row.deleted,
        created_at: row.created_at,
    })
}

fn thread_from_row(row: huddle_db::dms::DmThreadRow) -> ThreadRecord {
    ThreadRecord {
        id: row.id,
        user_a: row.user_a_id,
        user_b: row.user_b_id,
        last_message_at: row.last_message_at,
    }
}

fn request_from_row(row: huddle_db::friends::FriendRequestRow) -> FriendRequestRecord {
    FriendRequestRecord {
        id: row.id,
        from_user_id: row.from_user_id,
        to_user_id: row.to_user_id,
        status: FriendRequestStatus::parse(&row.status).unwrap_or(FriendRequestStatus::Pending),
        created_at: row.created_at,
    }
}

#[async_trait]
impl Store for SqlStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DbError> {
        Ok(huddle_db::users::get_user(&self.pool, id).await?.map(user_from_row))
    }

    async fn upsert_user(&self, id: &str, display_name: &str) -> Result<UserRecord, DbError> {
        let row = huddle_db::users::upsert_user(&self.pool, id, display_name, None).await?;
        Ok(user_from_row(row))
    }

    async fn get_user_by_nickname(&self, nickname_lower: &str) -> Result<Option<UserRecord>, DbError> {
        Ok(huddle_db::users::get_user_by_nickname(&self.pool, nickname_lower)
            .await?
            .map(user_from_row))
    }

    async fn search_users(
        &self,
        query_lower: &str,
        exclude_id: &str,
        limit: i64,
    ) -> Result<Vec<UserRecord>, DbError> {
        let rows = huddle_db::users::search_users(&self.pool, query_lower, exclude_id, limit).await?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn set_nickname(&self, user_id: &str, nickname: &str) -> Result<UserRecord, DbError> {
        let row = huddle_db::users::set_nickname(&self.pool, user_id, nickname).await?;
        Ok(user_from_row(row))
    }

    async fn set_status(&self, user_id: &str, status: PresenceStatus) -> Result<(), DbError> {
        huddle_db::users::set_status(&self.pool, user_id, status.as_str()).await
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, DbError> {
        let rows = huddle_db::rooms::list_rooms(&self.pool).await?;
        Ok(rows.into_iter().map(room_from_row).collect())
    }

    async fn get_room(&self, id: &str) -> Result<Option<RoomRecord>, DbError> {
        Ok(huddle_db::rooms::get_room(&self.pool, id).await?.map(room_from_row))
    }

    async fn create_room(&self, room: &RoomRecord) -> Result<(), DbError> {
        huddle_db::rooms::create_room(
            &self.pool,
            &room.id,
            &room.name,
            room.visibility.is_public(),
            &room.host_id,
            room.password_hash.as_deref(),
        )
        .await?;
        Ok(())
    }

    async fn set_room_locked(&self, id: &str, locked: bool) -> Result<(), DbError> {
        huddle_db::rooms::set_room_locked(&self.pool, id, locked).await
    }

    async fn open_membership(&self, room_id: &str, user_id: &str) -> Result<(), DbError> {
        huddle_db::memberships::open_membership(&self.pool, room_id, user_id).await
    }

    async fn close_membership(&self, room_id: &str, user_id: &str) -> Result<(), DbError> {
        huddle_db::memberships::close_membership(&self.pool, room_id, user_id).await
    }

    async fn append_message(
        &self,
        id: i64,
        scope: &ScopeId,
        sender_id: &str,
        body: &str,
    ) -> Result<MessageRecord, DbError> {
        let row = match scope {
            ScopeId::Room(room_id) => {
                huddle_db::messages::create_room_message(&self.pool, id, room_id, sender_id, body).await?
            }
            ScopeId::Thread(thread_id) => {
                huddle_db::messages::create_thread_message(&self.pool, id, *thread_id, sender_id, body)
                    .await?
            }
        };
        message_from_row(row)
    }

    async fn get_message(&self, id: i64) -> Result<Option<MessageRecord>, DbError> {
        huddle_db::messages::get_message(&self.pool, id)
            .await?
            .map(message_from_row)
            .transpose()
    }

    async fn list_messages(
        &self,
        scope: &ScopeId,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let rows = match scope {
            ScopeId::Room(room_id) => {
                huddle_db::messages::list_room_messages(&self.pool, room_id, before, limit).await?
            }
            ScopeId::Thread(thread_id) => {
                huddle_db::messages::list_thread_messages(&self.pool, *thread_id, before, limit).await?
            }
        };
        rows.into_iter().map(message_from_row).collect()
    }

    async fn edit_message(&self, id: i64, body: &str) -> Result<MessageRecord, DbError> {
        message_from_row(huddle_db::messages::edit_message(&self.pool, id, body).await?)
    }

    async fn delete_message(&self, id: i64) -> Result<MessageRecord, DbError> {
        message_from_row(huddle_db::messages::delete_message(&self.pool, id).await?)
    }

    async fn set_reaction(&self, message_id: i64, user_id: &str, emoji: &str, add: bool) -> Result<(), DbError> {
        if add {
            huddle_db::reactions::add_reaction(&self.pool, message_id, user_id, emoji).await
        } else {
            huddle_db::reactions::remove_reaction(&self.pool, message_id, user_id, emoji).await
        }
    }

    async fn reactions(&self, message_id: i64) -> Result<BTreeMap<String, Vec<String>>, DbError> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in huddle_db::reactions::list_reactions(&self.pool, message_id).await? {
            grouped.entry(row.emoji).or_default().push(row.user_id);
        }
        Ok(grouped)
    }

    async fn get_or_create_thread(&self, id: i64, user_a: &str, user_b: &str) -> Result<ThreadRecord, DbError> {
        let row = huddle_db::dms::get_or_create_thread(&self.pool, id, user_a, user_b).await?;
        Ok(thread_from_row(row))
    }

    async fn get_thread(&self, id: i64) -> Result<Option<ThreadRecord>, DbError> {
        Ok(huddle_db::dms::get_thread(&self.pool, id).await?.map(thread_from_row))
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadSummary>, DbError> {
        let rows = huddle_db::dms::list_threads_for_user(&self.pool, user_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| ThreadSummary {
                id: row.id,
                last_message_at: row.last_message_at,
                other: UserRecord {
                    id: row.other_id,
                    display_name: row.other_name,
                    nickname: row.other_nickname,
                    avatar_url: row.other_avatar_url,
                    status: PresenceStatus::from_stored(&row.other_status),
                },
                preview: row.last_message_preview,
            })
            .collect())
    }

    async fn create_friend_request(&self, id: i64, from: &str, to: &str) -> Result<FriendRequestRecord, DbError> {
        let row = huddle_db::friends::create_request(&self.pool, id, from, to).await?;
        Ok(request_from_row(row))
    }

    async fn get_friend_request(&self, id: i64) -> Result<Option<FriendRequestRecord>, DbError> {
        Ok(huddle_db::friends::get_request(&self.pool, id)
            .await?
            .map(request_from_row))
    }

    async fn resolve_friend_request(&self, id: i64, status: FriendRequestStatus) -> Result<(), DbError> {
        huddle_db::friends::resolve_request(&self.pool, id, status.as_str()).await
    }

    async fn pending_friend_requests(
        &self,
        user_id: &str,
    ) -> Result<(Vec<FriendRequestRecord>, Vec<FriendRequestRecord>), DbError> {
        let incoming = huddle_db::friends::list_pending_incoming(&self.pool, user_id).await?;
        let outgoing = huddle_db::friends::list_pending_outgoing(&self.pool, user_id).await?;
        Ok((
            incoming.into_iter().map(request_from_row).collect(),
            outgoing.into_iter().map(request_from_row).collect(),
        ))
    }

    async fn create_friendship(&self, user_a: &str, user_b: &str) -> Result<(), DbError> {
        huddle_db::friends::create_friendship(&self.pool, user_a, user_b).await
    }

    async fn list_friends(&self, user_id: &str) -> Result<Vec<UserRecord>, DbError> {
        let rows = huddle_db::friends::list_friends(&self.pool, user_id).await?;
        Ok(rows.into_iter().map(user_from_row).collect())
    }

    async fn create_notification(&self, n: NewNotification) -> Result<NotificationRecord, DbError> {
        let row = huddle_db::notifications::create_notification(
            &self.pool,
            n.id,
            &n.user_id,
            n.kind.as_str(),
            huddle_db::notifications::NewNotification {
                thread_id: n.thread_id,
                room_id: n.room_id.as_deref(),
                message_id: n.message_id,
            },
        )
        .await?;
        Ok(NotificationRecord {
            id: row.id,
            user_id: row.user_id,
            kind: n.kind,
            thread_id: row.thread_id,
            room_id: row.room_id,
            message_id: row.message_id,
            created_at: row.created_at,
        })
    }

    async fn mark_notifications_read(&self, user_id: &str, ids: &[i64]) -> Result<(), DbError> {
        huddle_db::notifications::mark_read(&self.pool, user_id, ids).await?;
        Ok(())
    }
}

// ── In-memory backend ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct StoredMessage {
    id: i64,
    scope: ScopeId,
    sender_id: String,
    body: String,
    edited_at: Option<DateTime<Utc>>,
    deleted: bool,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryData {
    users: HashMap<String, UserRecord>,
    rooms: Vec<RoomRecord>,
    open_memberships: HashMap<(String, String), DateTime<Utc>>,
    closed_memberships: usize,
    messages: BTreeMap<i64, StoredMessage>,
    /// (message, user, emoji) in insertion order.
    reactions: Vec<(i64, String, String)>,
    threads: Vec<ThreadRecord>,
    requests: Vec<FriendRequestRecord>,
    friendships: Vec<(String, String)>,
    notifications: Vec<(NotificationRecord, bool)>,
}

impl MemoryData {
    fn message_record(&self, stored: &StoredMessage) -> Result<MessageRecord, DbError> {
        let sender = self.users.get(&stored.sender_id).cloned().ok_or(DbError::NotFound)?;
        Ok(MessageRecord {
            id: stored.id,
            scope: stored.scope.clone(),
            sender,
            body: stored.body.clone(),
            edited_at: stored.edited_at,
            deleted: stored.deleted,
            created_at: stored.created_at,
        })
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record directly.
    pub fn insert_user(&self, id: &str, display_name: &str) {
        self.data.lock().users.insert(
            id.to_string(),
            UserRecord {
                id: id.to_string(),
                display_name: display_name.to_string(),
                nickname: None,
                avatar_url: None,
                status: PresenceStatus::Online,
            },
        );
    }

    /// Number of membership intervals currently open for the room.
    #[cfg(test)]
    pub(crate) fn open_membership_count(&self, room_id: &str) -> usize {
        self.data
            .lock()
            .open_memberships
            .keys()
            .filter(|(room, _)| room == room_id)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn closed_membership_count(&self) -> usize {
        self.data.lock().closed_memberships
    }

    #[cfg(test)]
    pub(crate) fn unread_notifications(&self, user_id: &str) -> Vec<NotificationRecord> {
        self.data
            .lock()
            .notifications
            .iter()
            .filter(|(n, read)| n.user_id == user_id && !read)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DbError> {
        Ok(self.data.lock().users.get(id).cloned())
    }

    async fn upsert_user(&self, id: &str, display_name: &str) -> Result<UserRecord, DbError> {
        let mut data = self.data.lock();
        let user = data.users.entry(id.to_string()).or_insert_with(|| UserRecord {
            id: id.to_string(),
            display_name: display_name.to_string(),
            nickname: None,
            avatar_url: None,
            status: PresenceStatus::Online,
        });
        user.display_name = display_name.to_string();
        Ok(user.clone())
    }

    async fn get_user_by_nickname(&self, nickname_lower: &str) -> Result<Option<UserRecord>, DbError> {
        Ok(self
            .data
            .lock()
            .users
            .values()
            .find(|u| u.nickname.as_deref().map(str::to_lowercase).as_deref() == Some(nickname_lower))
            .cloned())
    }

    async fn search_users(
        &self,
        query_lower: &str,
        exclude_id: &str,
        limit: i64,
    ) -> Result<Vec<UserRecord>, DbError> {
        let data = self.data.lock();
        let mut hits: Vec<UserRecord> = data
            .users
            .values()
            .filter(|u| u.id != exclude_id)
            .filter(|u| {
                u.nickname
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(query_lower))
            })
            .cloned()
            .collect();
        hits.sort_by_key(|u| u.nickname.as_deref().map(str::to_lowercase));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }

    async fn set_nickname(&self, user_id: &str, nickname: &str) -> Result<UserRecord, DbError> {
        let mut data = self.data.lock();
        let lower = nickname.to_lowercase();
        let taken = data.users.values().any(|u| {
            u.id != user_id && u.nickname.as_deref().map(str::to_lowercase).as_deref() == Some(lower.as_str())
        });
        if taken {
            return Err(DbError::Conflict);
        }
        let user = data.users.get_mut(user_id).ok_or(DbError::NotFound)?;
        user.nickname = Some(nickname.to_string());
        Ok(user.clone())
    }

    async fn set_status(&self, user_id: &str, status: PresenceStatus) -> Result<(), DbError> {
        if let Some(user) = self.data.lock().users.get_mut(user_id) {
            user.status = status;
        }
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, DbError> {
        Ok(self.data.lock().rooms.clone())
    }

    async fn get_room(&self, id: &str) -> Result<Option<RoomRecord>, DbError> {
        Ok(self.data.lock().rooms.iter().find(|r| r.id == id).cloned())
    }

    async fn create_room(&self, room: &RoomRecord) -> Result<(), DbError> {
        let mut data = self.data.lock();
        if data.rooms.iter().any(|r| r.id == room.id) {
            return Err(DbError::Conflict);
        }
        data.rooms.push(room.clone());
        Ok(())
    }

    async fn set_room_locked(&self, id: &str, locked: bool) -> Result<(), DbError> {
        let mut data = self.data.lock();
        let room = data.rooms.iter_mut().find(|r| r.id == id).ok_or(DbError::NotFound)?;
        room.locked = locked;
        Ok(())
    }

    async fn open_membership(&self, room_id: &str, user_id: &str) -> Result<(), DbError> {
        self.data
            .lock()
            .open_memberships
            .entry((room_id.to_string(), user_id.to_string()))
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn close_membership(&self, room_id: &str, user_id: &str) -> Result<(), DbError> {
        let mut data = self.data.lock();
        if data
            .open_memberships
            .remove(&(room_id.to_string(), user_id.to_string()))
            .is_some()
        {
            data.closed_memberships += 1;
        }
        Ok(())
    }

    async fn append_message(
        &self,
        id: i64,
        scope: &ScopeId,
        sender_id: &str,
        body: &str,
    ) -> Result<MessageRecord, DbError> {
        let mut data = self.data.lock();
        let now = Utc::now();
        let stored = StoredMessage {
            id,
            scope: scope.clone(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            edited_at: None,
            deleted: false,
            created_at: now,
        };
        if let ScopeId::Thread(thread_id) = scope {
            if let Some(thread) = data.threads.iter_mut().find(|t| t.id == *thread_id) {
                thread.last_message_at = now;
            }
        }
        let record = data.message_record(&stored)?;
        data.messages.insert(id, stored);
        Ok(record)
    }

    async fn get_message(&self, id: i64) -> Result<Option<MessageRecord>, DbError> {
        let data = self.data.lock();
        data.messages
            .get(&id)
            .map(|stored| data.message_record(stored))
            .transpose()
    }

    async fn list_messages(
        &self,
        scope: &ScopeId,
        before: Option<i64>,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, DbError> {
        let data = self.data.lock();
        data.messages
            .values()
            .rev()
            .filter(|m| &m.scope == scope)
            .filter(|m| before.map_or(true, |b| m.id < b))
            .take(limit.max(0) as usize)
            .map(|m| data.message_record(m))
            .collect()
    }

    async fn edit_message(&self, id: i64, body: &str) -> Result<MessageRecord, DbError> {
        let mut data = self.data.lock();
        let stored = data
            .messages
            .get_mut(&id)
            .filter(|m| !m.deleted)
            .ok_or(DbError::NotFound)?;
        stored.body = body.to_string();
        stored.edited_at = Some(Utc::now());
        let stored = stored.clone();
        data.message_record(&stored)
    }

    async fn delete_message(&self, id: i64) -> Result<MessageRecord, DbError> {
        let mut data = self.data.lock();
        let stored = data.messages.get_mut(&id).ok_or(DbError::NotFound)?;
        stored.body.clear();
        stored.deleted = true;
        let stored = stored.clone();
        data.message_record(&stored)
    }

    async fn set_reaction(&self, message_id: i64, user_id: &str, emoji: &str, add: bool) -> Result<(), DbError> {
        let mut data = self.data.lock();
        let exists = data
            .reactions
            .iter()
            .position(|(m, u, e)| *m == message_id && u == user_id && e == emoji);
        match (add, exists) {
            (true, None) => data
                .reactions
                .push((message_id, user_id.to_string(), emoji.to_string())),
            (false, Some(idx)) => {
                data.reactions.remove(idx);
            }
            _ => {}
        }
        Ok(())
    }

    async fn reactions(&self, message_id: i64) -> Result<BTreeMap<String, Vec<String>>, DbError> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (m, user, emoji) in self.data.lock().reactions.iter() {
            if *m == message_id {
                grouped.entry(emoji.clone()).or_default().push(user.clone());
            }
        }
        Ok(grouped)
    }

    async fn get_or_create_thread(&self, id: i64, user_a: &str, user_b: &str) -> Result<ThreadRecord, DbError> {
        let mut data = self.data.lock();
        if let Some(thread) = data
            .threads
            .iter()
            .find(|t| t.user_a == user_a && t.user_b == user_b)
        {
            return Ok(thread.clone());
        }
        let thread = ThreadRecord {
            id,
            user_a: user_a.to_string(),
            user_b: user_b.to_string(),
            last_message_at: Utc::now(),
        };
        data.threads.push(thread.clone());
        Ok(thread)
    }

    async fn get_thread(&self, id: i64) -> Result<Option<ThreadRecord>, DbError> {
        Ok(self.data.lock().threads.iter().find(|t| t.id == id).cloned())
    }

    async fn list_threads(&self, user_id: &str) -> Result<Vec<ThreadSummary>, DbError> {
        let data = self.data.lock();
        let mut out = Vec::new();
        for thread in data.threads.iter().filter(|t| t.has_participant(user_id)) {
            let Some(other) = data.users.get(thread.other_participant(user_id)) else {
                continue;
            };
            let preview = data
                .messages
                .values()
                .rev()
                .find(|m| m.scope == ScopeId::Thread(thread.id) && !m.deleted)
                .map(|m| m.body.clone());
            out.push(ThreadSummary {
                id: thread.id,
                last_message_at: thread.last_message_at,
                other: other.clone(),
                preview,
            });
        }
        out.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(out)
    }

    async fn create_friend_request(&self, id: i64, from: &str, to: &str) -> Result<FriendRequestRecord, DbError> {
        let mut data = self.data.lock();
        let duplicate = data.requests.iter().any(|r| {
            r.from_user_id == from && r.to_user_id == to && r.status == FriendRequestStatus::Pending
        });
        if duplicate {
            return Err(DbError::Conflict);
        }
        let record = FriendRequestRecord {
            id,
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            status: FriendRequestStatus::Pending,
            created_at: Utc::now(),
        };
        data.requests.push(record.clone());
        Ok(record)
    }

    async fn get_friend_request(&self, id: i64) -> Result<Option<FriendRequestRecord>, DbError> {
        Ok(self.data.lock().requests.iter().find(|r| r.id == id).cloned())
    }

    async fn resolve_friend_request(&self, id: i64, status: FriendRequestStatus) -> Result<(), DbError> {
        let mut data = self.data.lock();
        let request = data
            .requests
            .iter_mut()
            .find(|r| r.id == id && r.status == FriendRequestStatus::Pending)
            .ok_or(DbError::NotFound)?;
        request.status = status;
        Ok(())
    }

    async fn pending_friend_requests(
        &self,
        user_id: &str,
    ) -> Result<(Vec<FriendRequestRecord>, Vec<FriendRequestRecord>), DbError> {
        let data = self.data.lock();
        let pending = data
            .requests
            .iter()
            .rev()
            .filter(|r| r.status == FriendRequestStatus::Pending);
        let (incoming, outgoing): (Vec<_>, Vec<_>) = pending
            .filter(|r| r.to_user_id == user_id || r.from_user_id == user_id)
            .cloned()
            .partition(|r| r.to_user_id == user_id);
        Ok((incoming, outgoing))
    }

    async fn create_friendship(&self, user_a: &str, user_b: &str) -> Result<(), DbError> {
        let mut data = self.data.lock();
        let pair = (user_a.to_string(), user_b.to_string());
        if !data.friendships.contains(&pair) {
            data.friendships.push(pair);
        }
        Ok(())
    }

    async fn list_friends(&self, user_id: &str) -> Result<Vec<UserRecord>, DbError> {
        let data = self.data.lock();
        let mut friends: Vec<UserRecord> = data
            .friendships
            .iter()
            .filter_map(|(a, b)| {
                if a == user_id {
                    Some(b)
                } else if b == user_id {
                    Some(a)
                } else {
                    None
                }
            })
            .filter_map(|id| data.users.get(id).cloned())
            .collect();
        friends.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(friends)
    }

    async fn create_notification(&self, n: NewNotification) -> Result<NotificationRecord, DbError> {
        let record = NotificationRecord {
            id: n.id,
            user_id: n.user_id,
            kind: n.kind,
            thread_id: n.thread_id,
            room_id: n.room_id,
            message_id: n.message_id,
            created_at: Utc::now(),
        };
        self.data.lock().notifications.push((record.clone(), false));
        Ok(record)
    }

    async fn mark_notifications_read(&self, user_id: &str, ids: &[i64]) -> Result<(), DbError> {
        for (n, read) in self.data.lock().notifications.iter_mut() {
            if n.user_id == user_id && ids.contains(&n.id) {
                *read = true;
            }
        }
        Ok(())
    }
}
