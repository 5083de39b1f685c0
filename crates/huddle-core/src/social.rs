//! Nicknames, user search, friend requests and notifications.

use huddle_db::DbError;
use huddle_models::gateway::{
    FriendList, FriendRequestRespond, FriendRequestSend, FriendRequests, NicknameSet,
    NotificationNew, NotificationsRead, ServerEvent, UserSearch, UserSearchResult,
};
use huddle_models::presence::PresenceStatus;
use huddle_models::social::{
    FriendRequestAction, FriendRequestStatus, FriendRequestView, NotificationKind, NotificationView,
    UserCard,
};
use huddle_util::{snowflake, text, validation};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::events::ConnId;
use crate::session::Actor;
use crate::store::{FriendRequestRecord, NewNotification, NotificationRecord, UserRecord};
use crate::AppState;

pub const SEARCH_DEFAULT_LIMIT: i64 = 10;
pub const SEARCH_MAX_LIMIT: i64 = 20;

pub async fn set_nickname(state: &AppState, actor: &Actor, req: NicknameSet) -> Result<(), CoreError> {
    let nickname = req.nickname.trim().to_string();
    validation::validate_nickname(&nickname)?;

    let user = match state.store.set_nickname(&actor.user_id, &nickname).await {
        Ok(user) => user,
        Err(DbError::Conflict) => return Err(CoreError::NicknameTaken),
        Err(e) => return Err(e.into()),
    };
    info!(user_id = %actor.user_id, nickname = %nickname, "nickname set");

    state
        .registry
        .set_display_name(&actor.user_id, user.shown_name());
    state.send(actor.conn, ServerEvent::UserNicknameOk(NicknameSet { nickname }));
    state.broadcast_presence(None);
    Ok(())
}

pub async fn search(state: &AppState, actor: &Actor, req: UserSearch) -> Result<(), CoreError> {
    let query = text::normalize_nickname(&req.query);
    if query.is_empty() {
        return Err(CoreError::BadRequest("empty query"));
    }
    let limit = req
        .limit
        .unwrap_or(SEARCH_DEFAULT_LIMIT)
        .clamp(1, SEARCH_MAX_LIMIT);
    let users = state
        .store
        .search_users(&query, &actor.user_id, limit)
        .await?
        .iter()
        .map(|user| user_card(state, user))
        .collect();
    state.send(actor.conn, ServerEvent::UserSearchResult(UserSearchResult { users }));
    Ok(())
}

pub async fn send_friend_request(
    state: &AppState,
    actor: &Actor,
    req: FriendRequestSend,
) -> Result<(), CoreError> {
    let target = state
        .store
        .get_user_by_nickname(&text::normalize_nickname(&req.to_nickname))
        .await?
        .ok_or(CoreError::NotFound)?;
    if target.id == actor.user_id {
        return Err(CoreError::BadRequest("cannot befriend yourself"));
    }
    let already = state
        .store
        .list_friends(&actor.user_id)
        .await?
        .iter()
        .any(|friend| friend.id == target.id);
    if already {
        return Err(CoreError::BadRequest("already friends"));
    }

    match state
        .store
        .create_friend_request(state.next_id(), &actor.user_id, &target.id)
        .await
    {
        Ok(request) => {
            debug!(request_id = request.id, from = %actor.user_id, to = %target.id, "friend request");
            push_notification(
                state,
                NewNotification {
                    id: state.next_id(),
                    user_id: target.id.clone(),
                    kind: NotificationKind::FriendRequest,
                    thread_id: None,
                    room_id: None,
                    message_id: None,
                },
            )
            .await;
        }
        Err(DbError::Conflict) => debug!(from = %actor.user_id, to = %target.id, "request already pending"),
        Err(e) => return Err(e.into()),
    }

    refresh_friend_state(state, &actor.user_id).await;
    refresh_friend_state(state, &target.id).await;
    Ok(())
}

pub async fn respond_friend_request(
    state: &AppState,
    actor: &Actor,
    req: FriendRequestRespond,
) -> Result<(), CoreError> {
    let id = snowflake::parse(&req.request_id).ok_or(CoreError::BadRequest("bad request id"))?;
    let request = state
        .store
        .get_friend_request(id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if request.to_user_id != actor.user_id {
        return Err(CoreError::Forbidden);
    }
    if request.status != FriendRequestStatus::Pending {
        return Err(CoreError::BadRequest("request already resolved"));
    }

    let status = match req.action {
        FriendRequestAction::Accept => FriendRequestStatus::Accepted,
        FriendRequestAction::Decline => FriendRequestStatus::Declined,
    };
    state.store.resolve_friend_request(id, status).await?;
    if status == FriendRequestStatus::Accepted {
        let (user_a, user_b) = text::order_pair(&request.from_user_id, &request.to_user_id);
        state.store.create_friendship(user_a, user_b).await?;
    }
    info!(request_id = id, user_id = %actor.user_id, status = status.as_str(), "friend request resolved");

    refresh_friend_state(state, &request.from_user_id).await;
    refresh_friend_state(state, &request.to_user_id).await;
    Ok(())
}

pub async fn mark_read(state: &AppState, actor: &Actor, req: NotificationsRead) -> Result<(), CoreError> {
    let ids: Vec<i64> = req.ids.iter().filter_map(|id| snowflake::parse(id)).collect();
    if ids.is_empty() {
        return Ok(());
    }
    if let Err(e) = state.store.mark_notifications_read(&actor.user_id, &ids).await {
        warn!(user_id = %actor.user_id, error = %e, "failed to mark notifications read");
    }
    Ok(())
}

/// Pending requests and the friend list, sent to one connection.
pub async fn send_friend_state(state: &AppState, conn: ConnId, user_id: &str) -> Result<(), CoreError> {
    let (incoming, outgoing) = state.store.pending_friend_requests(user_id).await?;
    let incoming = request_views(state, incoming).await?;
    let outgoing = request_views(state, outgoing).await?;
    let friends = state
        .store
        .list_friends(user_id)
        .await?
        .iter()
        .map(|user| user_card(state, user))
        .collect();

    state.send(conn, ServerEvent::FriendsRequests(FriendRequests { incoming, outgoing }));
    state.send(conn, ServerEvent::FriendsList(FriendList { friends }));
    Ok(())
}

/// Persist a notification and push it if the recipient is online. Storage
/// failures do not stop live delivery.
pub async fn push_notification(state: &AppState, notification: NewNotification) {
    let user_id = notification.user_id.clone();
    let record = match state.store.create_notification(notification.clone()).await {
        Ok(record) => record,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "failed to persist notification");
            NotificationRecord {
                id: notification.id,
                user_id: notification.user_id,
                kind: notification.kind,
                thread_id: notification.thread_id,
                room_id: notification.room_id,
                message_id: notification.message_id,
                created_at: chrono::Utc::now(),
            }
        }
    };
    state.send_to_user(&user_id, ServerEvent::NotificationNew(notification_new(&record)));
}

pub fn notification_new(record: &NotificationRecord) -> NotificationNew {
    NotificationNew {
        notification: NotificationView {
            id: record.id.to_string(),
            kind: record.kind,
            thread_id: record.thread_id.map(|id| id.to_string()),
            room_id: record.room_id.clone(),
            message_id: record.message_id.map(|id| id.to_string()),
            created_at: record.created_at,
        },
    }
}

/// Status from the registry when online, otherwise the stored one.
pub fn live_status(state: &AppState, user_id: &str, stored: PresenceStatus) -> PresenceStatus {
    state
        .registry
        .route_of(user_id)
        .and_then(|conn| state.registry.user_of(conn))
        .map_or(stored, |user| user.status)
}

pub fn user_card(state: &AppState, user: &UserRecord) -> UserCard {
    UserCard {
        id: user.id.clone(),
        nickname: user.shown_name().to_string(),
        avatar_url: user.avatar_url.clone(),
        status: live_status(state, &user.id, user.status),
    }
}

async fn refresh_friend_state(state: &AppState, user_id: &str) {
    let Some(conn) = state.registry.route_of(user_id) else {
        return;
    };
    if let Err(e) = send_friend_state(state, conn, user_id).await {
        warn!(user_id, error = %e, "failed to refresh friend state");
    }
}

async fn request_views(
    state: &AppState,
    requests: Vec<FriendRequestRecord>,
) -> Result<Vec<FriendRequestView>, CoreError> {
    let mut views = Vec::with_capacity(requests.len());
    for request in requests {
        let (Some(from), Some(to)) = (
            state.store.get_user(&request.from_user_id).await?,
            state.store.get_user(&request.to_user_id).await?,
        ) else {
            continue;
        };
        views.push(FriendRequestView {
            id: request.id.to_string(),
            from_user: user_card(state, &from),
            to_user: user_card(state, &to),
            status: request.status,
            created_at: request.created_at,
        });
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::test_support::{login, state, Client};
    use huddle_models::error::ErrorCode;
    use huddle_models::gateway::ClientEvent;

    async fn nickname(state: &AppState, client: &mut Client, nick: &str) -> Vec<ServerEvent> {
        client
            .send(
                state,
                ClientEvent::UserNicknameSet(NicknameSet {
                    nickname: nick.to_string(),
                }),
            )
            .await;
        client.drain()
    }

    fn incoming_requests(events: &[ServerEvent]) -> Option<Vec<FriendRequestView>> {
        events.iter().rev().find_map(|e| match e {
            ServerEvent::FriendsRequests(r) => Some(r.incoming.clone()),
            _ => None,
        })
    }

    fn friends(events: &[ServerEvent]) -> Option<Vec<UserCard>> {
        events.iter().rev().find_map(|e| match e {
            ServerEvent::FriendsList(f) => Some(f.friends.clone()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn nickname_is_unique_ignoring_case() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;

        let events = nickname(&state, &mut a, " Demo.User ").await;
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::UserNicknameOk(n) if n.nickname == "Demo.User"
        )));
        // The new name shows up in presence.
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::PresenceList(p) if p.users_online.iter().any(|u| u.name == "Demo.User")
        )));

        let events = nickname(&state, &mut b, "demo.user").await;
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::Error(p) if p.code == ErrorCode::NicknameTaken
        )));

        // Invalid characters are dropped silently.
        assert!(nickname(&state, &mut b, "no spaces").await.is_empty());
    }

    #[tokio::test]
    async fn search_matches_nickname_substrings() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        nickname(&state, &mut b, "sam-wave").await;
        a.drain();

        a.send(
            &state,
            ClientEvent::UserSearch(UserSearch {
                query: "WAVE".into(),
                limit: Some(500),
            }),
        )
        .await;
        let users = a
            .drain()
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::UserSearchResult(r) => Some(r.users),
                _ => None,
            })
            .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "b");
        assert_eq!(users[0].status, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn friend_request_accept_flow() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        nickname(&state, &mut b, "bobby").await;
        a.drain();

        let send = ClientEvent::FriendsRequestSend(FriendRequestSend {
            to_nickname: "Bobby".into(),
        });
        a.send(&state, send.clone()).await;
        // Duplicate while pending is a no-op.
        a.send(&state, send).await;
        a.drain();

        let events = b.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::NotificationNew(n) if n.notification.kind == NotificationKind::FriendRequest
        )));
        let incoming = incoming_requests(&events).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from_user.id, "a");
        assert_eq!(store.unread_notifications("b").len(), 1);

        b.send(
            &state,
            ClientEvent::FriendsRequestRespond(FriendRequestRespond {
                request_id: incoming[0].id.clone(),
                action: FriendRequestAction::Accept,
            }),
        )
        .await;
        let theirs = b.drain();
        assert!(incoming_requests(&theirs).unwrap().is_empty());
        assert_eq!(friends(&theirs).unwrap()[0].id, "a");
        assert_eq!(friends(&a.drain()).unwrap()[0].id, "b");
    }

    #[tokio::test]
    async fn only_the_target_can_respond() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        nickname(&state, &mut b, "bobby").await;
        a.send(
            &state,
            ClientEvent::FriendsRequestSend(FriendRequestSend {
                to_nickname: "bobby".into(),
            }),
        )
        .await;
        let request_id = incoming_requests(&b.drain()).unwrap()[0].id.clone();
        a.drain();

        a.send(
            &state,
            ClientEvent::FriendsRequestRespond(FriendRequestRespond {
                request_id,
                action: FriendRequestAction::Accept,
            }),
        )
        .await;
        assert!(a.drain().is_empty());
        assert!(store.list_friends("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_marks_only_own_notifications() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        push_notification(
            &state,
            NewNotification {
                id: 42,
                user_id: "a".into(),
                kind: NotificationKind::Mention,
                thread_id: None,
                room_id: Some("r".into()),
                message_id: Some(7),
            },
        )
        .await;
        let pushed = a.drain();
        assert!(pushed.iter().any(|e| matches!(
            e,
            ServerEvent::NotificationNew(n) if n.notification.id == "42" && n.notification.message_id.as_deref() == Some("7")
        )));

        a.send(
            &state,
            ClientEvent::NotificationsRead(NotificationsRead {
                ids: vec!["42".into(), "garbage".into()],
            }),
        )
        .await;
        assert!(store.unread_notifications("a").is_empty());
    }
}
