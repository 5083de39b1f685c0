//! Room chat, direct messages, edits, deletes, reactions and mentions.

use chrono::Utc;
use huddle_models::gateway::{
    ChatAck, DmHistoryPage, DmHistoryQuery, DmMessageNew, DmSend, DmThreadList, DmThreadOpen,
    DmTyping, DmTypingNotice, MsgEdit, MsgReact, MsgRef, MsgUpdated, ReactionUpdate,
    RoomChatMessage, RoomChatSend, RoomHistoryPage, RoomHistoryQuery, ServerEvent,
};
use huddle_models::message::{MessageView, SenderView};
use huddle_models::social::{DmThreadView, NotificationKind, UserCard};
use huddle_util::pagination::{CursorParams, Page};
use huddle_util::{snowflake, text, validation};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::events::ConnId;
use crate::session::Actor;
use crate::social;
use crate::store::{MessageRecord, NewNotification, ScopeId, ThreadRecord};
use crate::AppState;

/// Messages can be edited this long after they were sent.
pub const EDIT_WINDOW_MINUTES: i64 = 15;
const PREVIEW_CHARS: usize = 80;

pub fn message_view(
    record: &MessageRecord,
    reactions: BTreeMap<String, Vec<String>>,
    client_msg_id: Option<String>,
) -> MessageView {
    MessageView {
        id: record.id.to_string(),
        body: (!record.deleted).then(|| record.body.clone()),
        created_at: record.created_at,
        edited_at: record.edited_at,
        deleted: record.deleted,
        sender: SenderView {
            id: record.sender.id.clone(),
            nickname: record.sender.shown_name().to_string(),
            avatar_url: record.sender.avatar_url.clone(),
        },
        reactions,
        client_msg_id,
    }
}

// ── Rooms ──────────────────────────────────────────────────────────────────

pub async fn send_room_message(state: &AppState, actor: &Actor, req: RoomChatSend) -> Result<(), CoreError> {
    if !state.registry.is_participant(&req.room_id, &actor.user_id) {
        return Err(CoreError::Forbidden);
    }
    let body = clean_body(&req.body)?;
    let scope = ScopeId::Room(req.room_id.clone());
    let record = state
        .store
        .append_message(state.next_id(), &scope, &actor.user_id, &body)
        .await?;
    debug!(room_id = %req.room_id, user_id = %actor.user_id, message_id = record.id, "room message");

    let view = message_view(&record, BTreeMap::new(), Some(req.client_msg_id.clone()));
    state.events.send_many(
        state.registry.room_conns(&req.room_id, None),
        &ServerEvent::RoomChatMessage(RoomChatMessage {
            room_id: req.room_id.clone(),
            message: view,
        }),
    );
    state.send(
        actor.conn,
        ServerEvent::RoomChatAck(ChatAck {
            client_msg_id: req.client_msg_id,
            message_id: record.id.to_string(),
            thread_id: None,
        }),
    );

    notify_mentions(state, actor, &record, &req.room_id).await;
    Ok(())
}

pub async fn room_history(state: &AppState, actor: &Actor, req: RoomHistoryQuery) -> Result<(), CoreError> {
    if !state.registry.is_participant(&req.room_id, &actor.user_id) {
        return Err(CoreError::Forbidden);
    }
    let scope = ScopeId::Room(req.room_id.clone());
    let (messages, next_cursor) = history_page(state, &scope, req.cursor.as_deref(), req.limit).await?;
    state.send(
        actor.conn,
        ServerEvent::RoomChatHistory(RoomHistoryPage {
            room_id: req.room_id,
            messages,
            next_cursor,
        }),
    );
    Ok(())
}

// ── Direct messages ────────────────────────────────────────────────────────

pub async fn open_thread(state: &AppState, actor: &Actor, req: DmThreadOpen) -> Result<(), CoreError> {
    let other_id = match (req.with_user_id, req.with_nickname) {
        (Some(id), _) if !id.is_empty() => state
            .store
            .get_user(&id)
            .await?
            .map(|u| u.id)
            .ok_or(CoreError::NotFound)?,
        (_, Some(nickname)) => state
            .store
            .get_user_by_nickname(&text::normalize_nickname(&nickname))
            .await?
            .map(|u| u.id)
            .ok_or(CoreError::NotFound)?,
        _ => return Err(CoreError::BadRequest("no dm target")),
    };
    if other_id == actor.user_id {
        return Err(CoreError::BadRequest("cannot message yourself"));
    }

    let (user_a, user_b) = text::order_pair(&actor.user_id, &other_id);
    let thread = state
        .store
        .get_or_create_thread(state.next_id(), user_a, user_b)
        .await?;

    send_thread_list(state, actor.conn, &actor.user_id).await?;
    state.send(
        actor.conn,
        ServerEvent::DmHistory(DmHistoryPage {
            thread_id: thread.id.to_string(),
            messages: Vec::new(),
            next_cursor: None,
        }),
    );
    Ok(())
}

/// Threads the user takes part in, most recently active first.
pub async fn send_thread_list(state: &AppState, conn: ConnId, user_id: &str) -> Result<(), CoreError> {
    let summaries = state.store.list_threads(user_id).await?;
    let threads = summaries
        .into_iter()
        .map(|summary| DmThreadView {
            id: summary.id.to_string(),
            with_user: UserCard {
                status: social::live_status(state, &summary.other.id, summary.other.status),
                id: summary.other.id.clone(),
                nickname: summary.other.shown_name().to_string(),
                avatar_url: summary.other.avatar_url.clone(),
            },
            last_message_at: summary.last_message_at,
            last_message_preview: summary
                .preview
                .map(|p| p.chars().take(PREVIEW_CHARS).collect())
                .unwrap_or_default(),
        })
        .collect();
    state.send(conn, ServerEvent::DmThreadList(DmThreadList { threads }));
    Ok(())
}

pub async fn send_dm(state: &AppState, actor: &Actor, req: DmSend) -> Result<(), CoreError> {
    let thread = load_thread(state, actor, &req.thread_id).await?;
    let body = clean_body(&req.body)?;
    let record = state
        .store
        .append_message(state.next_id(), &ScopeId::Thread(thread.id), &actor.user_id, &body)
        .await?;
    let thread_id = thread.id.to_string();
    debug!(thread_id = %thread_id, user_id = %actor.user_id, message_id = record.id, "direct message");

    state.send(
        actor.conn,
        ServerEvent::DmSendAck(ChatAck {
            client_msg_id: req.client_msg_id.clone(),
            message_id: record.id.to_string(),
            thread_id: Some(thread_id.clone()),
        }),
    );
    let event = ServerEvent::DmMessageNew(DmMessageNew {
        thread_id: thread_id.clone(),
        message: message_view(&record, BTreeMap::new(), Some(req.client_msg_id)),
    });
    state.events.send_many(thread_conns(state, &thread), &event);

    let peer = thread.other_participant(&actor.user_id).to_string();
    social::push_notification(
        state,
        NewNotification {
            id: state.next_id(),
            user_id: peer,
            kind: NotificationKind::Dm,
            thread_id: Some(thread.id),
            room_id: None,
            message_id: Some(record.id),
        },
    )
    .await;
    Ok(())
}

pub async fn dm_history(state: &AppState, actor: &Actor, req: DmHistoryQuery) -> Result<(), CoreError> {
    let thread = load_thread(state, actor, &req.thread_id).await?;
    let scope = ScopeId::Thread(thread.id);
    let (messages, next_cursor) = history_page(state, &scope, req.cursor.as_deref(), req.limit).await?;
    state.send(
        actor.conn,
        ServerEvent::DmHistory(DmHistoryPage {
            thread_id: thread.id.to_string(),
            messages,
            next_cursor,
        }),
    );
    Ok(())
}

pub async fn dm_typing(state: &AppState, actor: &Actor, req: DmTyping) -> Result<(), CoreError> {
    let thread = load_thread(state, actor, &req.thread_id).await?;
    state.send_to_user(
        thread.other_participant(&actor.user_id),
        ServerEvent::DmTyping(DmTypingNotice {
            thread_id: req.thread_id,
            user_id: actor.user_id.clone(),
            is_typing: req.is_typing,
        }),
    );
    Ok(())
}

// ── Message mutations ──────────────────────────────────────────────────────

pub async fn edit_message(state: &AppState, actor: &Actor, req: MsgEdit) -> Result<(), CoreError> {
    let record = load_own_message(state, actor, &req.message_id).await?;
    if record.deleted {
        return Err(CoreError::BadRequest("message was deleted"));
    }
    if Utc::now() - record.created_at > chrono::Duration::minutes(EDIT_WINDOW_MINUTES) {
        return Err(CoreError::BadRequest("edit window elapsed"));
    }
    let body = clean_body(&req.body)?;
    let updated = state.store.edit_message(record.id, &body).await?;
    let reactions = state.store.reactions(updated.id).await?;
    publish_update(state, &updated, reactions).await
}

pub async fn delete_message(state: &AppState, actor: &Actor, req: MsgRef) -> Result<(), CoreError> {
    let record = load_own_message(state, actor, &req.message_id).await?;
    if record.deleted {
        return Ok(());
    }
    let updated = state.store.delete_message(record.id).await?;
    publish_update(state, &updated, BTreeMap::new()).await
}

pub async fn react(state: &AppState, actor: &Actor, req: MsgReact) -> Result<(), CoreError> {
    validation::validate_emoji(&req.emoji)?;
    let id = snowflake::parse(&req.message_id).ok_or(CoreError::BadRequest("bad message id"))?;
    let record = state.store.get_message(id).await?.ok_or(CoreError::NotFound)?;
    if record.deleted {
        return Err(CoreError::BadRequest("message was deleted"));
    }
    let conns = scope_conns(state, &record.scope, &actor.user_id).await?;

    state
        .store
        .set_reaction(record.id, &actor.user_id, &req.emoji, req.add)
        .await?;
    let reactions = state.store.reactions(record.id).await?;
    state.events.send_many(
        conns,
        &ServerEvent::MsgReactionUpdate(ReactionUpdate {
            message_id: record.id.to_string(),
            reactions,
        }),
    );
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn clean_body(raw: &str) -> Result<String, CoreError> {
    let body = text::sanitize_message(raw);
    validation::validate_message_body(&body)?;
    Ok(body)
}

async fn history_page(
    state: &AppState,
    scope: &ScopeId,
    cursor: Option<&str>,
    limit: Option<i64>,
) -> Result<(Vec<MessageView>, Option<String>), CoreError> {
    let before = match cursor.filter(|c| !c.is_empty()) {
        Some(raw) => Some(snowflake::parse(raw).ok_or(CoreError::BadRequest("bad cursor"))?),
        None => None,
    };
    let params = CursorParams::new(before, limit);
    let rows = state
        .store
        .list_messages(scope, params.before, params.fetch_limit())
        .await?;
    let page = Page::from_newest_first(rows, &params, |m| m.id);

    let mut messages = Vec::with_capacity(page.items.len());
    for record in &page.items {
        let reactions = if record.deleted {
            BTreeMap::new()
        } else {
            state.store.reactions(record.id).await?
        };
        messages.push(message_view(record, reactions, None));
    }
    Ok((messages, page.next_cursor.map(|c| c.to_string())))
}

async fn load_thread(state: &AppState, actor: &Actor, raw_id: &str) -> Result<ThreadRecord, CoreError> {
    let id = snowflake::parse(raw_id).ok_or(CoreError::BadRequest("bad thread id"))?;
    let thread = state.store.get_thread(id).await?.ok_or(CoreError::NotFound)?;
    if !thread.has_participant(&actor.user_id) {
        return Err(CoreError::Forbidden);
    }
    Ok(thread)
}

async fn load_own_message(state: &AppState, actor: &Actor, raw_id: &str) -> Result<MessageRecord, CoreError> {
    let id = snowflake::parse(raw_id).ok_or(CoreError::BadRequest("bad message id"))?;
    let record = state.store.get_message(id).await?.ok_or(CoreError::NotFound)?;
    if record.sender.id != actor.user_id {
        return Err(CoreError::Forbidden);
    }
    Ok(record)
}

fn thread_conns(state: &AppState, thread: &ThreadRecord) -> Vec<ConnId> {
    state
        .registry
        .routes_of([thread.user_a.as_str(), thread.user_b.as_str()])
}

/// Recipients of updates to a message in `scope`. The actor must belong to it.
async fn scope_conns(state: &AppState, scope: &ScopeId, user_id: &str) -> Result<Vec<ConnId>, CoreError> {
    match scope {
        ScopeId::Room(room_id) => {
            if !state.registry.is_participant(room_id, user_id) {
                return Err(CoreError::Forbidden);
            }
            Ok(state.registry.room_conns(room_id, None))
        }
        ScopeId::Thread(thread_id) => {
            let thread = state
                .store
                .get_thread(*thread_id)
                .await?
                .ok_or(CoreError::NotFound)?;
            if !thread.has_participant(user_id) {
                return Err(CoreError::Forbidden);
            }
            Ok(thread_conns(state, &thread))
        }
    }
}

async fn publish_update(
    state: &AppState,
    record: &MessageRecord,
    reactions: BTreeMap<String, Vec<String>>,
) -> Result<(), CoreError> {
    let conns = scope_conns(state, &record.scope, &record.sender.id)
        .await
        .or_else(|err| match err {
            // The sender may have left the room since; still reach whoever is there.
            CoreError::Forbidden => match &record.scope {
                ScopeId::Room(room_id) => Ok(state.registry.room_conns(room_id, None)),
                ScopeId::Thread(_) => Err(err),
            },
            other => Err(other),
        })?;
    let (room_id, thread_id) = match &record.scope {
        ScopeId::Room(room_id) => (Some(room_id.clone()), None),
        ScopeId::Thread(thread_id) => (None, Some(thread_id.to_string())),
    };
    state.events.send_many(
        conns,
        &ServerEvent::MsgUpdated(MsgUpdated {
            room_id,
            thread_id,
            message: message_view(record, reactions, None),
        }),
    );
    Ok(())
}

/// Notify every mentioned user other than the sender.
async fn notify_mentions(state: &AppState, actor: &Actor, record: &MessageRecord, room_id: &str) {
    for nickname in text::detect_mentions(&record.body) {
        let user = match state.store.get_user_by_nickname(&nickname).await {
            Ok(Some(user)) => user,
            Ok(None) => continue,
            Err(e) => {
                warn!(nickname = %nickname, error = %e, "mention lookup failed");
                continue;
            }
        };
        if user.id == actor.user_id {
            continue;
        }
        social::push_notification(
            state,
            NewNotification {
                id: state.next_id(),
                user_id: user.id,
                kind: NotificationKind::Mention,
                thread_id: None,
                room_id: Some(room_id.to_string()),
                message_id: Some(record.id),
            },
        )
        .await;
    }
}
