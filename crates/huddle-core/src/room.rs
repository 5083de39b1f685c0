use huddle_models::gateway::{
    HostActionNotice, HostKick, HostLock, HostMute, ParticipantJoined, ParticipantLeft, RoomCreate,
    RoomCreated, RoomJoin, RoomJoined, RoomRef, ServerEvent,
};
use huddle_models::room::HostAction;
use huddle_util::validation;
use tracing::{debug, info, warn};

use crate::auth;
use crate::error::CoreError;
use crate::registry::{JoinRejection, RoomMeta};
use crate::session::Actor;
use crate::store::RoomRecord;
use crate::AppState;

pub async fn create(state: &AppState, actor: &Actor, req: RoomCreate) -> Result<(), CoreError> {
    let name = req.name.trim().to_string();
    validation::validate_room_name(&name)?;
    let password_hash = match req.password.filter(|p| !p.is_empty()) {
        Some(password) => {
            validation::validate_room_password(&password)?;
            Some(hash_room_password(password).await?)
        }
        None => None,
    };

    let record = RoomRecord {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        visibility: req.visibility,
        locked: false,
        host_id: actor.user_id.clone(),
        password_hash,
    };
    state.store.create_room(&record).await?;

    let meta = record.meta();
    let info = meta.info();
    state.registry.create_room(meta);
    info!(room_id = %record.id, user_id = %actor.user_id, "room created");

    state.send(actor.conn, ServerEvent::RoomCreated(RoomCreated { room: info }));
    state.broadcast_room_list();
    Ok(())
}

pub async fn join(state: &AppState, actor: &Actor, req: RoomJoin) -> Result<(), CoreError> {
    let meta = load_room(state, &req.room_id).await?;
    let is_host = meta.is_host(&actor.user_id);

    if !is_host {
        if meta.locked {
            return Err(CoreError::RoomLocked);
        }
        if let Some(digest) = meta.password_hash.clone() {
            let Some(password) = req.password.filter(|p| !p.is_empty()) else {
                return Err(CoreError::RoomPassword);
            };
            if !check_room_password(password, digest).await? {
                return Err(CoreError::RoomPassword);
            }
        }
    }

    let user = state
        .registry
        .user_of(actor.conn)
        .ok_or(CoreError::Forbidden)?;
    let participant = user.participant();
    let joined = state
        .registry
        .try_join(&req.room_id, participant.clone())
        .map_err(|rejection| match rejection {
            JoinRejection::NotFound => CoreError::RoomNotFound,
            JoinRejection::Locked => CoreError::RoomLocked,
            JoinRejection::Full => CoreError::RoomFull,
        })?;

    debug!(
        room_id = %req.room_id,
        user_id = %actor.user_id,
        count = joined.participants.len(),
        rejoined = joined.rejoined,
        "joined room"
    );
    state.send(
        actor.conn,
        ServerEvent::RoomJoined(RoomJoined {
            room: joined.room,
            participants: joined.participants.clone(),
        }),
    );
    if !joined.rejoined {
        let user_view = joined
            .participants
            .iter()
            .find(|p| p.user_id == actor.user_id)
            .cloned()
            .unwrap_or(participant);
        state.events.send_many(
            joined.others,
            &ServerEvent::RoomParticipantJoined(ParticipantJoined {
                room_id: req.room_id.clone(),
                user: user_view,
            }),
        );
    }
    state.broadcast_room_list();

    if let Err(e) = state.store.open_membership(&req.room_id, &actor.user_id).await {
        warn!(room_id = %req.room_id, user_id = %actor.user_id, error = %e, "failed to open membership");
    }
    Ok(())
}

pub async fn leave(state: &AppState, actor: &Actor, req: RoomRef) -> Result<(), CoreError> {
    if detach(state, &req.room_id, &actor.user_id).await {
        state.broadcast_room_list();
    }
    Ok(())
}

/// Remove the user from every room they are in. Used on disconnect; the
/// caller broadcasts the room list afterwards.
pub async fn leave_all(state: &AppState, user_id: &str) {
    for room_id in state.registry.rooms_of(user_id) {
        detach(state, &room_id, user_id).await;
    }
}

pub fn host_mute(state: &AppState, actor: &Actor, req: HostMute) -> Result<(), CoreError> {
    require_host(state, actor, &req.room_id)?;
    if !state
        .registry
        .set_muted(&req.room_id, &req.target_user_id, req.muted)
    {
        return Err(CoreError::NotFound);
    }
    let event = ServerEvent::RoomHostAction(HostActionNotice {
        room_id: req.room_id.clone(),
        action: HostAction::Mute,
        target_user_id: Some(req.target_user_id),
        muted: Some(req.muted),
        locked: None,
    });
    state
        .events
        .send_many(state.registry.room_conns(&req.room_id, None), &event);
    Ok(())
}

pub async fn host_kick(state: &AppState, actor: &Actor, req: HostKick) -> Result<(), CoreError> {
    require_host(state, actor, &req.room_id)?;
    if req.target_user_id == actor.user_id {
        return Err(CoreError::BadRequest("host cannot kick themselves"));
    }
    let remaining = state
        .registry
        .remove_participant(&req.room_id, &req.target_user_id)
        .ok_or(CoreError::NotFound)?;
    info!(room_id = %req.room_id, target = %req.target_user_id, "participant kicked");

    state.send_to_user(
        &req.target_user_id,
        ServerEvent::RoomHostAction(HostActionNotice {
            room_id: req.room_id.clone(),
            action: HostAction::Kick,
            target_user_id: Some(req.target_user_id.clone()),
            muted: None,
            locked: None,
        }),
    );
    state.events.send_many(
        remaining,
        &ServerEvent::RoomParticipantLeft(ParticipantLeft {
            room_id: req.room_id.clone(),
            user_id: req.target_user_id.clone(),
        }),
    );
    state.broadcast_room_list();

    if let Err(e) = state
        .store
        .close_membership(&req.room_id, &req.target_user_id)
        .await
    {
        warn!(room_id = %req.room_id, error = %e, "failed to close membership");
    }
    Ok(())
}

pub async fn host_lock(state: &AppState, actor: &Actor, req: HostLock) -> Result<(), CoreError> {
    require_host(state, actor, &req.room_id)?;
    state.registry.set_locked(&req.room_id, req.locked);
    if let Err(e) = state.store.set_room_locked(&req.room_id, req.locked).await {
        warn!(room_id = %req.room_id, error = %e, "failed to persist lock");
    }

    let event = ServerEvent::RoomHostAction(HostActionNotice {
        room_id: req.room_id.clone(),
        action: HostAction::Lock,
        target_user_id: None,
        muted: None,
        locked: Some(req.locked),
    });
    state
        .events
        .send_many(state.registry.room_conns(&req.room_id, None), &event);
    state.broadcast_room_list();
    Ok(())
}

/// Registry first, then the store. Stored rooms are cached on first use.
async fn load_room(state: &AppState, room_id: &str) -> Result<RoomMeta, CoreError> {
    if let Some(meta) = state.registry.room_meta(room_id) {
        return Ok(meta);
    }
    let record = state
        .store
        .get_room(room_id)
        .await?
        .ok_or(CoreError::RoomNotFound)?;
    state.registry.hydrate_room(record.meta());
    state.registry.room_meta(room_id).ok_or(CoreError::RoomNotFound)
}

fn require_host(state: &AppState, actor: &Actor, room_id: &str) -> Result<(), CoreError> {
    let meta = state.registry.room_meta(room_id).ok_or(CoreError::NotFound)?;
    if !meta.is_host(&actor.user_id) {
        return Err(CoreError::Forbidden);
    }
    Ok(())
}

/// Returns true if the user was actually in the room.
async fn detach(state: &AppState, room_id: &str, user_id: &str) -> bool {
    let Some(remaining) = state.registry.remove_participant(room_id, user_id) else {
        return false;
    };
    debug!(room_id, user_id, "left room");
    state.events.send_many(
        remaining,
        &ServerEvent::RoomParticipantLeft(ParticipantLeft {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        }),
    );
    if let Err(e) = state.store.close_membership(room_id, user_id).await {
        warn!(room_id, user_id, error = %e, "failed to close membership");
    }
    true
}

async fn hash_room_password(password: String) -> Result<String, CoreError> {
    tokio::task::spawn_blocking(move || auth::hash_password(&password))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?
        .map_err(|e| CoreError::Internal(e.to_string()))
}

async fn check_room_password(password: String, digest: String) -> Result<bool, CoreError> {
    tokio::task::spawn_blocking(move || auth::verify_password(&password, &digest))
        .await
        .map_err(|e| CoreError::Internal(e.to_string()))?
        .map_err(|e| CoreError::Internal(e.to_string()))
}
