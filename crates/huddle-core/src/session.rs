//! Per-connection state machine: `Unauthenticated -> Authenticated -> Closed`.

use huddle_models::call::EndReason;
use huddle_models::gateway::{
    AuthOk, ClientEvent, Hello, PresenceList, PresenceSet, RoomList, SelfProfile, ServerEvent,
};
use huddle_models::error::ErrorCode;
use huddle_models::presence::PresenceStatus;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::events::{ConnId, EventReceiver};
use crate::rate_limit::{ConnectionLimits, RateClass};
use crate::registry::ConnectedUser;
use crate::{call, chat, room, signaling, social, AppState};

/// The identified caller of a request.
#[derive(Debug, Clone)]
pub struct Actor {
    pub conn: ConnId,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    Authenticated { user_id: String },
    Closed,
}

pub struct Session {
    conn: ConnId,
    phase: Phase,
    limits: ConnectionLimits,
}

impl Session {
    /// Register a connection on the event bus and start its session.
    pub fn open(state: &AppState) -> (Self, EventReceiver) {
        let (conn, rx) = state.events.register();
        let session = Self {
            conn,
            phase: Phase::Unauthenticated,
            limits: ConnectionLimits::new(&state.config.rate_limits),
        };
        (session, rx)
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.phase {
            Phase::Authenticated { user_id } => Some(user_id),
            _ => None,
        }
    }

    pub async fn handle(&mut self, state: &AppState, event: ClientEvent) {
        let user_id = match &self.phase {
            Phase::Closed => return,
            Phase::Unauthenticated => None,
            Phase::Authenticated { user_id } => Some(user_id.clone()),
        };
        let Some(user_id) = user_id else {
            match event {
                ClientEvent::Hello(hello) => self.identify(state, hello).await,
                other => debug!(conn_id = self.conn, event = other.name(), "dropping event before hello"),
            }
            return;
        };

        if matches!(event, ClientEvent::Hello(_)) {
            debug!(conn_id = self.conn, user_id = %user_id, "ignoring repeated hello");
            return;
        }
        if !self.limits.consume(RateClass::General) {
            debug!(conn_id = self.conn, user_id = %user_id, event = event.name(), "rate limited");
            return;
        }
        if let Some(class) = rate_class(&event) {
            if !self.limits.consume(class) {
                self.report(state, event.name(), CoreError::RateLimited(class));
                return;
            }
        }

        let name = event.name();
        let actor = Actor {
            conn: self.conn,
            user_id,
        };
        if let Err(err) = dispatch(state, &actor, event).await {
            self.report(state, name, err);
        }
    }

    /// Tear down after the transport closed. Only the user's current
    /// connection releases their rooms and calls.
    pub async fn close(&mut self, state: &AppState) {
        let phase = std::mem::replace(&mut self.phase, Phase::Closed);
        state.events.unregister(self.conn);
        if !matches!(phase, Phase::Authenticated { .. }) {
            return;
        }

        let Some(unbound) = state.registry.unbind_connection(self.conn) else {
            return;
        };
        let user_id = unbound.user.user_id;
        if !unbound.was_current {
            debug!(conn_id = self.conn, user_id = %user_id, "superseded connection closed");
            return;
        }

        room::leave_all(state, &user_id).await;
        call::end_all(state, &user_id, EndReason::Disconnected);
        state.broadcast_presence(None);
        state.broadcast_room_list();
        info!(conn_id = self.conn, user_id = %user_id, "user disconnected");
    }

    async fn identify(&mut self, state: &AppState, hello: Hello) {
        match self.try_identify(state, &hello.token).await {
            Ok(user_id) => {
                info!(conn_id = self.conn, user_id = %user_id, "identified");
                self.phase = Phase::Authenticated { user_id };
            }
            Err(err) => {
                match &err {
                    CoreError::Database(_) | CoreError::Internal(_) => {
                        warn!(conn_id = self.conn, error = %err, "identify failed")
                    }
                    _ => debug!(conn_id = self.conn, error = %err, "identify rejected"),
                }
                state.send(self.conn, ServerEvent::error(ErrorCode::AuthFailed));
            }
        }
    }

    async fn try_identify(&self, state: &AppState, token: &str) -> Result<String, CoreError> {
        let identity = state.verifier.verify(token).map_err(|e| {
            debug!(conn_id = self.conn, error = %e, "token rejected");
            CoreError::AuthFailed
        })?;

        let record = if state.config.provision_users {
            Some(
                state
                    .store
                    .upsert_user(&identity.user_id, &identity.display_name)
                    .await?,
            )
        } else {
            state.store.get_user(&identity.user_id).await?
        };
        let record = record.ok_or(CoreError::AuthFailed)?;

        let user = ConnectedUser {
            user_id: record.id.clone(),
            display_name: record.shown_name().to_string(),
            avatar_url: record.avatar_url.clone(),
            status: PresenceStatus::Online,
        };
        if let Some(previous) = state.registry.bind_connection(self.conn, user) {
            debug!(conn_id = self.conn, superseded = previous, user_id = %record.id, "route moved");
        }

        state.send(
            self.conn,
            ServerEvent::AuthOk(AuthOk {
                user: SelfProfile {
                    id: record.id.clone(),
                    name: record.display_name.clone(),
                    nickname: record.nickname.clone(),
                    avatar_url: record.avatar_url.clone(),
                },
            }),
        );
        state.send(
            self.conn,
            ServerEvent::PresenceList(PresenceList {
                users_online: state.registry.list_online(),
            }),
        );

        match state.store.list_rooms().await {
            Ok(rooms) => {
                for stored in rooms {
                    state.registry.hydrate_room(stored.meta());
                }
            }
            Err(e) => warn!(error = %e, "failed to merge stored rooms"),
        }
        state.send(
            self.conn,
            ServerEvent::RoomList(RoomList {
                rooms: state.registry.list_public_rooms(),
            }),
        );

        state.broadcast_presence(Some(self.conn));

        if let Err(e) = social::send_friend_state(state, self.conn, &record.id).await {
            warn!(user_id = %record.id, error = %e, "failed to load friend lists");
        }
        if let Err(e) = chat::send_thread_list(state, self.conn, &record.id).await {
            warn!(user_id = %record.id, error = %e, "failed to load dm threads");
        }
        Ok(record.id)
    }

    fn report(&self, state: &AppState, event: &'static str, err: CoreError) {
        match err.code() {
            Some(code) => {
                debug!(conn_id = self.conn, event, error = %err, "request rejected");
                state.send(self.conn, ServerEvent::error(code));
            }
            None => match err {
                CoreError::Database(_) | CoreError::Internal(_) => {
                    warn!(conn_id = self.conn, event, error = %err, "request failed")
                }
                _ => debug!(conn_id = self.conn, event, error = %err, "request dropped"),
            },
        }
    }
}

/// The secondary bucket an event draws from, on top of the general one.
fn rate_class(event: &ClientEvent) -> Option<RateClass> {
    match event {
        ClientEvent::RoomChatSend(_) | ClientEvent::DmSend(_) => Some(RateClass::Chat),
        ClientEvent::MsgReact(_) => Some(RateClass::Reaction),
        ClientEvent::DmTyping(_) => Some(RateClass::Typing),
        ClientEvent::UserNicknameSet(_)
        | ClientEvent::RoomCreate(_)
        | ClientEvent::RoomHostMute(_)
        | ClientEvent::RoomHostKick(_)
        | ClientEvent::RoomHostLock(_) => Some(RateClass::Mutation),
        _ => None,
    }
}

async fn dispatch(state: &AppState, actor: &Actor, event: ClientEvent) -> Result<(), CoreError> {
    match event {
        ClientEvent::Hello(_) => Ok(()),
        ClientEvent::PresenceSet(req) => set_presence(state, actor, req).await,
        ClientEvent::RoomCreate(req) => room::create(state, actor, req).await,
        ClientEvent::RoomJoin(req) => room::join(state, actor, req).await,
        ClientEvent::RoomLeave(req) => room::leave(state, actor, req).await,
        ClientEvent::RoomHostMute(req) => room::host_mute(state, actor, req),
        ClientEvent::RoomHostKick(req) => room::host_kick(state, actor, req).await,
        ClientEvent::RoomHostLock(req) => room::host_lock(state, actor, req).await,
        ClientEvent::CallInvite(req) => call::invite(state, actor, req),
        ClientEvent::CallAccept(req) => call::accept(state, actor, req),
        ClientEvent::CallDecline(req) => call::decline(state, actor, req),
        ClientEvent::CallEnd(req) => call::end(state, actor, req),
        ClientEvent::SignalOffer(signal) => signaling::relay_offer(state, actor, signal),
        ClientEvent::SignalAnswer(signal) => signaling::relay_answer(state, actor, signal),
        ClientEvent::SignalIce(signal) => signaling::relay_ice(state, actor, signal),
        ClientEvent::RoomChatSend(req) => chat::send_room_message(state, actor, req).await,
        ClientEvent::RoomChatHistory(req) => chat::room_history(state, actor, req).await,
        ClientEvent::DmThreadOpen(req) => chat::open_thread(state, actor, req).await,
        ClientEvent::DmThreadList(_) => chat::send_thread_list(state, actor.conn, &actor.user_id).await,
        ClientEvent::DmSend(req) => chat::send_dm(state, actor, req).await,
        ClientEvent::DmHistory(req) => chat::dm_history(state, actor, req).await,
        ClientEvent::DmTyping(req) => chat::dm_typing(state, actor, req).await,
        ClientEvent::MsgEdit(req) => chat::edit_message(state, actor, req).await,
        ClientEvent::MsgDelete(req) => chat::delete_message(state, actor, req).await,
        ClientEvent::MsgReact(req) => chat::react(state, actor, req).await,
        ClientEvent::UserNicknameSet(req) => social::set_nickname(state, actor, req).await,
        ClientEvent::UserSearch(req) => social::search(state, actor, req).await,
        ClientEvent::FriendsRequestSend(req) => social::send_friend_request(state, actor, req).await,
        ClientEvent::FriendsRequestRespond(req) => social::respond_friend_request(state, actor, req).await,
        ClientEvent::FriendsList(_) => social::send_friend_state(state, actor.conn, &actor.user_id).await,
        ClientEvent::NotificationsRead(req) => social::mark_read(state, actor, req).await,
    }
}

async fn set_presence(state: &AppState, actor: &Actor, req: PresenceSet) -> Result<(), CoreError> {
    if !state.registry.set_presence(actor.conn, req.status) {
        return Err(CoreError::Forbidden);
    }
    if let Err(e) = state.store.set_status(&actor.user_id, req.status).await {
        warn!(user_id = %actor.user_id, error = %e, "failed to persist status");
    }
    state.broadcast_presence(Some(actor.conn));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_token;
    use crate::test_support::{login, state, state_with, SECRET};
    use crate::AppConfig;
    use crate::store::Store;
    use huddle_models::gateway::{RoomCreate, RoomJoin};
    use huddle_models::room::Visibility;

    fn hello(user_id: &str) -> ClientEvent {
        ClientEvent::Hello(Hello {
            token: create_token(user_id, user_id, SECRET, 3600).unwrap(),
        })
    }

    fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn hello_sends_profile_presence_and_rooms() {
        let (state, store) = state();
        store.insert_user("ada", "Ada");
        let (mut session, mut rx) = Session::open(&state);
        session.handle(&state, hello("ada")).await;

        let events = drain(&mut rx);
        assert!(matches!(&events[0], ServerEvent::AuthOk(ok) if ok.user.id == "ada"));
        assert!(matches!(&events[1], ServerEvent::PresenceList(p) if p.users_online.len() == 1));
        assert!(matches!(&events[2], ServerEvent::RoomList(_)));
        assert_eq!(session.user_id(), Some("ada"));
    }

    #[tokio::test]
    async fn events_before_hello_are_dropped() {
        let (state, store) = state();
        store.insert_user("ada", "Ada");
        let (mut session, mut rx) = Session::open(&state);
        session
            .handle(
                &state,
                ClientEvent::RoomCreate(RoomCreate {
                    name: "early".into(),
                    visibility: Visibility::Public,
                    password: None,
                }),
            )
            .await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(session.phase(), &Phase::Unauthenticated);
    }

    #[tokio::test]
    async fn bad_token_and_unknown_user_fail_auth() {
        let (state, _store) = state();
        let (mut session, mut rx) = Session::open(&state);
        session
            .handle(
                &state,
                ClientEvent::Hello(Hello {
                    token: "not-a-jwt".into(),
                }),
            )
            .await;
        session.handle(&state, hello("stranger")).await;

        let codes: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                ServerEvent::Error(p) => Some(p.code),
                _ => None,
            })
            .collect();
        assert_eq!(codes, vec![ErrorCode::AuthFailed, ErrorCode::AuthFailed]);
        assert_eq!(session.user_id(), None);
    }

    #[tokio::test]
    async fn provisioning_creates_unknown_users() {
        let (state, store) = state_with(AppConfig {
            provision_users: true,
            ..AppConfig::default()
        });
        let (mut session, mut rx) = Session::open(&state);
        session.handle(&state, hello("newcomer")).await;
        assert!(matches!(&drain(&mut rx)[0], ServerEvent::AuthOk(_)));
        assert!(store.get_user("newcomer").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rapid_reidentify_keeps_one_route() {
        let (state, store) = state();
        store.insert_user("ada", "Ada");
        let mut sessions = Vec::new();
        for _ in 0..20 {
            let (mut session, rx) = Session::open(&state);
            session.handle(&state, hello("ada")).await;
            sessions.push((session, rx));
        }
        let last = sessions.last().map(|(s, _)| s.conn_id()).unwrap();
        assert_eq!(state.registry.route_of("ada"), Some(last));
        assert_eq!(state.registry.list_online().len(), 1);

        // Closing a superseded connection does not take the user offline.
        let (mut first, _) = sessions.remove(0);
        first.close(&state).await;
        assert_eq!(state.registry.route_of("ada"), Some(last));
    }

    #[tokio::test]
    async fn disconnect_leaves_rooms_and_notifies() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        a.send(
            &state,
            ClientEvent::RoomCreate(RoomCreate {
                name: "lobby".into(),
                visibility: Visibility::Public,
                password: None,
            }),
        )
        .await;
        let room_id = a
            .drain()
            .into_iter()
            .find_map(|e| match e {
                ServerEvent::RoomCreated(c) => Some(c.room.room_id),
                _ => None,
            })
            .unwrap();
        for client in [&mut a, &mut b] {
            client
                .send(
                    &state,
                    ClientEvent::RoomJoin(RoomJoin {
                        room_id: room_id.clone(),
                        password: None,
                    }),
                )
                .await;
        }
        a.drain();
        b.drain();

        b.session.close(&state).await;
        let events = a.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::RoomParticipantLeft(l) if l.user_id == "b"
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::PresenceList(p) if p.users_online.len() == 1
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::RoomList(list) if list.rooms[0].count == 1
        )));
        assert_eq!(state.events.connection_count(), 1);

        // Closed sessions ignore further input.
        b.send(&state, hello("b")).await;
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn presence_set_reaches_others_only() {
        let (state, store) = state();
        let mut a = login(&state, &store, "a").await;
        let mut b = login(&state, &store, "b").await;
        a.drain();

        b.send(
            &state,
            ClientEvent::PresenceSet(PresenceSet {
                status: PresenceStatus::Away,
            }),
        )
        .await;
        assert!(b.drain().is_empty());
        assert!(a.drain().iter().any(|e| matches!(
            e,
            ServerEvent::PresenceList(p)
                if p.users_online.iter().any(|u| u.user_id == "b" && u.status == PresenceStatus::Away)
        )));
    }
}
