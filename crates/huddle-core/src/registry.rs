//! Authoritative in-memory view of who is online, which rooms and calls exist,
//! and who is in them. Every operation runs under one coarse lock and never
//! awaits while holding it.

use huddle_models::call::{CallState, CallerInfo};
use huddle_models::presence::{PresenceStatus, PresenceUser};
use huddle_models::room::{ParticipantView, RoomInfo, RoomSummary, Visibility};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::events::ConnId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedUser {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: PresenceStatus,
}

impl ConnectedUser {
    pub fn presence(&self) -> PresenceUser {
        PresenceUser {
            user_id: self.user_id.clone(),
            name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            status: self.status,
        }
    }

    pub fn participant(&self) -> ParticipantView {
        ParticipantView {
            user_id: self.user_id.clone(),
            name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            muted: false,
        }
    }

    pub fn caller_info(&self) -> CallerInfo {
        CallerInfo {
            user_id: self.user_id.clone(),
            name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMeta {
    pub room_id: String,
    pub name: String,
    pub visibility: Visibility,
    pub locked: bool,
    pub host_id: String,
    pub password_hash: Option<String>,
}

impl RoomMeta {
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room_id.clone(),
            name: self.name.clone(),
            visibility: self.visibility,
            locked: self.locked,
            host_id: self.host_id.clone(),
            has_password: self.password_hash.is_some(),
        }
    }

    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }
}

#[derive(Debug)]
struct RoomEntry {
    meta: RoomMeta,
    /// Join order.
    participants: Vec<ParticipantView>,
    seq: u64,
}

impl RoomEntry {
    fn position(&self, user_id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.user_id == user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEntry {
    pub call_id: String,
    pub caller_id: String,
    pub callee_id: String,
    pub state: CallState,
}

impl CallEntry {
    pub fn involves(&self, user_id: &str) -> bool {
        self.caller_id == user_id || self.callee_id == user_id
    }

    pub fn other_party(&self, user_id: &str) -> &str {
        if self.caller_id == user_id {
            &self.callee_id
        } else {
            &self.caller_id
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    NotFound,
    Locked,
    Full,
}

/// Result of a successful `try_join`.
#[derive(Debug, Clone)]
pub struct Joined {
    pub room: RoomInfo,
    pub participants: Vec<ParticipantView>,
    /// Current connections of the other participants.
    pub others: Vec<ConnId>,
    /// The caller was already a participant.
    pub rejoined: bool,
}

#[derive(Debug, Clone)]
pub struct Unbound {
    pub user: ConnectedUser,
    /// The connection was still the user's route when it closed.
    pub was_current: bool,
}

#[derive(Debug, Default)]
struct Inner {
    conns: HashMap<ConnId, ConnectedUser>,
    routes: HashMap<String, ConnId>,
    rooms: HashMap<String, RoomEntry>,
    calls: HashMap<String, CallEntry>,
    next_room_seq: u64,
}

impl Inner {
    fn insert_room(&mut self, meta: RoomMeta) {
        self.next_room_seq += 1;
        let seq = self.next_room_seq;
        self.rooms.insert(
            meta.room_id.clone(),
            RoomEntry {
                meta,
                participants: Vec::new(),
                seq,
            },
        );
    }

    fn routes_for<'a>(&self, users: impl IntoIterator<Item = &'a str>) -> Vec<ConnId> {
        let mut out: Vec<ConnId> = users
            .into_iter()
            .filter_map(|user_id| self.routes.get(user_id).copied())
            .collect();
        out.dedup();
        out
    }
}

pub struct Registry {
    inner: Mutex<Inner>,
    max_participants: usize,
}

impl Registry {
    pub fn new(max_participants: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_participants: max_participants.max(1),
        }
    }

    pub fn max_participants(&self) -> usize {
        self.max_participants
    }

    // ── Connections & presence ────────────────────────────────────────────

    /// Bind `conn` to `user` and make it the user's route. Returns the
    /// connection it superseded, if any. The superseded connection keeps its
    /// own entry until it closes.
    pub fn bind_connection(&self, conn: ConnId, user: ConnectedUser) -> Option<ConnId> {
        let mut inner = self.inner.lock();
        let previous = inner.routes.insert(user.user_id.clone(), conn);
        inner.conns.insert(conn, user);
        previous.filter(|prev| *prev != conn)
    }

    pub fn unbind_connection(&self, conn: ConnId) -> Option<Unbound> {
        let mut inner = self.inner.lock();
        let user = inner.conns.remove(&conn)?;
        let was_current = inner.routes.get(&user.user_id) == Some(&conn);
        if was_current {
            inner.routes.remove(&user.user_id);
        }
        Some(Unbound { user, was_current })
    }

    pub fn user_of(&self, conn: ConnId) -> Option<ConnectedUser> {
        self.inner.lock().conns.get(&conn).cloned()
    }

    pub fn route_of(&self, user_id: &str) -> Option<ConnId> {
        self.inner.lock().routes.get(user_id).copied()
    }

    pub fn routes_of<'a>(&self, users: impl IntoIterator<Item = &'a str>) -> Vec<ConnId> {
        self.inner.lock().routes_for(users)
    }

    /// Every identified connection, including superseded ones still open.
    pub fn authenticated_conns(&self) -> Vec<ConnId> {
        self.inner.lock().conns.keys().copied().collect()
    }

    /// One entry per user, taken from their current route.
    pub fn list_online(&self) -> Vec<PresenceUser> {
        let inner = self.inner.lock();
        let mut users: Vec<PresenceUser> = inner
            .routes
            .values()
            .filter_map(|conn| inner.conns.get(conn))
            .map(ConnectedUser::presence)
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.user_id.cmp(&b.user_id)));
        users
    }

    pub fn set_presence(&self, conn: ConnId, status: PresenceStatus) -> bool {
        match self.inner.lock().conns.get_mut(&conn) {
            Some(user) => {
                user.status = status;
                true
            }
            None => false,
        }
    }

    /// Rename the user everywhere the registry shows their name.
    pub fn set_display_name(&self, user_id: &str, display_name: &str) {
        let mut inner = self.inner.lock();
        for user in inner.conns.values_mut().filter(|u| u.user_id == user_id) {
            user.display_name = display_name.to_string();
        }
        for room in inner.rooms.values_mut() {
            if let Some(p) = room.participants.iter_mut().find(|p| p.user_id == user_id) {
                p.name = display_name.to_string();
            }
        }
    }

    // ── Rooms ─────────────────────────────────────────────────────────────

    /// Public rooms with their live participant counts, oldest first.
    pub fn list_public_rooms(&self) -> Vec<RoomSummary> {
        let inner = self.inner.lock();
        let mut rooms: Vec<&RoomEntry> = inner
            .rooms
            .values()
            .filter(|room| room.meta.visibility.is_public())
            .collect();
        rooms.sort_by_key(|room| room.seq);
        rooms
            .into_iter()
            .map(|room| RoomSummary {
                room_id: room.meta.room_id.clone(),
                name: room.meta.name.clone(),
                visibility: room.meta.visibility,
                locked: room.meta.locked,
                count: room.participants.len(),
            })
            .collect()
    }

    /// Returns false if a room with that id is already cached.
    pub fn create_room(&self, meta: RoomMeta) -> bool {
        let mut inner = self.inner.lock();
        if inner.rooms.contains_key(&meta.room_id) {
            return false;
        }
        inner.insert_room(meta);
        true
    }

    /// Cache stored metadata unless the room is already live.
    pub fn hydrate_room(&self, meta: RoomMeta) {
        let mut inner = self.inner.lock();
        if !inner.rooms.contains_key(&meta.room_id) {
            inner.insert_room(meta);
        }
    }

    pub fn contains_room(&self, room_id: &str) -> bool {
        self.inner.lock().rooms.contains_key(room_id)
    }

    pub fn room_meta(&self, room_id: &str) -> Option<RoomMeta> {
        self.inner.lock().rooms.get(room_id).map(|r| r.meta.clone())
    }

    pub fn room_snapshot(&self, room_id: &str) -> Option<(RoomInfo, Vec<ParticipantView>)> {
        let inner = self.inner.lock();
        let room = inner.rooms.get(room_id)?;
        Some((room.meta.info(), room.participants.clone()))
    }

    /// Capacity enforcement. Returns false without mutating when the room is
    /// missing or full. A participant already present is refreshed in place.
    pub fn add_participant(&self, room_id: &str, participant: ParticipantView) -> bool {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(room_id) else {
            return false;
        };
        if let Some(idx) = room.position(&participant.user_id) {
            room.participants[idx] = participant;
            return true;
        }
        if room.participants.len() >= self.max_participants {
            return false;
        }
        room.participants.push(participant);
        true
    }

    /// Lock and capacity gates evaluated together with the insertion, so two
    /// racing joins can never overfill a room. The host bypasses the lock.
    pub fn try_join(&self, room_id: &str, participant: ParticipantView) -> Result<Joined, JoinRejection> {
        let mut inner = self.inner.lock();
        let room = inner.rooms.get_mut(room_id).ok_or(JoinRejection::NotFound)?;
        let is_host = room.meta.is_host(&participant.user_id);
        if room.meta.locked && !is_host {
            return Err(JoinRejection::Locked);
        }

        let user_id = participant.user_id.clone();
        let rejoined = match room.position(&user_id) {
            Some(idx) => {
                // A rejoin refreshes the profile but keeps a host-imposed mute.
                let muted = room.participants[idx].muted;
                room.participants[idx] = ParticipantView { muted, ..participant };
                true
            }
            None if room.participants.len() >= self.max_participants => {
                return Err(JoinRejection::Full);
            }
            None => {
                room.participants.push(participant);
                false
            }
        };

        let info = room.meta.info();
        let participants = room.participants.clone();
        let others = inner.routes_for(
            participants
                .iter()
                .map(|p| p.user_id.as_str())
                .filter(|id| *id != user_id),
        );
        Ok(Joined {
            room: info,
            participants,
            others,
            rejoined,
        })
    }

    /// Removes the participant. Returns the remaining participants' current
    /// connections, or `None` if the user was not in the room.
    pub fn remove_participant(&self, room_id: &str, user_id: &str) -> Option<Vec<ConnId>> {
        let mut inner = self.inner.lock();
        let room = inner.rooms.get_mut(room_id)?;
        let idx = room.position(user_id)?;
        room.participants.remove(idx);
        let remaining: Vec<String> = room.participants.iter().map(|p| p.user_id.clone()).collect();
        Some(inner.routes_for(remaining.iter().map(String::as_str)))
    }

    pub fn is_participant(&self, room_id: &str, user_id: &str) -> bool {
        self.inner
            .lock()
            .rooms
            .get(room_id)
            .is_some_and(|room| room.position(user_id).is_some())
    }

    /// Current connections of every participant, optionally skipping one user.
    pub fn room_conns(&self, room_id: &str, except_user: Option<&str>) -> Vec<ConnId> {
        let inner = self.inner.lock();
        let Some(room) = inner.rooms.get(room_id) else {
            return Vec::new();
        };
        inner.routes_for(
            room.participants
                .iter()
                .map(|p| p.user_id.as_str())
                .filter(|id| Some(*id) != except_user),
        )
    }

    pub fn rooms_of(&self, user_id: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let mut rooms: Vec<(&String, u64)> = inner
            .rooms
            .iter()
            .filter(|(_, room)| room.position(user_id).is_some())
            .map(|(id, room)| (id, room.seq))
            .collect();
        rooms.sort_by_key(|(_, seq)| *seq);
        rooms.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn set_locked(&self, room_id: &str, locked: bool) -> bool {
        match self.inner.lock().rooms.get_mut(room_id) {
            Some(room) => {
                room.meta.locked = locked;
                true
            }
            None => false,
        }
    }

    pub fn set_muted(&self, room_id: &str, user_id: &str, muted: bool) -> bool {
        let mut inner = self.inner.lock();
        let Some(room) = inner.rooms.get_mut(room_id) else {
            return false;
        };
        match room.participants.iter_mut().find(|p| p.user_id == user_id) {
            Some(p) => {
                p.muted = muted;
                true
            }
            None => false,
        }
    }

    // ── Direct calls ──────────────────────────────────────────────────────

    /// Records a ringing call. Returns false, recording nothing, when either
    /// party is already in a call.
    pub fn open_call(&self, call_id: &str, caller_id: &str, callee_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let busy = inner
            .calls
            .values()
            .any(|call| call.state.is_active() && (call.involves(caller_id) || call.involves(callee_id)));
        if busy {
            return false;
        }
        inner.calls.insert(
            call_id.to_string(),
            CallEntry {
                call_id: call_id.to_string(),
                caller_id: caller_id.to_string(),
                callee_id: callee_id.to_string(),
                state: CallState::Ringing,
            },
        );
        true
    }

    pub fn call(&self, call_id: &str) -> Option<CallEntry> {
        self.inner.lock().calls.get(call_id).cloned()
    }

    /// Move a call from `from` to `to`; `None` if it is not in `from`.
    pub fn transition_call(&self, call_id: &str, from: CallState, to: CallState) -> Option<CallEntry> {
        let mut inner = self.inner.lock();
        let call = inner.calls.get_mut(call_id)?;
        if call.state != from {
            return None;
        }
        call.state = to;
        Some(call.clone())
    }

    pub fn remove_call(&self, call_id: &str) -> Option<CallEntry> {
        self.inner.lock().calls.remove(call_id)
    }

    pub fn calls_of(&self, user_id: &str) -> Vec<CallEntry> {
        self.inner
            .lock()
            .calls
            .values()
            .filter(|call| call.involves(user_id))
            .cloned()
            .collect()
    }

    pub fn has_active_call(&self, user_id: &str) -> bool {
        self.inner
            .lock()
            .calls
            .values()
            .any(|call| call.state.is_active() && call.involves(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> ConnectedUser {
        ConnectedUser {
            user_id: id.to_string(),
            display_name: id.to_uppercase(),
            avatar_url: None,
            status: PresenceStatus::Online,
        }
    }

    fn room(id: &str, host: &str, visibility: Visibility) -> RoomMeta {
        RoomMeta {
            room_id: id.to_string(),
            name: format!("room {id}"),
            visibility,
            locked: false,
            host_id: host.to_string(),
            password_hash: None,
        }
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let registry = Registry::new(6);
        registry.create_room(room("r", "u0", Visibility::Public));
        for i in 0..6 {
            assert!(registry.add_participant("r", user(&format!("u{i}")).participant()));
        }
        assert!(!registry.add_participant("r", user("u6").participant()));
        assert_eq!(
            registry.try_join("r", user("u7").participant()).unwrap_err(),
            JoinRejection::Full
        );
        let (_, participants) = registry.room_snapshot("r").unwrap();
        assert_eq!(participants.len(), 6);
        assert_eq!(registry.list_public_rooms()[0].count, 6);
    }

    #[test]
    fn missing_room_rejects_add() {
        let registry = Registry::new(6);
        assert!(!registry.add_participant("nope", user("a").participant()));
        assert_eq!(
            registry.try_join("nope", user("a").participant()).unwrap_err(),
            JoinRejection::NotFound
        );
    }

    #[test]
    fn rejoin_does_not_count_twice() {
        let registry = Registry::new(2);
        registry.create_room(room("r", "a", Visibility::Public));
        registry.try_join("r", user("a").participant()).unwrap();
        registry.try_join("r", user("b").participant()).unwrap();

        let again = registry.try_join("r", user("b").participant()).unwrap();
        assert!(again.rejoined);
        assert_eq!(again.participants.len(), 2);
    }

    #[test]
    fn lock_blocks_everyone_but_the_host() {
        let registry = Registry::new(6);
        registry.create_room(room("r", "host", Visibility::Private));
        registry.set_locked("r", true);

        assert_eq!(
            registry.try_join("r", user("guest").participant()).unwrap_err(),
            JoinRejection::Locked
        );
        assert!(registry.try_join("r", user("host").participant()).is_ok());
    }

    #[test]
    fn rapid_rebinds_leave_one_route() {
        let registry = Registry::new(6);
        let mut superseded = Vec::new();
        for conn in 1..=20 {
            if let Some(prev) = registry.bind_connection(conn, user("a")) {
                superseded.push(prev);
            }
        }
        assert_eq!(superseded, (1..20).collect::<Vec<_>>());
        assert_eq!(registry.route_of("a"), Some(20));
        assert_eq!(registry.list_online().len(), 1);

        // An old connection closing does not disturb the live route.
        let old = registry.unbind_connection(3).unwrap();
        assert!(!old.was_current);
        assert_eq!(registry.route_of("a"), Some(20));

        let current = registry.unbind_connection(20).unwrap();
        assert!(current.was_current);
        assert_eq!(registry.route_of("a"), None);
        assert!(registry.list_online().is_empty());
    }

    #[test]
    fn only_public_rooms_are_listed() {
        let registry = Registry::new(6);
        registry.create_room(room("pub", "a", Visibility::Public));
        registry.create_room(room("priv", "a", Visibility::Private));
        assert!(!registry.create_room(room("pub", "b", Visibility::Public)));

        let listed = registry.list_public_rooms();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].room_id, "pub");
    }

    #[test]
    fn hydrate_does_not_clobber_live_state() {
        let registry = Registry::new(6);
        registry.create_room(room("r", "a", Visibility::Public));
        registry.set_locked("r", true);
        registry.hydrate_room(room("r", "a", Visibility::Public));
        assert!(registry.room_meta("r").unwrap().locked);
    }

    #[test]
    fn removal_reports_remaining_connections() {
        let registry = Registry::new(6);
        registry.bind_connection(1, user("a"));
        registry.bind_connection(2, user("b"));
        registry.create_room(room("r", "a", Visibility::Public));
        registry.try_join("r", user("a").participant()).unwrap();
        let joined = registry.try_join("r", user("b").participant()).unwrap();
        assert_eq!(joined.others, vec![1]);

        assert_eq!(registry.remove_participant("r", "a"), Some(vec![2]));
        assert_eq!(registry.remove_participant("r", "a"), None);
        assert!(registry.rooms_of("a").is_empty());
        assert_eq!(registry.rooms_of("b"), vec!["r".to_string()]);
    }

    #[test]
    fn second_call_to_busy_user_is_not_recorded() {
        let registry = Registry::new(6);
        assert!(registry.open_call("c1", "a", "b"));
        assert!(!registry.open_call("c2", "c", "b"));
        assert!(registry.call("c2").is_none());
        assert!(registry.has_active_call("b"));

        let connected = registry
            .transition_call("c1", CallState::Ringing, CallState::Connected)
            .unwrap();
        assert_eq!(connected.state, CallState::Connected);
        assert!(registry
            .transition_call("c1", CallState::Ringing, CallState::Connected)
            .is_none());

        registry.remove_call("c1");
        assert!(!registry.has_active_call("b"));
        assert!(registry.open_call("c3", "c", "b"));
    }
}
