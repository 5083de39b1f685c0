//! Gateway wire protocol. Every frame is `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::call::{CallState, CallerInfo, EndReason};
use crate::error::ErrorCode;
use crate::message::MessageView;
use crate::presence::{PresenceStatus, PresenceUser};
use crate::room::{HostAction, ParticipantView, RoomInfo, RoomSummary, Visibility};
use crate::social::{
    DmThreadView, FriendRequestAction, FriendRequestView, NotificationView, UserCard,
};

/// Payload for events that carry no fields. Serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

// ── Client -> server ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "hello")]
    Hello(Hello),
    #[serde(rename = "presence.set")]
    PresenceSet(PresenceSet),
    #[serde(rename = "room.create")]
    RoomCreate(RoomCreate),
    #[serde(rename = "room.join")]
    RoomJoin(RoomJoin),
    #[serde(rename = "room.leave")]
    RoomLeave(RoomRef),
    #[serde(rename = "room.host.mute")]
    RoomHostMute(HostMute),
    #[serde(rename = "room.host.kick")]
    RoomHostKick(HostKick),
    #[serde(rename = "room.host.lock")]
    RoomHostLock(HostLock),
    #[serde(rename = "call.invite")]
    CallInvite(CallInvite),
    #[serde(rename = "call.accept")]
    CallAccept(CallRef),
    #[serde(rename = "call.decline")]
    CallDecline(CallRef),
    #[serde(rename = "call.end")]
    CallEnd(CallRef),
    #[serde(rename = "signal.offer")]
    SignalOffer(SdpSignal),
    #[serde(rename = "signal.answer")]
    SignalAnswer(SdpSignal),
    #[serde(rename = "signal.ice")]
    SignalIce(IceSignal),
    #[serde(rename = "room.chat.send")]
    RoomChatSend(RoomChatSend),
    #[serde(rename = "room.chat.history")]
    RoomChatHistory(RoomHistoryQuery),
    #[serde(rename = "dm.thread.open")]
    DmThreadOpen(DmThreadOpen),
    #[serde(rename = "dm.thread.list")]
    DmThreadList(Empty),
    #[serde(rename = "dm.send")]
    DmSend(DmSend),
    #[serde(rename = "dm.history")]
    DmHistory(DmHistoryQuery),
    #[serde(rename = "dm.typing")]
    DmTyping(DmTyping),
    #[serde(rename = "msg.edit")]
    MsgEdit(MsgEdit),
    #[serde(rename = "msg.delete")]
    MsgDelete(MsgRef),
    #[serde(rename = "msg.react")]
    MsgReact(MsgReact),
    #[serde(rename = "user.nickname.set")]
    UserNicknameSet(NicknameSet),
    #[serde(rename = "user.search")]
    UserSearch(UserSearch),
    #[serde(rename = "friends.request.send")]
    FriendsRequestSend(FriendRequestSend),
    #[serde(rename = "friends.request.respond")]
    FriendsRequestRespond(FriendRequestRespond),
    #[serde(rename = "friends.list")]
    FriendsList(Empty),
    #[serde(rename = "notifications.read")]
    NotificationsRead(NotificationsRead),
}

impl ClientEvent {
    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::PresenceSet(_) => "presence.set",
            Self::RoomCreate(_) => "room.create",
            Self::RoomJoin(_) => "room.join",
            Self::RoomLeave(_) => "room.leave",
            Self::RoomHostMute(_) => "room.host.mute",
            Self::RoomHostKick(_) => "room.host.kick",
            Self::RoomHostLock(_) => "room.host.lock",
            Self::CallInvite(_) => "call.invite",
            Self::CallAccept(_) => "call.accept",
            Self::CallDecline(_) => "call.decline",
            Self::CallEnd(_) => "call.end",
            Self::SignalOffer(_) => "signal.offer",
            Self::SignalAnswer(_) => "signal.answer",
            Self::SignalIce(_) => "signal.ice",
            Self::RoomChatSend(_) => "room.chat.send",
            Self::RoomChatHistory(_) => "room.chat.history",
            Self::DmThreadOpen(_) => "dm.thread.open",
            Self::DmThreadList(_) => "dm.thread.list",
            Self::DmSend(_) => "dm.send",
            Self::DmHistory(_) => "dm.history",
            Self::DmTyping(_) => "dm.typing",
            Self::MsgEdit(_) => "msg.edit",
            Self::MsgDelete(_) => "msg.delete",
            Self::MsgReact(_) => "msg.react",
            Self::UserNicknameSet(_) => "user.nickname.set",
            Self::UserSearch(_) => "user.search",
            Self::FriendsRequestSend(_) => "friends.request.send",
            Self::FriendsRequestRespond(_) => "friends.request.respond",
            Self::FriendsList(_) => "friends.list",
            Self::NotificationsRead(_) => "notifications.read",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSet {
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCreate {
    pub name: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoin {
    pub room_id: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMute {
    pub room_id: String,
    pub target_user_id: String,
    pub muted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostKick {
    pub room_id: String,
    pub target_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostLock {
    pub room_id: String,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInvite {
    pub to_user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRef {
    pub call_id: String,
}

/// Offer or answer envelope. Exactly one of `room_id` / `call_id` scopes it.
/// Inbound, `peer_id` names the target; outbound, it names the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpSignal {
    pub peer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceSignal {
    pub peer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub candidate: String,
}

/// The room or call a signal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalScope<'a> {
    Room(&'a str),
    Call(&'a str),
}

fn scope_of<'a>(room_id: &'a Option<String>, call_id: &'a Option<String>) -> Option<SignalScope<'a>> {
    match (room_id.as_deref(), call_id.as_deref()) {
        (Some(room), None) if !room.is_empty() => Some(SignalScope::Room(room)),
        (None, Some(call)) if !call.is_empty() => Some(SignalScope::Call(call)),
        _ => None,
    }
}

impl SdpSignal {
    /// `None` unless exactly one non-empty scope id is present.
    pub fn scope(&self) -> Option<SignalScope<'_>> {
        scope_of(&self.room_id, &self.call_id)
    }
}

impl IceSignal {
    pub fn scope(&self) -> Option<SignalScope<'_>> {
        scope_of(&self.room_id, &self.call_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomChatSend {
    pub room_id: String,
    pub body: String,
    pub client_msg_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHistoryQuery {
    pub room_id: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmThreadOpen {
    #[serde(default)]
    pub with_user_id: Option<String>,
    #[serde(default)]
    pub with_nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmSend {
    pub thread_id: String,
    pub body: String,
    pub client_msg_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmHistoryQuery {
    pub thread_id: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmTyping {
    pub thread_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgEdit {
    pub message_id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgRef {
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgReact {
    pub message_id: String,
    pub emoji: String,
    pub add: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicknameSet {
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearch {
    pub query: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestSend {
    pub to_nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestRespond {
    pub request_id: String,
    pub action: FriendRequestAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsRead {
    pub ids: Vec<String>,
}

// ── Server -> client ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "auth.ok")]
    AuthOk(AuthOk),
    #[serde(rename = "presence.list")]
    PresenceList(PresenceList),
    #[serde(rename = "room.list")]
    RoomList(RoomList),
    #[serde(rename = "room.created")]
    RoomCreated(RoomCreated),
    #[serde(rename = "room.joined")]
    RoomJoined(RoomJoined),
    #[serde(rename = "room.participant.joined")]
    RoomParticipantJoined(ParticipantJoined),
    #[serde(rename = "room.participant.left")]
    RoomParticipantLeft(ParticipantLeft),
    #[serde(rename = "room.host.action")]
    RoomHostAction(HostActionNotice),
    #[serde(rename = "call.incoming")]
    CallIncoming(CallIncoming),
    #[serde(rename = "call.state")]
    CallState(CallStateUpdate),
    #[serde(rename = "signal.offer")]
    SignalOffer(SdpSignal),
    #[serde(rename = "signal.answer")]
    SignalAnswer(SdpSignal),
    #[serde(rename = "signal.ice")]
    SignalIce(IceSignal),
    #[serde(rename = "room.chat.message")]
    RoomChatMessage(RoomChatMessage),
    #[serde(rename = "room.chat.ack")]
    RoomChatAck(ChatAck),
    #[serde(rename = "room.chat.history")]
    RoomChatHistory(RoomHistoryPage),
    #[serde(rename = "dm.thread.list")]
    DmThreadList(DmThreadList),
    #[serde(rename = "dm.message.new")]
    DmMessageNew(DmMessageNew),
    #[serde(rename = "dm.send.ack")]
    DmSendAck(ChatAck),
    #[serde(rename = "dm.history")]
    DmHistory(DmHistoryPage),
    #[serde(rename = "dm.typing")]
    DmTyping(DmTypingNotice),
    #[serde(rename = "msg.updated")]
    MsgUpdated(MsgUpdated),
    #[serde(rename = "msg.reaction.update")]
    MsgReactionUpdate(ReactionUpdate),
    #[serde(rename = "notification.new")]
    NotificationNew(NotificationNew),
    #[serde(rename = "friends.requests")]
    FriendsRequests(FriendRequests),
    #[serde(rename = "friends.list")]
    FriendsList(FriendList),
    #[serde(rename = "user.nickname.ok")]
    UserNicknameOk(NicknameSet),
    #[serde(rename = "user.search.result")]
    UserSearchResult(UserSearchResult),
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(code: ErrorCode) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: code.default_message().to_string(),
        })
    }

    pub fn call_state(call_id: &str, state: CallState, reason: Option<EndReason>) -> Self {
        Self::CallState(CallStateUpdate {
            call_id: call_id.to_string(),
            state,
            reason,
        })
    }
}

/// The caller's own profile, sent once after identification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfProfile {
    pub id: String,
    pub name: String,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOk {
    pub user: SelfProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceList {
    pub users_online: Vec<PresenceUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomList {
    pub rooms: Vec<RoomSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreated {
    pub room: RoomInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomJoined {
    pub room: RoomInfo,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoined {
    pub room_id: String,
    pub user: ParticipantView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLeft {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostActionNotice {
    pub room_id: String,
    pub action: HostAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIncoming {
    pub call_id: String,
    pub from_user: CallerInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStateUpdate {
    pub call_id: String,
    pub state: CallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<EndReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomChatMessage {
    pub room_id: String,
    pub message: MessageView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAck {
    pub client_msg_id: String,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHistoryPage {
    pub room_id: String,
    pub messages: Vec<MessageView>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DmThreadList {
    pub threads: Vec<DmThreadView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmMessageNew {
    pub thread_id: String,
    pub message: MessageView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmHistoryPage {
    pub thread_id: String,
    pub messages: Vec<MessageView>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmTypingNotice {
    pub thread_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsgUpdated {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub message: MessageView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionUpdate {
    pub message_id: String,
    pub reactions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationNew {
    pub notification: NotificationView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequests {
    pub incoming: Vec<FriendRequestView>,
    pub outgoing: Vec<FriendRequestView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendList {
    pub friends: Vec<UserCard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSearchResult {
    pub users: Vec<UserCard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}
