use serde::{Deserialize, Serialize};

/// Stable error codes surfaced to clients in `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AuthFailed,
    RoomNotFound,
    RoomFull,
    RoomLocked,
    RoomPassword,
    UserOffline,
    NicknameTaken,
    RateLimitChat,
    RateLimitReaction,
    RateLimitAction,
}

impl ErrorCode {
    pub fn default_message(self) -> &'static str {
        match self {
            Self::AuthFailed => "Invalid token",
            Self::RoomNotFound => "Room not found",
            Self::RoomFull => "Room is at capacity",
            Self::RoomLocked => "Room is locked",
            Self::RoomPassword => "Invalid room password",
            Self::UserOffline => "User offline",
            Self::NicknameTaken => "Nickname unavailable",
            Self::RateLimitChat => "You are sending messages too quickly",
            Self::RateLimitReaction => "You are reacting too quickly",
            Self::RateLimitAction => "Too many actions, slow down",
        }
    }
}
