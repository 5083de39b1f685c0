use huddle_models::error::ErrorCode;
use huddle_util::validation::ValidationError;
use thiserror::Error;

use crate::rate_limit::RateClass;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("bad request: {0}")]
    BadRequest(&'static str),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("authentication failed")]
    AuthFailed,
    #[error("room not found")]
    RoomNotFound,
    #[error("room is full")]
    RoomFull,
    #[error("room is locked")]
    RoomLocked,
    #[error("room password rejected")]
    RoomPassword,
    #[error("user offline")]
    UserOffline,
    #[error("nickname taken")]
    NicknameTaken,
    #[error("rate limited ({0:?})")]
    RateLimited(RateClass),
    #[error("database error: {0}")]
    Database(#[from] huddle_db::DbError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Wire code for errors the client is told about. `None` means the
    /// request is dropped without a reply.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::AuthFailed => Some(ErrorCode::AuthFailed),
            Self::RoomNotFound => Some(ErrorCode::RoomNotFound),
            Self::RoomFull => Some(ErrorCode::RoomFull),
            Self::RoomLocked => Some(ErrorCode::RoomLocked),
            Self::RoomPassword => Some(ErrorCode::RoomPassword),
            Self::UserOffline => Some(ErrorCode::UserOffline),
            Self::NicknameTaken => Some(ErrorCode::NicknameTaken),
            Self::RateLimited(class) => class.error_code(),
            Self::Validation(_)
            | Self::BadRequest(_)
            | Self::Forbidden
            | Self::NotFound
            | Self::Database(_)
            | Self::Internal(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_errors_have_no_code() {
        assert_eq!(CoreError::Forbidden.code(), None);
        assert_eq!(CoreError::RateLimited(RateClass::Typing).code(), None);
        assert_eq!(CoreError::RateLimited(RateClass::General).code(), None);
        assert_eq!(
            CoreError::RateLimited(RateClass::Chat).code(),
            Some(ErrorCode::RateLimitChat)
        );
        assert_eq!(CoreError::RoomFull.code(), Some(ErrorCode::RoomFull));
    }
}
