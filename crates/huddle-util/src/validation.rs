use thiserror::Error;

pub const NICKNAME_MIN: usize = 3;
pub const NICKNAME_MAX: usize = 24;
pub const ROOM_NAME_MAX: usize = 80;
pub const ROOM_PASSWORD_MAX: usize = 64;
pub const MESSAGE_MAX: usize = 2000;
pub const EMOJI_MAX: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("invalid characters")]
    InvalidCharacters,
}

fn check_length(value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let got = value.chars().count();
    if got < min {
        return Err(ValidationError::TooShort { min, got });
    }
    if got > max {
        return Err(ValidationError::TooLong { max, got });
    }
    Ok(())
}

/// Characters allowed in nicknames and in `@mention` tokens.
pub fn is_nickname_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Validates the trimmed nickname.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    check_length(trimmed, NICKNAME_MIN, NICKNAME_MAX)?;
    if !trimmed.chars().all(is_nickname_char) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

pub fn validate_room_name(name: &str) -> Result<(), ValidationError> {
    check_length(name, 1, ROOM_NAME_MAX)
}

pub fn validate_room_password(password: &str) -> Result<(), ValidationError> {
    check_length(password, 1, ROOM_PASSWORD_MAX)
}

/// Applies to the sanitized body.
pub fn validate_message_body(body: &str) -> Result<(), ValidationError> {
    check_length(body, 1, MESSAGE_MAX)
}

pub fn validate_emoji(emoji: &str) -> Result<(), ValidationError> {
    check_length(emoji, 1, EMOJI_MAX)
}
