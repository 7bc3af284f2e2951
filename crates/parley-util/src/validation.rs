use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_ROOM_USERNAME_CHARS: usize = 50;
pub const MAX_FILE_NAME_CHARS: usize = 255;
pub const MAX_FILE_TYPE_CHARS: usize = 100;
pub const MAX_REASON_CHARS: usize = 500;

static ROOM_SLUG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("room slug pattern is valid"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("invalid characters")]
    InvalidCharacters,
    #[error("invalid format")]
    InvalidFormat,
}

/// Room slugs are ASCII letters, digits, `-` and `_` only.
pub fn validate_room_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.is_empty() {
        return Err(ValidationError::TooShort { min: 1, got: 0 });
    }
    if !ROOM_SLUG_REGEX.is_match(slug) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

pub fn validate_room_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 100 {
        return Err(ValidationError::TooLong { max: 100, got: len });
    }
    Ok(())
}

/// In-room display name. Any Unicode is allowed; only the trimmed length is
/// checked, counted in characters rather than bytes.
pub fn validate_room_username(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_ROOM_USERNAME_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_ROOM_USERNAME_CHARS,
            got: len,
        });
    }
    Ok(())
}

/// Registered account names are stricter than in-room names.
pub fn validate_account_username(name: &str) -> Result<(), ValidationError> {
    let len = name.len();
    if len < 2 {
        return Err(ValidationError::TooShort { min: 2, got: len });
    }
    if len > 32 {
        return Err(ValidationError::TooLong { max: 32, got: len });
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

pub fn validate_message_content(content: &str, max_chars: usize) -> Result<(), ValidationError> {
    let len = content.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > max_chars {
        return Err(ValidationError::TooLong {
            max: max_chars,
            got: len,
        });
    }
    Ok(())
}

pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_FILE_NAME_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_FILE_NAME_CHARS,
            got: len,
        });
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::InvalidCharacters);
    }
    Ok(())
}

pub fn validate_file_type(file_type: &str) -> Result<(), ValidationError> {
    let len = file_type.chars().count();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > MAX_FILE_TYPE_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_FILE_TYPE_CHARS,
            got: len,
        });
    }
    Ok(())
}

/// Optional free text attached to an approve/deny answer.
pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    let len = reason.chars().count();
    if len > MAX_REASON_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_REASON_CHARS,
            got: len,
        });
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.len();
    if len < 8 {
        return Err(ValidationError::TooShort { min: 8, got: len });
    }
    if len > 256 {
        return Err(ValidationError::TooLong { max: 256, got: len });
    }
    Ok(())
}
