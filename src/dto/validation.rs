//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest nickname accepted, in characters.
pub const MAX_NICKNAME_CHARS: usize = 32;
/// Longest chat line accepted, in characters.
pub const MAX_CHAT_CHARS: usize = 500;

/// Nicknames may be blank (a default is generated) but otherwise must be
/// printable and at most [`MAX_NICKNAME_CHARS`] long.
pub fn validate_nickname(nickname: &str) -> Result<(), ValidationError> {
    let trimmed = nickname.trim();
    let count = trimmed.chars().count();
    if count > MAX_NICKNAME_CHARS {
        let mut err = ValidationError::new("nickname_length");
        err.message = Some(
            format!("Nickname must be at most {MAX_NICKNAME_CHARS} characters (got {count})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("nickname_format");
        err.message = Some("Nickname must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Chat lines must hold between 1 and [`MAX_CHAT_CHARS`] characters once trimmed.
pub fn validate_chat_message(message: &str) -> Result<(), ValidationError> {
    let count = message.trim().chars().count();
    if count == 0 || count > MAX_CHAT_CHARS {
        let mut err = ValidationError::new("chat_length");
        err.message = Some(
            format!("Chat message must hold 1 to {MAX_CHAT_CHARS} characters (got {count})")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

/// Elapsed answer time must be a finite, non-negative number of seconds.
pub fn validate_time_spent(seconds: f64) -> Result<(), ValidationError> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("time_spent");
        err.message = Some("Time spent must be a finite, non-negative number of seconds".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_nickname() {
        assert!(validate_nickname("Alice").is_ok());
        assert!(validate_nickname("").is_ok());
        assert!(validate_nickname(&"é".repeat(32)).is_ok());
        assert!(validate_nickname(&"x".repeat(33)).is_err());
        assert!(validate_nickname("bad\u{0007}name").is_err());
    }

    #[test]
    fn test_validate_chat_message() {
        assert!(validate_chat_message("hello").is_ok());
        assert!(validate_chat_message("   ").is_err());
        assert!(validate_chat_message(&"a".repeat(500)).is_ok());
        assert!(validate_chat_message(&"a".repeat(501)).is_err());
    }

    #[test]
    fn test_validate_time_spent() {
        assert!(validate_time_spent(0.0).is_ok());
        assert!(validate_time_spent(3.5).is_ok());
        assert!(validate_time_spent(-1.0).is_err());
        assert!(validate_time_spent(f64::NAN).is_err());
        assert!(validate_time_spent(f64::INFINITY).is_err());
    }
}
