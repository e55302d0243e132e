//! Input validation for Twitch-shaped data.
//!
//! The patterns mirror what the platform itself enforces: login names are
//! short lowercase handles, language codes are ISO 639-1, and OAuth tokens
//! are plain alphanumerics.

use regex::Regex;
use std::sync::LazyLock;

pub const LOGIN_NAME_PATTERN: &str = r"^[a-z0-9_]{1,25}$";
pub const LANGUAGE_CODE_PATTERN: &str = r"^[a-z]{2}$";
pub const TOKEN_PATTERN: &str = r"^[a-zA-Z0-9]+$";

static LOGIN_NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(LOGIN_NAME_PATTERN).expect("login name pattern is valid")
});
static LANGUAGE_CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(LANGUAGE_CODE_PATTERN).expect("language code pattern is valid")
});
static TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TOKEN_PATTERN).expect("token pattern is valid"));

/// Validation error
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid {field}: {message}")]
    Field { field: String, message: String },
}

impl ValidationError {
    fn field(field: &str, message: &str) -> Self {
        Self::Field {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Check a viewer/streamer login name against the platform's handle rules.
pub fn validate_login_name(login: &str) -> ValidationResult<()> {
    if LOGIN_NAME_REGEX.is_match(login) {
        Ok(())
    } else {
        Err(ValidationError::field(
            "login_name",
            "must be 1-25 lowercase letters, digits, or underscores",
        ))
    }
}

/// Fast form of [`validate_login_name`] for filtering bulk name lists.
pub fn is_valid_login_name(login: &str) -> bool {
    LOGIN_NAME_REGEX.is_match(login)
}

/// Check an ISO 639-1 language code.
pub fn validate_language_code(language: &str) -> ValidationResult<()> {
    if LANGUAGE_CODE_REGEX.is_match(language) {
        Ok(())
    } else {
        Err(ValidationError::field(
            "language",
            "must be a two-letter lowercase ISO 639-1 code",
        ))
    }
}

/// Check an OAuth access or refresh token for the allowed character set.
pub fn validate_token(token: &str) -> ValidationResult<()> {
    if TOKEN_REGEX.is_match(token) {
        Ok(())
    } else {
        Err(ValidationError::field(
            "token",
            "must be a non-empty alphanumeric string",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_name_validation() {
        assert!(validate_login_name("alice").is_ok());
        assert!(validate_login_name("bob_123").is_ok());
        assert!(validate_login_name("a").is_ok());

        assert!(validate_login_name("").is_err());
        assert!(validate_login_name("UpperCase").is_err());
        assert!(validate_login_name("has-hyphen").is_err());
        assert!(validate_login_name("waaaaaaaaaaaaaaaaytoolongname").is_err());
    }

    #[test]
    fn test_language_code_validation() {
        assert!(validate_language_code("en").is_ok());
        assert!(validate_language_code("es").is_ok());

        assert!(validate_language_code("EN").is_err());
        assert!(validate_language_code("eng").is_err());
        assert!(validate_language_code("").is_err());
    }

    #[test]
    fn test_token_validation() {
        assert!(validate_token("abcDEF123").is_ok());

        assert!(validate_token("").is_err());
        assert!(validate_token("has space").is_err());
        assert!(validate_token("has-dash").is_err());
    }
}
