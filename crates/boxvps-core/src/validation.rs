//! # Validation Module
//!
//! Input validation for administrative operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front-end (CLI, bot, HTTP)                                   │
//! │  └── Argument parsing, prompts                                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine VALIDATE step                                         │
//! │  ├── THIS MODULE: format and range rules                               │
//! │  └── Existence / collision checks against the user map                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: OS tools                                                     │
//! │  └── useradd / chpasswd reject what slipped through                    │
//! │                                                                         │
//! │  Nothing is written before layer 2 passes.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_CREDENTIAL_LEN, MAX_QUOTA_GB, MAX_USERNAME_LEN, MIN_CREDENTIAL_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a username.
///
/// ## Rules
/// - 1 to 32 characters
/// - First character is an ASCII letter or `_`
/// - Remaining characters are ASCII alphanumerics, `_`, `-` or `.`
///
/// Usernames become Linux login names for SSH users, so the rules follow
/// what `useradd` accepts.
///
/// ## Example
/// ```rust
/// use boxvps_core::validation::validate_username;
///
/// assert!(validate_username("alice").is_ok());
/// assert!(validate_username("9lives").is_err());
/// assert!(validate_username("").is_err());
/// ```
pub fn validate_username(username: &str) -> ValidationResult<()> {
    if username.is_empty() {
        return Err(ValidationError::required("username"));
    }

    if username.len() > MAX_USERNAME_LEN {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: MAX_USERNAME_LEN,
        });
    }

    let mut chars = username.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok {
        return Err(ValidationError::invalid_format(
            "username",
            "must start with a letter or underscore",
        ));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
        return Err(ValidationError::invalid_format(
            "username",
            "must contain only letters, numbers, '_', '-' and '.'",
        ));
    }

    Ok(())
}

/// Validates a plaintext credential before it is hashed.
///
/// ## Rules
/// - 4 to 128 characters
/// - No `:` (chpasswd reads `user:password` lines)
/// - No control characters
pub fn validate_credential(credential: &str) -> ValidationResult<()> {
    if credential.is_empty() {
        return Err(ValidationError::required("credential"));
    }

    let len = credential.chars().count();
    if len < MIN_CREDENTIAL_LEN {
        return Err(ValidationError::TooShort {
            field: "credential".to_string(),
            min: MIN_CREDENTIAL_LEN,
        });
    }
    if len > MAX_CREDENTIAL_LEN {
        return Err(ValidationError::TooLong {
            field: "credential".to_string(),
            max: MAX_CREDENTIAL_LEN,
        });
    }

    if credential.contains(':') || credential.chars().any(char::is_control) {
        return Err(ValidationError::invalid_format(
            "credential",
            "must not contain ':' or control characters",
        ));
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quota in GB. `None` (unlimited) is always valid.
///
/// ## Example
/// ```rust
/// use boxvps_core::validation::validate_quota_gb;
///
/// assert!(validate_quota_gb(None).is_ok());
/// assert!(validate_quota_gb(Some(5)).is_ok());
/// assert!(validate_quota_gb(Some(0)).is_err());
/// ```
pub fn validate_quota_gb(quota_gb: Option<u64>) -> ValidationResult<()> {
    match quota_gb {
        Some(q) if !(1..=MAX_QUOTA_GB).contains(&q) => Err(ValidationError::OutOfRange {
            field: "quota_gb".to_string(),
            min: 1,
            max: MAX_QUOTA_GB,
        }),
        _ => Ok(()),
    }
}

/// Validates a listening port. Port 0 is rejected.
pub fn validate_port(field: &str, port: u16) -> ValidationResult<()> {
    if port == 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: u16::MAX as u64,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("_svc").is_ok());
        assert!(validate_username("bob.smith-2").is_ok());
        assert!(validate_username(&"a".repeat(32)).is_ok());

        assert!(matches!(
            validate_username(""),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_username(&"a".repeat(33)),
            Err(ValidationError::TooLong { max: 32, .. })
        ));
        assert!(validate_username("-dash").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("root;rm").is_err());
        assert!(validate_username("ünï").is_err());
    }

    #[test]
    fn test_validate_credential() {
        assert!(validate_credential("s3cret").is_ok());
        assert!(matches!(
            validate_credential("abc"),
            Err(ValidationError::TooShort { min: 4, .. })
        ));
        assert!(validate_credential("pass:word").is_err());
        assert!(validate_credential("pass\nword").is_err());
        assert!(validate_credential(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_quota() {
        assert!(validate_quota_gb(None).is_ok());
        assert!(validate_quota_gb(Some(1)).is_ok());
        assert!(validate_quota_gb(Some(0)).is_err());
        assert!(validate_quota_gb(Some(MAX_QUOTA_GB + 1)).is_err());
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port("port", 443).is_ok());
        assert!(validate_port("port", 0).is_err());
    }
}
