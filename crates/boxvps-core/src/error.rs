//! # Error Types
//!
//! Domain-specific error types for boxvps-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  boxvps-core errors (this file)                                        │
//! │  ├── ValidationError  - Input validation failures (no side effects)    │
//! │  └── RenderError      - Artifact could not be generated                │
//! │                                                                         │
//! │  boxvps-store errors (separate crate)                                  │
//! │  └── StoreError       - Durable write / load failures                  │
//! │                                                                         │
//! │  boxvps-engine errors                                                  │
//! │  ├── EngineError      - What callers of an operation see               │
//! │  └── ApplyError       - Backend write / reload failures                │
//! │                                                                         │
//! │  Flow: ValidationError ──────────────► EngineError::Validation         │
//! │        RenderError ──────────────────► EngineError::Generation         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::BackendKind;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur before anything is written. An operation that fails
/// validation has no side effects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: u64, max: u64 },

    /// Invalid format (e.g., bad characters in a username).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., username collision on add).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Value does not match what the record says.
    ///
    /// ## When This Occurs
    /// - `ban_user(alice, "ssh")` when alice is an Xray user
    /// - `change_identity_token` on a user whose backend has no tokens
    #[error("{field} mismatch: expected {expected}, got {actual}")]
    Mismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

impl ValidationError {
    /// Creates a Required error for a field.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Creates an InvalidFormat error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Render Error
// =============================================================================

/// Artifact generation errors.
///
/// A render error means the user map or the topology is inconsistent. It is
/// surfaced to the caller and never retried automatically, because rendering
/// the same input again would fail the same way.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An identity-bearing backend found a user without an identity token.
    ///
    /// ## When This Occurs
    /// - users.json was edited by hand and a `identity_token` was removed
    /// - A record was created by an older tool that did not assign tokens
    #[error("User '{username}' has no identity token required by {backend}")]
    MissingIdentityToken {
        username: String,
        backend: BackendKind,
    },

    /// The structured document could not be serialized.
    #[error("Failed to serialize {backend} artifact: {reason}")]
    Serialization { backend: BackendKind, reason: String },

    /// The topology cannot produce a valid artifact.
    ///
    /// ## When This Occurs
    /// - Argo is enabled without a tunnel or a domain
    #[error("Invalid topology for {backend}: {reason}")]
    InvalidTopology { backend: BackendKind, reason: String },
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("username");
        assert_eq!(err.to_string(), "username is required");

        let err = ValidationError::Duplicate {
            field: "username".to_string(),
            value: "alice".to_string(),
        };
        assert_eq!(err.to_string(), "username 'alice' already exists");
    }

    #[test]
    fn test_render_error_names_user_and_backend() {
        let err = RenderError::MissingIdentityToken {
            username: "alice".to_string(),
            backend: BackendKind::Xray,
        };
        assert_eq!(
            err.to_string(),
            "User 'alice' has no identity token required by xray"
        );
    }
}
