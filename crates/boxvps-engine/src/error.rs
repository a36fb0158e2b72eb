//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  EngineError (operation returned Err, nothing applied)                 │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Caller input   │  │   Durable state │  │     Environment         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  StoreWrite     │  │  Config                 │ │
//! │  │  NotFound       │  │  Generation     │  │  Credential             │ │
//! │  │                 │  │                 │  │  Backup / Restore       │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ApplyError (operation returned Ok(Degraded), state already stored)   │
//! │  ┌─────────────────────────────┐  ┌──────────────────────────────────┐ │
//! │  │  Retryable                  │  │  Fatal until environment fixed   │ │
//! │  │  WriteFailed                │  │  ToolUnavailable                 │ │
//! │  │  PartialWrite               │  │  CredentialRequired              │ │
//! │  │  ReloadFailed               │  │                                  │ │
//! │  │  ReloadTimedOut             │  │                                  │ │
//! │  │  AccountCommandFailed       │  │                                  │ │
//! │  └─────────────────────────────┘  └──────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use boxvps_core::{BackendKind, RenderError, ValidationError};
use boxvps_store::StoreError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort an operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input. Nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The target user does not exist. Nothing was written.
    #[error("User not found: {username}")]
    NotFound { username: String },

    /// The durable write failed. Store unchanged, no backend contacted.
    #[error("State store write failed: {0}")]
    StoreWrite(#[from] StoreError),

    /// An artifact could not be generated.
    ///
    /// ## When This Occurs
    /// - An Xray user lost its identity token (hand-edited users.json)
    ///
    /// The store mutation has already landed; fix the record and reconcile.
    #[error("Artifact generation failed: {0}")]
    Generation(#[from] RenderError),

    /// Hashing or verifying a credential failed.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Configuration could not be loaded, saved or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Creating a backup archive failed, or the archive to restore is missing.
    #[error("Backup failed: {0}")]
    Backup(String),

    /// Extracting a backup archive failed.
    #[error("Restore failed: {0}")]
    Restore(String),
}

impl EngineError {
    pub fn not_found(username: impl Into<String>) -> Self {
        EngineError::NotFound {
            username: username.into(),
        }
    }

    /// True for errors caused by caller input rather than the host.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::NotFound { .. })
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, EngineError::Config(_))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(format!("TOML serialize error: {}", err))
    }
}

/// A backend that could not be brought in line with the stored state.
///
/// Carried inside `OperationOutcome::Degraded`; the stored record of intent
/// stands and the same operation (or `reconcile`) can be retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    /// Writing the artifact failed. The backend still runs its old config.
    #[error("{backend}: writing {path} failed: {reason}")]
    WriteFailed {
        backend: BackendKind,
        path: PathBuf,
        reason: String,
    },

    /// A later file of a multi-file artifact failed after the earlier ones
    /// were replaced. No unit was restarted, so the services still run their
    /// old config, but the files on disk are a mix of old and new.
    #[error(
        "{backend}: writing {path} failed after {} file(s) were replaced: {reason}",
        .written.len()
    )]
    PartialWrite {
        backend: BackendKind,
        path: PathBuf,
        written: Vec<PathBuf>,
        reason: String,
    },

    /// The config was written but the service did not restart cleanly.
    #[error("{backend}: config written, restart of {unit} failed (status {status:?}): {stderr}")]
    ReloadFailed {
        backend: BackendKind,
        unit: String,
        status: Option<i32>,
        stderr: String,
    },

    /// The config was written but the restart did not finish in time.
    #[error("{backend}: config written, restart of {unit} timed out after {timeout_secs}s")]
    ReloadTimedOut {
        backend: BackendKind,
        unit: String,
        timeout_secs: u64,
    },

    /// The tool needed to apply this backend is not installed.
    #[error("{backend}: {tool} unavailable: {reason}")]
    ToolUnavailable {
        backend: BackendKind,
        tool: String,
        reason: String,
    },

    /// An account primitive (useradd, chpasswd, userdel, usermod) failed.
    #[error("{backend}: {tool} for '{username}' failed (status {status:?}): {stderr}")]
    AccountCommandFailed {
        backend: BackendKind,
        username: String,
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    /// Provisioning failed earlier and the plaintext credential is gone.
    ///
    /// ## When This Occurs
    /// - `reconcile` after `add_user` or `change_credential` could not
    ///   provision the account; only `change_credential` can finish it
    #[error("{backend}: account '{username}' needs a new credential to finish provisioning")]
    CredentialRequired { backend: BackendKind, username: String },
}

impl ApplyError {
    /// Returns true if retrying the same operation can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ApplyError::ToolUnavailable { .. } | ApplyError::CredentialRequired { .. }
        )
    }

    /// Whether the whole artifact reached disk before the failure.
    pub fn config_written(&self) -> bool {
        matches!(
            self,
            ApplyError::ReloadFailed { .. } | ApplyError::ReloadTimedOut { .. }
        )
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            ApplyError::WriteFailed { backend, .. }
            | ApplyError::PartialWrite { backend, .. }
            | ApplyError::ReloadFailed { backend, .. }
            | ApplyError::ReloadTimedOut { backend, .. }
            | ApplyError::ToolUnavailable { backend, .. }
            | ApplyError::AccountCommandFailed { backend, .. }
            | ApplyError::CredentialRequired { backend, .. } => *backend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_error_categories() {
        let reload = ApplyError::ReloadFailed {
            backend: BackendKind::Xray,
            unit: "xray".to_string(),
            status: Some(1),
            stderr: "bad config".to_string(),
        };
        assert!(reload.is_retryable());
        assert!(reload.config_written());
        assert_eq!(reload.backend(), BackendKind::Xray);

        let write = ApplyError::WriteFailed {
            backend: BackendKind::Ssh,
            path: PathBuf::from("/etc/ssh/sshd_config"),
            reason: "read-only filesystem".to_string(),
        };
        assert!(write.is_retryable());
        assert!(!write.config_written());

        let partial = ApplyError::PartialWrite {
            backend: BackendKind::L2tp,
            path: PathBuf::from("/etc/ipsec.conf"),
            written: vec![PathBuf::from("/etc/xl2tpd/xl2tpd.conf")],
            reason: "permission denied".to_string(),
        };
        assert!(partial.is_retryable());
        assert!(!partial.config_written());
        assert_eq!(
            partial.to_string(),
            "l2tp: writing /etc/ipsec.conf failed after 1 file(s) were replaced: permission denied"
        );

        let missing = ApplyError::ToolUnavailable {
            backend: BackendKind::L2tp,
            tool: "systemctl".to_string(),
            reason: "not found".to_string(),
        };
        assert!(!missing.is_retryable());

        let credential = ApplyError::CredentialRequired {
            backend: BackendKind::Ssh,
            username: "bob".to_string(),
        };
        assert!(!credential.is_retryable());
        assert_eq!(credential.backend(), BackendKind::Ssh);
    }

    #[test]
    fn test_caller_errors() {
        assert!(EngineError::not_found("alice").is_caller_error());
        assert!(EngineError::Validation(ValidationError::required("username")).is_caller_error());
        assert!(!EngineError::Backup("disk full".into()).is_caller_error());
    }
}
