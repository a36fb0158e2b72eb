//! # Backend Controller
//!
//! Applies generated artifacts and owns OS account primitives.
//!
//! ## Apply Flow
//! ```text
//! apply(artifact)
//!   │
//!   ├─► for each file
//!   │     ├─ on-disk bytes equal? ── skip (logged as unchanged)
//!   │     └─ write_atomic ───────── fails? WriteFailed  (nothing replaced yet)
//!   │                                      PartialWrite (earlier files replaced)
//!   │
//!   └─► for each unit
//!         └─ systemctl restart ─── Failed   → ReloadFailed   (config written)
//!                                  TimedOut → ReloadTimedOut (config written)
//!                                  missing  → ToolUnavailable
//! ```
//!
//! Units are restarted even when no file changed, so retrying after a
//! failed restart actually restarts the service.
//!
//! ## Account Primitives
//! Only account-bearing backends provision anything; for every other
//! backend the primitives are no-ops. All of them tolerate the account
//! already being in the requested state.

use std::sync::Arc;
use std::time::Duration;

use boxvps_core::{Artifact, BackendKind};
use boxvps_store::write_atomic;
use tracing::{debug, info, warn};

use crate::error::ApplyError;
use crate::status::ServiceState;
use crate::system::{CommandOutcome, CommandSpec, SystemRunner};

/// `useradd`: username already in use
const USERADD_EXISTS: i32 = 9;
/// `userdel` / `usermod`: user does not exist
const USER_ABSENT: i32 = 6;
/// `userdel`: could not remove the home directory
const USERDEL_HOME_FAILED: i32 = 12;

/// Applies artifacts and runs account primitives through a [`SystemRunner`].
#[derive(Clone)]
pub struct Controller {
    runner: Arc<dyn SystemRunner>,
    timeout: Duration,
    shell: String,
}

impl Controller {
    pub fn new(runner: Arc<dyn SystemRunner>, timeout: Duration, shell: impl Into<String>) -> Self {
        Controller {
            runner,
            timeout,
            shell: shell.into(),
        }
    }

    /// Runs an arbitrary command with the controller's timeout.
    pub async fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        self.runner.run(spec, self.timeout).await
    }

    // =========================================================================
    // Artifacts
    // =========================================================================

    /// Writes every file of the artifact and restarts its units.
    pub async fn apply(&self, artifact: &Artifact) -> Result<(), ApplyError> {
        let backend = artifact.backend;
        let mut written = Vec::new();

        for file in &artifact.files {
            match tokio::fs::read(&file.path).await {
                Ok(existing) if existing == file.contents.as_bytes() => {
                    debug!(%backend, path = %file.path.display(), "Artifact unchanged");
                    continue;
                }
                _ => {}
            }

            if let Err(e) = write_atomic(&file.path, file.contents.as_bytes()).await {
                let path = file.path.clone();
                let reason = e.to_string();
                return Err(if written.is_empty() {
                    ApplyError::WriteFailed { backend, path, reason }
                } else {
                    warn!(%backend, path = %path.display(), replaced = written.len(), "Artifact partially written");
                    ApplyError::PartialWrite {
                        backend,
                        path,
                        written,
                        reason,
                    }
                });
            }
            info!(%backend, path = %file.path.display(), "Artifact written");
            written.push(file.path.clone());
        }

        for unit in &artifact.units {
            self.restart(backend, unit).await?;
        }

        Ok(())
    }

    async fn restart(&self, backend: BackendKind, unit: &str) -> Result<(), ApplyError> {
        match self.run(&CommandSpec::systemctl("restart", unit)).await {
            CommandOutcome::Success { .. } => {
                debug!(%backend, unit, "Service restarted");
                Ok(())
            }
            CommandOutcome::Failed { status, stderr } => Err(ApplyError::ReloadFailed {
                backend,
                unit: unit.to_string(),
                status,
                stderr,
            }),
            CommandOutcome::TimedOut => Err(ApplyError::ReloadTimedOut {
                backend,
                unit: unit.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
            CommandOutcome::Unavailable { reason } => Err(ApplyError::ToolUnavailable {
                backend,
                tool: "systemctl".to_string(),
                reason,
            }),
        }
    }

    /// `systemctl is-active <unit>`.
    pub async fn service_state(&self, unit: &str) -> ServiceState {
        let state = match self.run(&CommandSpec::systemctl("is-active", unit)).await {
            CommandOutcome::Success { stdout } => stdout.trim().to_string(),
            // is-active exits non-zero for every state other than active
            CommandOutcome::Failed { .. } => "inactive".to_string(),
            CommandOutcome::TimedOut => "unknown".to_string(),
            CommandOutcome::Unavailable { .. } => "unavailable".to_string(),
        };
        ServiceState {
            unit: unit.to_string(),
            running: state == "active",
            state,
        }
    }

    // =========================================================================
    // Account Primitives
    // =========================================================================

    /// Ensures the account exists and has `password`.
    ///
    /// Safe to call for an existing account; the password is reset.
    pub async fn provision_account(
        &self,
        backend: BackendKind,
        username: &str,
        password: &str,
    ) -> Result<(), ApplyError> {
        if !backend.is_account_bearing() {
            return Ok(());
        }

        let useradd = CommandSpec::new("useradd", ["-m", "-s", self.shell.as_str(), username]);
        self.account_command(backend, username, &useradd, &[USERADD_EXISTS])
            .await?;

        let chpasswd = CommandSpec::new("chpasswd", Vec::<String>::new())
            .with_stdin(format!("{}:{}\n", username, password));
        self.account_command(backend, username, &chpasswd, &[]).await?;

        info!(%backend, username, "Account provisioned");
        Ok(())
    }

    /// Removes the account and its home directory. Absent accounts are fine.
    pub async fn deprovision_account(
        &self,
        backend: BackendKind,
        username: &str,
    ) -> Result<(), ApplyError> {
        if !backend.is_account_bearing() {
            return Ok(());
        }

        let userdel = CommandSpec::new("userdel", ["-r", username]);
        self.account_command(backend, username, &userdel, &[USER_ABSENT, USERDEL_HOME_FAILED])
            .await?;

        info!(%backend, username, "Account deprovisioned");
        Ok(())
    }

    /// Locks or unlocks the account's password login.
    pub async fn set_account_locked(
        &self,
        backend: BackendKind,
        username: &str,
        locked: bool,
    ) -> Result<(), ApplyError> {
        if !backend.is_account_bearing() {
            return Ok(());
        }

        let flag = if locked { "-L" } else { "-U" };
        let usermod = CommandSpec::new("usermod", [flag, username]);
        self.account_command(backend, username, &usermod, &[USER_ABSENT])
            .await?;

        debug!(%backend, username, locked, "Account lock state set");
        Ok(())
    }

    /// Runs an account command, treating `tolerated` exit codes as success.
    async fn account_command(
        &self,
        backend: BackendKind,
        username: &str,
        spec: &CommandSpec,
        tolerated: &[i32],
    ) -> Result<(), ApplyError> {
        match self.run(spec).await {
            CommandOutcome::Success { .. } => Ok(()),
            CommandOutcome::Failed {
                status: Some(code), ..
            } if tolerated.contains(&code) => {
                warn!(%backend, username, command = %spec, status = code, "Tolerated exit status");
                Ok(())
            }
            CommandOutcome::Failed { status, stderr } => Err(ApplyError::AccountCommandFailed {
                backend,
                username: username.to_string(),
                tool: spec.program.clone(),
                status,
                stderr,
            }),
            CommandOutcome::TimedOut => Err(ApplyError::AccountCommandFailed {
                backend,
                username: username.to_string(),
                tool: spec.program.clone(),
                status: None,
                stderr: format!("timed out after {}s", self.timeout.as_secs()),
            }),
            CommandOutcome::Unavailable { reason } => Err(ApplyError::ToolUnavailable {
                backend,
                tool: spec.program.clone(),
                reason,
            }),
        }
    }
}
