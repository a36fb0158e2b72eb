//! # Orchestration Engine
//!
//! Composes the stores, the generator and the controller. Every mutating
//! operation runs the same short transaction:
//!
//! ```text
//!   VALIDATE ──► MUTATE_STORE ──► REGENERATE_AFFECTED ──► APPLY_BACKENDS ──► COMMIT
//!      │              │                   │                     │
//!      ▼              ▼                   ▼                     ▼
//!   Err(Validation) Err(StoreWrite)   Err(Generation)     Ok(Degraded { failures })
//!   Err(NotFound)   store unchanged   record of intent    record of intent stands,
//!   no side effects no backend touched stands             backend marked pending
//! ```
//!
//! There is no rollback. A failed backend stays in the pending set until a
//! later apply of the same backend succeeds; rendering is idempotent, so
//! retrying the same operation (or [`Engine::reconcile`]) converges.
//!
//! ## Account Tasks
//! A failed `useradd` or `userdel` is recorded in `account_tasks.json`
//! before the operation returns, because a deleted user's record can no
//! longer say that its account still exists. `reconcile` replays recorded
//! deprovisions; a recorded provision waits for the next credential change.
//! An account-bearing backend leaves the pending set only once it has no
//! recorded task.
//!
//! ## Concurrency
//! Mutations, backup and restore hold one write gate for their whole
//! duration, so they queue instead of interleaving. Reads go straight to the
//! stores' snapshots and never wait on an apply.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use boxvps_core::render::xray;
use boxvps_core::validation::{validate_credential, validate_quota_gb, validate_username};
use boxvps_core::{
    render, AccountTask, AuthEvent, BackendKind, ServiceKind, UsageCounters, UserInfo, UserMap,
    UserRecord, ValidationError,
};
use boxvps_store::{AccountTaskStore, StoreError, UsageStore, UserStore};
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backup;
use crate::config::GatewayConfig;
use crate::controller::Controller;
use crate::credential::{hash_credential, verify_credential};
use crate::error::{ApplyError, EngineError, EngineResult};
use crate::status::{self, SessionCount, SystemStatus};
use crate::system::SystemRunner;
use crate::usage::UsageTracker;

const PROC_ROOT: &str = "/proc";
const DISK_ROOT: &str = "/";

// =============================================================================
// Outcome
// =============================================================================

/// Result of a mutating operation whose store write succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Every affected backend reported success.
    Committed,
    /// The store is updated but these backends are not yet consistent.
    Degraded { failures: Vec<ApplyError> },
}

impl OperationOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, OperationOutcome::Committed)
    }

    pub fn failures(&self) -> &[ApplyError] {
        match self {
            OperationOutcome::Committed => &[],
            OperationOutcome::Degraded { failures } => failures,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Account primitive scheduled for an account-bearing backend.
enum AccountAction {
    Provision { username: String, password: String },
    Deprovision { username: String },
    SetLocked { username: String, locked: bool },
    /// A recorded provision that only a new credential can finish
    AwaitCredential { username: String },
}

/// What an operation needs from the backends after the store write.
#[derive(Default)]
struct Plan {
    regenerate: BTreeSet<BackendKind>,
    accounts: Vec<(BackendKind, AccountAction)>,
}

impl Plan {
    fn none() -> Self {
        Plan::default()
    }

    fn regenerate(mut self, backend: BackendKind) -> Self {
        self.regenerate.insert(backend);
        self
    }

    fn account(mut self, backend: BackendKind, action: AccountAction) -> Self {
        self.accounts.push((backend, action));
        self
    }

    fn touches(&self, backend: BackendKind) -> bool {
        self.regenerate.contains(&backend) || self.accounts.iter().any(|(b, _)| *b == backend)
    }

    /// Regenerates the user's artifact, if its backend has one.
    fn for_identity_change(self, service: ServiceKind) -> Self {
        let backend = service.backend();
        if backend.is_identity_bearing() {
            self.regenerate(backend)
        } else {
            self
        }
    }

    /// Locks or unlocks the user's OS account, if its backend has accounts.
    fn for_lock_change(self, username: &str, service: ServiceKind, locked: bool) -> Self {
        let backend = service.backend();
        if backend.is_account_bearing() {
            self.account(
                backend,
                AccountAction::SetLocked {
                    username: username.to_string(),
                    locked,
                },
            )
        } else {
            self
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// The gateway orchestration engine.
pub struct Engine {
    config: GatewayConfig,
    users: Arc<UserStore>,
    usage: Arc<UsageStore>,
    tasks: AccountTaskStore,
    tracker: UsageTracker,
    controller: Controller,
    write_gate: Mutex<()>,
    pending: Mutex<BTreeSet<BackendKind>>,
    proc_root: PathBuf,
}

impl Engine {
    /// Validates the config and opens both stores, creating them if absent.
    pub async fn open(config: GatewayConfig, runner: Arc<dyn SystemRunner>) -> EngineResult<Self> {
        config.validate()?;

        let users = Arc::new(UserStore::open(config.paths.users_file()).await?);
        let usage = Arc::new(UsageStore::open(config.paths.usage_file()).await?);
        let tasks = AccountTaskStore::open(config.paths.account_tasks_file()).await?;
        let tracker = UsageTracker::new(users.clone(), usage.clone());
        let controller = Controller::new(
            runner,
            config.engine.apply_timeout(),
            config.engine.account_shell.clone(),
        );

        // Outstanding account tasks keep their backend pending across restarts
        let pending: BTreeSet<BackendKind> = tasks
            .list()
            .await
            .into_iter()
            .map(|(_, task)| task.backend)
            .collect();

        info!(
            data_dir = %config.paths.data_dir.display(),
            backends = ?config.topology.enabled_backends().collect::<Vec<_>>(),
            ?pending,
            "Engine opened"
        );

        Ok(Engine {
            config,
            users,
            usage,
            tasks,
            tracker,
            controller,
            write_gate: Mutex::new(()),
            pending: Mutex::new(pending),
            proc_root: PathBuf::from(PROC_ROOT),
        })
    }

    /// Reads host resources from another procfs root.
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    // =========================================================================
    // User Lifecycle
    // =========================================================================

    /// Creates a user and brings their backend in line.
    pub async fn add_user(
        &self,
        username: &str,
        credential: &str,
        service: ServiceKind,
        quota_gb: Option<u64>,
    ) -> EngineResult<OperationOutcome> {
        validate_username(username)?;
        validate_credential(credential)?;
        validate_quota_gb(quota_gb)?;

        let _gate = self.write_gate.lock().await;
        if self.users.contains(username).await {
            return Err(ValidationError::Duplicate {
                field: "username".to_string(),
                value: username.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let record = UserRecord::new(hash_credential(credential)?, service, quota_gb, now);
        self.persist(username, record).await?;
        // The user exists from here on; a stale baseline must not skip convergence
        if let Err(e) = self.usage.reset(username, now).await {
            warn!(username, path = %e.path().display(), error = %e, "Failed to reset usage baseline");
        }
        info!(username, %service, ?quota_gb, "User added");

        let mut plan = Plan::none().for_identity_change(service);
        if service.backend().is_account_bearing() {
            plan = plan.account(
                service.backend(),
                AccountAction::Provision {
                    username: username.to_string(),
                    password: credential.to_string(),
                },
            );
        }
        self.converge("add_user", plan).await
    }

    /// Removes the user from the store and from every backend.
    pub async fn delete_user(&self, username: &str) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;
        let record = self.require(username).await?;

        self.users
            .delete(username)
            .await
            .map_err(|e| store_failed("delete_user", e))?;
        // Leftover counters are never read; add_user resets them
        if let Err(e) = self.tracker.forget(username).await {
            warn!(username, error = %e, "Failed to drop usage counters");
        }
        info!(username, service = %record.service, "User deleted");

        let mut plan = Plan::none().for_identity_change(record.service);
        if record.service.backend().is_account_bearing() {
            plan = plan.account(
                record.service.backend(),
                AccountAction::Deprovision {
                    username: username.to_string(),
                },
            );
        }
        self.converge("delete_user", plan).await
    }

    /// Bans the user. Banning a banned user re-applies without touching `banned_at`.
    pub async fn ban_user(&self, username: &str, service: ServiceKind) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;
        let mut record = self.require_service(username, service).await?;

        if record.ban(Utc::now()) {
            self.persist(username, record).await?;
            info!(username, %service, "User banned");
        } else {
            debug!(username, "User already banned, re-applying");
        }

        let plan = Plan::none()
            .for_identity_change(service)
            .for_lock_change(username, service, true);
        self.converge("ban_user", plan).await
    }

    pub async fn unban_user(&self, username: &str, service: ServiceKind) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;
        let mut record = self.require_service(username, service).await?;

        if record.unban() {
            self.persist(username, record).await?;
            info!(username, %service, "User unbanned");
        } else {
            debug!(username, "User not banned, re-applying");
        }

        let plan = Plan::none()
            .for_identity_change(service)
            .for_lock_change(username, service, false);
        self.converge("unban_user", plan).await
    }

    /// Sets or clears the quota. Quota is in no artifact, so nothing is applied.
    pub async fn set_quota(
        &self,
        username: &str,
        service: ServiceKind,
        quota_gb: Option<u64>,
    ) -> EngineResult<OperationOutcome> {
        validate_quota_gb(quota_gb)?;

        let _gate = self.write_gate.lock().await;
        let mut record = self.require_service(username, service).await?;
        record.quota_gb = quota_gb;
        self.persist(username, record).await?;
        info!(username, ?quota_gb, "Quota set");

        self.converge("set_quota", Plan::none()).await
    }

    /// Issues a fresh identity token and applies it.
    pub async fn change_identity_token(&self, username: &str) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;
        let mut record = self.require(username).await?;
        if !record.service.requires_identity_token() {
            return Err(ValidationError::Mismatch {
                field: "service".to_string(),
                expected: ServiceKind::Xray.to_string(),
                actual: record.service.to_string(),
            }
            .into());
        }

        let service = record.service;
        record.identity_token = Some(Uuid::new_v4());
        self.persist(username, record).await?;
        info!(username, "Identity token changed");

        self.converge("change_identity_token", Plan::none().regenerate(service.backend()))
            .await
    }

    /// Replaces the credential. SSH accounts get the new password immediately.
    pub async fn change_credential(&self, username: &str, credential: &str) -> EngineResult<OperationOutcome> {
        validate_credential(credential)?;

        let _gate = self.write_gate.lock().await;
        let mut record = self.require(username).await?;
        record.credential = hash_credential(credential)?;
        let service = record.service;
        self.persist(username, record).await?;
        info!(username, "Credential changed");

        let mut plan = Plan::none();
        if service.backend().is_account_bearing() {
            plan = plan.account(
                service.backend(),
                AccountAction::Provision {
                    username: username.to_string(),
                    password: credential.to_string(),
                },
            );
        }
        self.converge("change_credential", plan).await
    }

    // =========================================================================
    // Authentication Bookkeeping
    // =========================================================================

    /// Records a login attempt reported by an authentication front-end.
    ///
    /// Reaching `engine.max_login_attempts` failures marks the account locked.
    pub async fn record_auth_event(&self, username: &str, event: AuthEvent) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;
        let record = self.require(username).await?;
        self.apply_auth_event(username, record, event).await?;

        self.converge("record_auth_event", Plan::none()).await
    }

    /// Checks a login credential against the stored hash and records the
    /// attempt. Banned and locked users are refused without counting.
    pub async fn authenticate(&self, username: &str, credential: &str) -> EngineResult<bool> {
        let _gate = self.write_gate.lock().await;
        let record = self.require(username).await?;
        if record.banned || record.locked {
            debug!(username, banned = record.banned, locked = record.locked, "Login refused");
            return Ok(false);
        }

        let accepted = verify_credential(credential, &record.credential);
        let event = if accepted {
            AuthEvent::LoginSucceeded
        } else {
            AuthEvent::LoginFailed
        };
        self.apply_auth_event(username, record, event).await?;
        Ok(accepted)
    }

    async fn apply_auth_event(&self, username: &str, mut record: UserRecord, event: AuthEvent) -> EngineResult<()> {
        match event {
            AuthEvent::LoginSucceeded => {
                record.last_login = Some(Utc::now());
                record.login_attempts = 0;
            }
            AuthEvent::LoginFailed => {
                record.login_attempts = record.login_attempts.saturating_add(1);
                if !record.locked && record.login_attempts >= self.config.engine.max_login_attempts {
                    record.locked = true;
                    warn!(username, attempts = record.login_attempts, "Account locked after failed logins");
                }
            }
        }
        self.persist(username, record).await
    }

    pub async fn unlock_user(&self, username: &str) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;
        let mut record = self.require(username).await?;
        record.locked = false;
        record.login_attempts = 0;
        self.persist(username, record).await?;
        info!(username, "Account unlocked");

        self.converge("unlock_user", Plan::none()).await
    }

    // =========================================================================
    // Usage & Quota
    // =========================================================================

    pub async fn add_usage(&self, username: &str, upload: u64, download: u64) -> EngineResult<UsageCounters> {
        let _gate = self.write_gate.lock().await;
        self.tracker.add_usage(username, upload, download, Utc::now()).await
    }

    pub async fn reset_usage(&self, username: &str) -> EngineResult<UsageCounters> {
        let _gate = self.write_gate.lock().await;
        let counters = self.tracker.reset_usage(username, Utc::now()).await?;
        info!(username, "Usage reset");
        Ok(counters)
    }

    pub async fn get_usage(&self, username: &str) -> EngineResult<UsageCounters> {
        self.tracker.get_usage(username, Utc::now()).await
    }

    pub async fn is_over_quota(&self, username: &str) -> EngineResult<bool> {
        self.tracker.is_over_quota(username).await
    }

    /// Bans every active user who has reached their quota.
    ///
    /// Returns the newly banned usernames and the combined apply outcome.
    pub async fn enforce_quotas(&self) -> EngineResult<(Vec<String>, OperationOutcome)> {
        let _gate = self.write_gate.lock().await;
        let now = Utc::now();

        let mut banned = Vec::new();
        let mut plan = Plan::none();
        let mut stopped = None;
        for (username, record) in self.users.list().await.iter() {
            if record.banned {
                continue;
            }
            match self.tracker.is_over_quota(username).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    stopped = Some(e);
                    break;
                }
            }
            let mut record = record.clone();
            record.ban(now);
            let service = record.service;
            if let Err(e) = self.persist(username, record).await {
                stopped = Some(e);
                break;
            }
            warn!(username, "User banned for exceeding quota");

            plan = plan
                .for_identity_change(service)
                .for_lock_change(username, service, true);
            banned.push(username.to_string());
        }

        // Bans already stored are applied even if a later one failed
        let outcome = self.converge("enforce_quotas", plan).await?;
        if let Some(e) = stopped {
            warn!(?banned, "Quota enforcement stopped early");
            return Err(e);
        }
        Ok((banned, outcome))
    }

    // =========================================================================
    // Convergence
    // =========================================================================

    /// Regenerates and applies every enabled backend and re-asserts SSH lock state.
    pub async fn reconcile(&self) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;
        self.reconcile_locked().await
    }

    async fn reconcile_locked(&self) -> EngineResult<OperationOutcome> {
        let mut plan = Plan::none();
        for backend in self.config.topology.enabled_backends() {
            plan = plan.regenerate(backend);
        }
        let users = self.users.list().await;
        for (username, record) in users.iter() {
            plan = plan.for_lock_change(username, record.service, record.banned);
        }

        for (username, pending) in self.tasks.list().await {
            let action = match pending.task {
                AccountTask::Deprovision if users.contains(&username) => {
                    // Re-created since; deleting now would remove a live account
                    warn!(username = %username, "Dropping deprovision task of an existing user");
                    if let Err(e) = self.tasks.clear(&username).await {
                        error!(username = %username, error = %e, "Account task store write failed");
                    }
                    continue;
                }
                AccountTask::Deprovision => AccountAction::Deprovision { username },
                // useradd may have run before the record went away
                AccountTask::Provision if !users.contains(&username) => {
                    AccountAction::Deprovision { username }
                }
                AccountTask::Provision => AccountAction::AwaitCredential { username },
            };
            plan = plan.account(pending.backend, action);
        }
        self.converge("reconcile", plan).await
    }

    /// Backends whose last apply failed.
    pub async fn pending_backends(&self) -> Vec<BackendKind> {
        self.pending.lock().await.iter().copied().collect()
    }

    /// Applies a plan in backend order, account primitives before artifacts.
    async fn converge(&self, operation: &str, plan: Plan) -> EngineResult<OperationOutcome> {
        let users = self.users.list().await;
        let topology = &self.config.topology;
        let mut failures = Vec::new();

        for backend in BackendKind::ALL {
            if !plan.touches(backend) {
                continue;
            }
            if !topology.is_enabled(backend) {
                debug!(operation, %backend, "Backend disabled, skipping");
                continue;
            }

            let before = failures.len();
            for (_, action) in plan.accounts.iter().filter(|(b, _)| *b == backend) {
                let result = self.run_account_action(backend, action).await;
                self.track_account_task(backend, action, result.is_ok()).await;
                if let Err(e) = result {
                    failures.push(e);
                }
            }

            if plan.regenerate.contains(&backend) {
                let artifact = render(backend, &users, topology, &self.config.layout).map_err(|e| {
                    error!(operation, %backend, error = %e, "Artifact generation failed");
                    EngineError::from(e)
                })?;
                if let Err(e) = self.controller.apply(&artifact).await {
                    failures.push(e);
                }
            }

            let outstanding = self.tasks.has_backend(backend).await;
            let mut pending = self.pending.lock().await;
            if failures.len() == before && !outstanding {
                if pending.remove(&backend) {
                    info!(operation, %backend, "Backend converged");
                }
            } else {
                pending.insert(backend);
            }
        }

        if failures.is_empty() {
            debug!(operation, "Operation committed");
            Ok(OperationOutcome::Committed)
        } else {
            for failure in &failures {
                warn!(
                    operation,
                    backend = %failure.backend(),
                    retryable = failure.is_retryable(),
                    error = %failure,
                    "Backend not yet consistent"
                );
            }
            Ok(OperationOutcome::Degraded { failures })
        }
    }

    async fn run_account_action(&self, backend: BackendKind, action: &AccountAction) -> Result<(), ApplyError> {
        match action {
            AccountAction::Provision { username, password } => {
                self.controller.provision_account(backend, username, password).await
            }
            AccountAction::Deprovision { username } => {
                self.controller.deprovision_account(backend, username).await
            }
            AccountAction::SetLocked { username, locked } => {
                self.controller.set_account_locked(backend, username, *locked).await
            }
            AccountAction::AwaitCredential { username } => Err(ApplyError::CredentialRequired {
                backend,
                username: username.clone(),
            }),
        }
    }

    /// Records a failed provision or deprovision, or clears the user's task
    /// once one succeeds. Lock state is re-derived from the record instead.
    async fn track_account_task(&self, backend: BackendKind, action: &AccountAction, succeeded: bool) {
        let (username, task) = match action {
            AccountAction::Provision { username, .. } => (username, AccountTask::Provision),
            AccountAction::Deprovision { username } => (username, AccountTask::Deprovision),
            AccountAction::SetLocked { .. } | AccountAction::AwaitCredential { .. } => return,
        };

        let written = if succeeded {
            self.tasks.clear(username).await
        } else {
            self.tasks.record(username, backend, task).await
        };
        if let Err(e) = written {
            error!(username, path = %e.path().display(), error = %e, "Account task store write failed");
        }
    }

    // =========================================================================
    // Backup & Restore
    // =========================================================================

    /// Archives the data directory and configured backend paths.
    pub async fn backup(&self) -> EngineResult<PathBuf> {
        let _gate = self.write_gate.lock().await;

        let mut sources = vec![self.config.paths.data_dir.clone()];
        sources.extend(self.config.backup.include.iter().cloned());
        backup::create_archive(&self.config.paths.backup_dir, sources, Utc::now())
            .await
            .map_err(|e| {
                error!(error = %e, "Backup failed");
                e
            })
    }

    /// Extracts an archive, reloads both stores and reconciles every backend.
    pub async fn restore(&self, archive: &Path) -> EngineResult<OperationOutcome> {
        let _gate = self.write_gate.lock().await;

        backup::extract_archive(archive, &self.config.paths.restore_root)
            .await
            .map_err(|e| {
                error!(archive = %archive.display(), error = %e, "Restore failed");
                e
            })?;
        self.users.reload().await.map_err(|e| store_failed("restore", e))?;
        self.usage.reload().await.map_err(|e| store_failed("restore", e))?;
        self.tasks.reload().await.map_err(|e| store_failed("restore", e))?;
        info!(archive = %archive.display(), users = self.users.list().await.len(), "State restored");

        self.reconcile_locked().await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_user_info(&self, username: &str) -> EngineResult<UserInfo> {
        let record = self.require(username).await?;
        let usage = self.tracker.counters_or_zero(username, Utc::now()).await;
        Ok(UserInfo::new(username, record, usage))
    }

    pub async fn list_users(&self) -> UserMap {
        self.users.list().await
    }

    /// Resources, service states and session counts of every enabled backend.
    pub async fn get_system_status(&self) -> SystemStatus {
        let topology = &self.config.topology;
        let layout = &self.config.layout;
        let users = self.users.list().await;

        let mut units: Vec<String> = Vec::new();
        let mut sessions = Vec::new();
        for backend in topology.enabled_backends() {
            // Unit names do not depend on users
            match render(backend, &UserMap::new(), topology, layout) {
                Ok(artifact) => {
                    for unit in artifact.units {
                        if !units.contains(&unit) {
                            units.push(unit);
                        }
                    }
                }
                Err(e) => warn!(%backend, error = %e, "Cannot determine units"),
            }

            let active = match backend {
                BackendKind::Ssh => status::ssh_sessions(&self.controller).await,
                BackendKind::Xray => xray::active_clients(&users).map(|c| c.len() as u32).unwrap_or(0),
                BackendKind::OpenVpn => status::openvpn_sessions(&layout.openvpn_status_log()).await,
                BackendKind::L2tp => status::l2tp_sessions(&self.proc_root).await,
                // Tunnel clients are counted by the backend they reach
                BackendKind::Argo => continue,
            };
            sessions.push(SessionCount { backend, active });
        }

        let mut services = Vec::with_capacity(units.len());
        for unit in &units {
            services.push(self.controller.service_state(unit).await);
        }

        let mut resources = status::read_resources(&self.proc_root, Path::new(DISK_ROOT)).await;
        resources.interfaces = status::interface_addresses(&self.controller).await;

        SystemStatus {
            resources,
            services,
            sessions,
            pending: self.pending_backends().await,
            pending_accounts: self
                .tasks
                .list()
                .await
                .into_iter()
                .map(|(username, _)| username)
                .collect(),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn require(&self, username: &str) -> EngineResult<UserRecord> {
        self.users
            .get(username)
            .await
            .ok_or_else(|| EngineError::not_found(username))
    }

    /// Loads a record and checks the caller named the right service.
    async fn require_service(&self, username: &str, service: ServiceKind) -> EngineResult<UserRecord> {
        let record = self.require(username).await?;
        if record.service != service {
            return Err(ValidationError::Mismatch {
                field: "service".to_string(),
                expected: record.service.to_string(),
                actual: service.to_string(),
            }
            .into());
        }
        Ok(record)
    }

    async fn persist(&self, username: &str, record: UserRecord) -> EngineResult<()> {
        self.users.put(username, record).await.map_err(|e| {
            error!(username, path = %e.path().display(), error = %e, "User store write failed");
            EngineError::from(e)
        })
    }
}

fn store_failed(operation: &str, e: StoreError) -> EngineError {
    error!(operation, path = %e.path().display(), error = %e, "Store write failed");
    EngineError::from(e)
}
