//! # Account Task Store
//!
//! OS account primitives that failed and have not yet reached the host
//! (`account_tasks.json`). The user record alone cannot carry them: a failed
//! `userdel` happens after the record is gone.
//!
//! ```json
//! {
//!   "version": 1,
//!   "tasks": {
//!     "bob": { "backend": "ssh", "task": "deprovision" }
//!   }
//! }
//! ```
//!
//! One task per username; the latest failure replaces an earlier one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use boxvps_core::{AccountTask, BackendKind, PendingAccount, STORE_FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};

type Tasks = BTreeMap<String, PendingAccount>;

#[derive(Debug, Serialize, Deserialize)]
struct TasksDocument {
    version: u32,
    tasks: Tasks,
}

/// Repository for outstanding account tasks.
#[derive(Debug)]
pub struct AccountTaskStore {
    path: PathBuf,
    snapshot: RwLock<Tasks>,
    write_gate: Mutex<()>,
}

impl AccountTaskStore {
    /// Opens the store. A missing file means nothing is outstanding and is
    /// only created on the first recorded task.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let tasks = load(&path).await?.unwrap_or_default();
        if !tasks.is_empty() {
            info!(path = %path.display(), tasks = tasks.len(), "Outstanding account tasks loaded");
        }

        Ok(AccountTaskStore {
            path,
            snapshot: RwLock::new(tasks),
            write_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, username: &str) -> Option<PendingAccount> {
        self.snapshot.read().await.get(username).copied()
    }

    /// Every outstanding task, ordered by username.
    pub async fn list(&self) -> Vec<(String, PendingAccount)> {
        self.snapshot
            .read()
            .await
            .iter()
            .map(|(name, pending)| (name.clone(), *pending))
            .collect()
    }

    /// Whether any task is outstanding for `backend`.
    pub async fn has_backend(&self, backend: BackendKind) -> bool {
        self.snapshot
            .read()
            .await
            .values()
            .any(|pending| pending.backend == backend)
    }

    /// Records a failed task, replacing any earlier one for the user.
    pub async fn record(&self, username: &str, backend: BackendKind, task: AccountTask) -> StoreResult<()> {
        let pending = PendingAccount { backend, task };
        if self.get(username).await == Some(pending) {
            return Ok(());
        }
        self.modify(|tasks| {
            tasks.insert(username.to_string(), pending);
        })
        .await
    }

    /// Drops the user's task. No-op (and no write) if there is none.
    pub async fn clear(&self, username: &str) -> StoreResult<()> {
        if self.get(username).await.is_none() {
            return Ok(());
        }
        self.modify(|tasks| {
            tasks.remove(username);
        })
        .await
    }

    pub async fn reload(&self) -> StoreResult<()> {
        let _gate = self.write_gate.lock().await;
        let tasks = load(&self.path).await?.unwrap_or_default();
        info!(path = %self.path.display(), tasks = tasks.len(), "Account task store reloaded");
        *self.snapshot.write().await = tasks;
        Ok(())
    }

    async fn modify<F>(&self, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Tasks),
    {
        let _gate = self.write_gate.lock().await;
        let mut next = self.snapshot.read().await.clone();
        change(&mut next);

        if let Err(e) = persist(&self.path, &next).await {
            error!(path = %self.path.display(), error = %e, "Account task store write failed");
            return Err(e);
        }

        *self.snapshot.write().await = next;
        Ok(())
    }
}

async fn load(path: &Path) -> StoreResult<Option<Tasks>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let doc: TasksDocument =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::corrupt(path, e.to_string()))?;
    if doc.version != STORE_FORMAT_VERSION {
        return Err(StoreError::corrupt(
            path,
            format!("unsupported version {}", doc.version),
        ));
    }
    debug!(path = %path.display(), tasks = doc.tasks.len(), "Account tasks loaded");
    Ok(Some(doc.tasks))
}

async fn persist(path: &Path, tasks: &Tasks) -> StoreResult<()> {
    let doc = TasksDocument {
        version: STORE_FORMAT_VERSION,
        tasks: tasks.clone(),
    };
    let mut bytes = serde_json::to_vec_pretty(&doc).map_err(|e| StoreError::Serialize {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');
    write_atomic(path, &bytes).await
}
