//! # User Store
//!
//! The durable user collection (`users.json`).
//!
//! ## On-Disk Format
//! ```json
//! {
//!   "version": 1,
//!   "users": [
//!     { "username": "alice", "credential": "$argon2id$...", "service": "xray", ... }
//!   ]
//! }
//! ```
//!
//! ## Write Path
//! ```text
//! put("bob", rec)
//!   │
//!   ├─► clone current snapshot, apply change
//!   ├─► write_atomic(users.json, serialized clone)
//!   │      └─ fails? return StoreError, snapshot untouched
//!   └─► swap snapshot
//! ```

use std::path::{Path, PathBuf};

use boxvps_core::{UserMap, UserRecord, STORE_FORMAT_VERSION};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Serialize, Deserialize)]
struct UsersDocument {
    version: u32,
    users: UserMap,
}

/// Repository for user records.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    snapshot: RwLock<UserMap>,
    /// Serializes clone-modify-persist-swap
    write_gate: Mutex<()>,
}

impl UserStore {
    /// Opens the store, creating an empty `users.json` if none exists.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let users = match load(&path).await? {
            Some(users) => users,
            None => {
                info!(path = %path.display(), "Creating empty user store");
                let empty = UserMap::new();
                persist(&path, &empty).await?;
                empty
            }
        };

        debug!(path = %path.display(), users = users.len(), "User store opened");
        Ok(UserStore {
            path,
            snapshot: RwLock::new(users),
            write_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up one user in the committed snapshot.
    pub async fn get(&self, username: &str) -> Option<UserRecord> {
        self.snapshot.read().await.get(username).cloned()
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.snapshot.read().await.contains(username)
    }

    /// Returns a copy of the whole committed snapshot.
    pub async fn list(&self) -> UserMap {
        self.snapshot.read().await.clone()
    }

    /// Inserts or replaces a record. An existing user keeps its position.
    pub async fn put(&self, username: &str, record: UserRecord) -> StoreResult<()> {
        self.modify(|users| {
            users.insert(username, record);
        })
        .await
    }

    /// Removes a record, returning it if it existed.
    pub async fn delete(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        let mut removed = None;
        self.modify(|users| removed = users.remove(username)).await?;
        Ok(removed)
    }

    /// Re-reads `users.json`, replacing the snapshot.
    ///
    /// A missing file loads as an empty collection.
    pub async fn reload(&self) -> StoreResult<()> {
        let _gate = self.write_gate.lock().await;
        let users = load(&self.path).await?.unwrap_or_default();
        info!(path = %self.path.display(), users = users.len(), "User store reloaded");
        *self.snapshot.write().await = users;
        Ok(())
    }

    async fn modify<F>(&self, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut UserMap),
    {
        let _gate = self.write_gate.lock().await;
        let mut next = self.snapshot.read().await.clone();
        change(&mut next);

        if let Err(e) = persist(&self.path, &next).await {
            error!(path = %self.path.display(), error = %e, "User store write failed");
            return Err(e);
        }

        *self.snapshot.write().await = next;
        Ok(())
    }
}

async fn load(path: &Path) -> StoreResult<Option<UserMap>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let doc: UsersDocument =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::corrupt(path, e.to_string()))?;
    if doc.version != STORE_FORMAT_VERSION {
        return Err(StoreError::corrupt(
            path,
            format!("unsupported version {}", doc.version),
        ));
    }
    Ok(Some(doc.users))
}

async fn persist(path: &Path, users: &UserMap) -> StoreResult<()> {
    let doc = UsersDocument {
        version: STORE_FORMAT_VERSION,
        users: users.clone(),
    };
    let mut bytes = serde_json::to_vec_pretty(&doc).map_err(|e| StoreError::Serialize {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    bytes.push(b'\n');
    write_atomic(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxvps_core::ServiceKind;
    use chrono::Utc;

    fn record(service: ServiceKind) -> UserRecord {
        UserRecord::new("$argon2id$test".to_string(), service, Some(5), Utc::now())
    }

    #[tokio::test]
    async fn test_open_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/users.json");

        let store = UserStore::open(&path).await.unwrap();
        assert!(store.list().await.is_empty());

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk["version"], 1);
        assert_eq!(on_disk["users"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_put_get_delete_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");

        let store = UserStore::open(&path).await.unwrap();
        let alice = record(ServiceKind::Xray);
        store.put("alice", alice.clone()).await.unwrap();
        store.put("bob", record(ServiceKind::Ssh)).await.unwrap();
        assert_eq!(store.get("alice").await, Some(alice.clone()));

        let reopened = UserStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("alice").await, Some(alice.clone()));
        assert_eq!(reopened.list().await.len(), 2);

        assert_eq!(reopened.delete("alice").await.unwrap(), Some(alice));
        assert_eq!(reopened.delete("alice").await.unwrap(), None);

        let again = UserStore::open(&path).await.unwrap();
        assert!(!again.contains("alice").await);
        assert!(again.contains("bob").await);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_snapshot_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let path = data.join("users.json");

        let store = UserStore::open(&path).await.unwrap();
        store.put("alice", record(ServiceKind::Ssh)).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        // Block the temp file slot so the write cannot land
        std::fs::create_dir(data.join(".users.json.tmp")).unwrap();

        let err = store.put("bob", record(ServiceKind::Ssh)).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!store.contains("bob").await);
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_unknown_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"{"version": 99, "users": []}"#).unwrap();

        let err = UserStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_reload_picks_up_external_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = UserStore::open(&path).await.unwrap();

        let other = UserStore::open(dir.path().join("other.json")).await.unwrap();
        other.put("carol", record(ServiceKind::Xray)).await.unwrap();
        std::fs::copy(other.path(), &path).unwrap();

        assert!(!store.contains("carol").await);
        store.reload().await.unwrap();
        assert!(store.contains("carol").await);
    }
}
