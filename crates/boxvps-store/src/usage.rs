//! # Usage Store
//!
//! Per-user traffic counters (`usage.json`), kept apart from the user
//! collection so frequent counter updates never rewrite user records.
//!
//! ```json
//! {
//!   "version": 1,
//!   "counters": {
//!     "alice": { "upload": 4294967296, "download": 2147483648, "last_reset": "..." }
//!   }
//! }
//! ```
//!
//! Counters only grow through [`UsageStore::add`] and only return to zero
//! through [`UsageStore::reset`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use boxvps_core::{UsageCounters, STORE_FORMAT_VERSION};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};

type Counters = BTreeMap<String, UsageCounters>;

#[derive(Debug, Serialize, Deserialize)]
struct UsageDocument {
    version: u32,
    counters: Counters,
}

/// Repository for traffic counters.
#[derive(Debug)]
pub struct UsageStore {
    path: PathBuf,
    snapshot: RwLock<Counters>,
    write_gate: Mutex<()>,
}

impl UsageStore {
    /// Opens the store, creating an empty `usage.json` if none exists.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let counters = match load(&path).await? {
            Some(c) => c,
            None => {
                info!(path = %path.display(), "Creating empty usage store");
                let empty = Counters::new();
                persist(&path, &empty).await?;
                empty
            }
        };

        Ok(UsageStore {
            path,
            snapshot: RwLock::new(counters),
            write_gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counters for a user, or `None` if nothing was ever recorded.
    pub async fn get(&self, username: &str) -> Option<UsageCounters> {
        self.snapshot.read().await.get(username).copied()
    }

    /// Adds a traffic delta, starting from zero for unseen users.
    ///
    /// Returns the updated counters.
    pub async fn add(
        &self,
        username: &str,
        upload: u64,
        download: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<UsageCounters> {
        self.modify(|counters| {
            let entry = counters
                .entry(username.to_string())
                .or_insert_with(|| UsageCounters::zero(now));
            entry.upload = entry.upload.saturating_add(upload);
            entry.download = entry.download.saturating_add(download);
            *entry
        })
        .await
    }

    /// Zeroes a user's counters and stamps `last_reset`.
    pub async fn reset(&self, username: &str, now: DateTime<Utc>) -> StoreResult<UsageCounters> {
        self.modify(|counters| {
            let fresh = UsageCounters::zero(now);
            counters.insert(username.to_string(), fresh);
            fresh
        })
        .await
    }

    /// Drops a user's counters. No-op (and no write) if there are none.
    pub async fn remove(&self, username: &str) -> StoreResult<()> {
        if self.get(username).await.is_none() {
            return Ok(());
        }
        self.modify(|counters| {
            counters.remove(username);
        })
        .await
    }

    pub async fn reload(&self) -> StoreResult<()> {
        let _gate = self.write_gate.lock().await;
        let counters = load(&self.path).await?.unwrap_or_default();
        info!(path = %self.path.display(), users = counters.len(), "Usage store reloaded");
        *self.snapshot.write().await = counters;
        Ok(())
    }

    async fn modify<F, T>(&self, change: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Counters) -> T,
    {
        let _gate = self.write_gate.lock().await;
        let mut next = self.snapshot.read().await.clone();
        let out = change(&mut next);

        if let Err(e) = persist(&self.path, &next).await {
            error!(path = %self.path.display(), error = %e, "Usage store write failed");
            return Err(e);
        }

        *self.snapshot.write().await = next;
        Ok(out)
    }
}

async fn load(path: &Path) -> StoreResult<Option<Counters>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let doc: UsageDocument =
        serde_json::from_slice(&bytes).map_err(|e| StoreError::corrupt(path, e.to_string()))?;
    if doc.version != STORE_FORMAT_VERSION {
        return Err(StoreError::corrupt(
            path,
            format!("unsupported version {}", doc.version),
        ));
    }
    debug!(path = %path.display(), users = doc.counters.len(), "Usage counters loaded");
    Ok(Some(doc.counters))
}

async fn persist(path: &Path, counters: &Counters) -> StoreResult<()> {
    let doc = UsageDocument {
        version: STORE_FORMAT_VERSION,
        counters: counters.clone(),
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
    use boxvps_core::quota::GIB;

    #[tokio::test]
    async fn test_add_accumulates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.json");
        let store = UsageStore::open(&path).await.unwrap();
        let now = Utc::now();

        assert!(store.get("alice").await.is_none());
        store.add("alice", 4 * GIB, 0, now).await.unwrap();
        let counters = store.add("alice", 0, 2 * GIB, now).await.unwrap();
        assert_eq!(counters.total(), 6 * GIB);

        let reopened = UsageStore::open(&path).await.unwrap();
        let counters = reopened.get("alice").await.unwrap();
        assert_eq!(counters.upload, 4 * GIB);
        assert_eq!(counters.download, 2 * GIB);
    }

    #[tokio::test]
    async fn test_reset_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path().join("usage.json")).await.unwrap();
        let start = Utc::now();

        store.add("bob", 10, 20, start).await.unwrap();
        let later = start + chrono::Duration::hours(1);
        let reset = store.reset("bob", later).await.unwrap();
        assert_eq!(reset.total(), 0);
        assert_eq!(reset.last_reset, later);

        store.remove("bob").await.unwrap();
        assert!(store.get("bob").await.is_none());
        // Removing again is a no-op
        store.remove("bob").await.unwrap();
    }

    #[tokio::test]
    async fn test_counters_saturate() {
        let dir = tempfile::tempdir().unwrap();
        let store = UsageStore::open(dir.path().join("usage.json")).await.unwrap();
        store.add("carol", u64::MAX, 0, Utc::now()).await.unwrap();
        let counters = store.add("carol", 5, u64::MAX, Utc::now()).await.unwrap();
        assert_eq!(counters.upload, u64::MAX);
        assert_eq!(counters.total(), u64::MAX);
    }
}
