//! # Usage & Quota Tracker
//!
//! Accumulates traffic per user and evaluates quota, independent of which
//! backend carried the traffic.
//!
//! ```text
//! add_usage(alice, up, down) ──► UsageStore (usage.json)
//!
//! is_over_quota(alice)
//!   ├─ quota_gb  ◄── UserStore, read at call time
//!   ├─ counters  ◄── UsageStore (none yet = zero)
//!   └─ upload + download >= quota_gb × 2^30
//! ```

use std::sync::Arc;

use boxvps_core::quota;
use boxvps_core::UsageCounters;
use boxvps_store::{UsageStore, UserStore};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Reads and updates per-user counters.
///
/// Mutating calls are expected to run under the engine's write gate.
#[derive(Clone)]
pub struct UsageTracker {
    users: Arc<UserStore>,
    usage: Arc<UsageStore>,
}

impl UsageTracker {
    pub fn new(users: Arc<UserStore>, usage: Arc<UsageStore>) -> Self {
        UsageTracker { users, usage }
    }

    async fn ensure_user(&self, username: &str) -> EngineResult<()> {
        if self.users.contains(username).await {
            Ok(())
        } else {
            Err(EngineError::not_found(username))
        }
    }

    /// Adds an incremental traffic delta.
    pub async fn add_usage(
        &self,
        username: &str,
        upload: u64,
        download: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<UsageCounters> {
        self.ensure_user(username).await?;
        let counters = self.usage.add(username, upload, download, now).await?;
        debug!(username, upload, download, total = counters.total(), "Usage recorded");
        Ok(counters)
    }

    /// Current counters. A user with nothing recorded reads as zero.
    pub async fn get_usage(&self, username: &str, now: DateTime<Utc>) -> EngineResult<UsageCounters> {
        self.ensure_user(username).await?;
        Ok(self.counters_or_zero(username, now).await)
    }

    pub(crate) async fn counters_or_zero(&self, username: &str, now: DateTime<Utc>) -> UsageCounters {
        self.usage
            .get(username)
            .await
            .unwrap_or_else(|| UsageCounters::zero(now))
    }

    /// Zeroes the counters and stamps `last_reset`.
    pub async fn reset_usage(&self, username: &str, now: DateTime<Utc>) -> EngineResult<UsageCounters> {
        self.ensure_user(username).await?;
        Ok(self.usage.reset(username, now).await?)
    }

    /// Whether the user has reached their quota. Unlimited users never have.
    pub async fn is_over_quota(&self, username: &str) -> EngineResult<bool> {
        let record = self
            .users
            .get(username)
            .await
            .ok_or_else(|| EngineError::not_found(username))?;
        let used = self.usage.get(username).await.map(|c| c.total()).unwrap_or(0);
        Ok(quota::is_over_quota(used, record.quota_gb))
    }

    /// Drops a deleted user's counters.
    pub async fn forget(&self, username: &str) -> EngineResult<()> {
        Ok(self.usage.remove(username).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxvps_core::quota::GIB;
    use boxvps_core::{ServiceKind, UserRecord};

    async fn tracker(dir: &std::path::Path) -> UsageTracker {
        let users = Arc::new(UserStore::open(dir.join("users.json")).await.unwrap());
        let usage = Arc::new(UsageStore::open(dir.join("usage.json")).await.unwrap());
        UsageTracker::new(users, usage)
    }

    async fn add_user(t: &UsageTracker, name: &str, quota_gb: Option<u64>) {
        let rec = UserRecord::new("h".to_string(), ServiceKind::Xray, quota_gb, Utc::now());
        t.users.put(name, rec).await.unwrap();
    }

    #[tokio::test]
    async fn test_quota_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path()).await;
        add_user(&t, "alice", Some(2)).await;
        let now = Utc::now();

        t.add_usage("alice", 2 * GIB - 1, 0, now).await.unwrap();
        assert!(!t.is_over_quota("alice").await.unwrap());

        t.add_usage("alice", 0, 1, now).await.unwrap();
        assert!(t.is_over_quota("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_quota_read_at_call_time() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path()).await;
        add_user(&t, "bob", Some(1)).await;
        t.add_usage("bob", GIB, 0, Utc::now()).await.unwrap();
        assert!(t.is_over_quota("bob").await.unwrap());

        let mut rec = t.users.get("bob").await.unwrap();
        rec.quota_gb = Some(10);
        t.users.put("bob", rec).await.unwrap();
        assert!(!t.is_over_quota("bob").await.unwrap());

        let mut rec = t.users.get("bob").await.unwrap();
        rec.quota_gb = None;
        t.users.put("bob", rec).await.unwrap();
        assert!(!t.is_over_quota("bob").await.unwrap());
    }

    #[tokio::test]
    async fn test_untracked_user_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path()).await;
        add_user(&t, "carol", Some(1)).await;

        let counters = t.get_usage("carol", Utc::now()).await.unwrap();
        assert_eq!(counters.total(), 0);
        assert!(!t.is_over_quota("carol").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path()).await;
        assert!(matches!(
            t.add_usage("ghost", 1, 1, Utc::now()).await,
            Err(EngineError::NotFound { .. })
        ));
        assert!(matches!(
            t.is_over_quota("ghost").await,
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset() {
        let dir = tempfile::tempdir().unwrap();
        let t = tracker(dir.path()).await;
        add_user(&t, "dave", Some(1)).await;
        t.add_usage("dave", GIB, GIB, Utc::now()).await.unwrap();
        assert!(t.is_over_quota("dave").await.unwrap());

        t.reset_usage("dave", Utc::now()).await.unwrap();
        assert!(!t.is_over_quota("dave").await.unwrap());
    }
}
