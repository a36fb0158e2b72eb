//! # Domain Types
//!
//! Core domain types used throughout BoxVPS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   UserRecord    │   │  UsageCounters  │   │    UserInfo     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  credential     │   │  upload         │   │  username       │       │
//! │  │  service        │   │  download       │   │  record         │       │
//! │  │  identity_token │   │  last_reset     │   │  usage          │       │
//! │  │  quota_gb       │   └─────────────────┘   └─────────────────┘       │
//! │  │  banned(_at)    │                                                    │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  ServiceKind    │   │  BackendKind    │   │    UserMap      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Ssh            │   │  Ssh   account  │   │  insertion-     │       │
//! │  │  Xray           │   │  Xray  identity │   │  ordered        │       │
//! │  └─────────────────┘   │  OpenVpn static │   │  username→rec   │       │
//! │                        │  L2tp    static │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Single Namespace
//! Usernames are unique across the whole store, regardless of which service
//! a user was created for. An SSH user `alice` and an Xray user `alice`
//! cannot coexist.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::quota;

// =============================================================================
// Service Kind
// =============================================================================

/// The service a user is created for.
///
/// This decides which backend carries the user and whether the record holds
/// an identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    /// Shell login account (OpenSSH and its add-ons, OpenVPN, L2TP via PAM)
    Ssh,
    /// Proxy client of the Xray daemon (VMess/VLESS/Trojan)
    Xray,
}

impl ServiceKind {
    /// Whether records of this kind carry an identity token.
    #[inline]
    pub const fn requires_identity_token(&self) -> bool {
        matches!(self, ServiceKind::Xray)
    }

    /// The backend whose artifact or accounts this service lives in.
    #[inline]
    pub const fn backend(&self) -> BackendKind {
        match self {
            ServiceKind::Ssh => BackendKind::Ssh,
            ServiceKind::Xray => BackendKind::Xray,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Ssh => "ssh",
            ServiceKind::Xray => "xray",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" | "openssh" => Ok(ServiceKind::Ssh),
            "xray" | "proxy" | "v2ray" => Ok(ServiceKind::Xray),
            _ => Err(ValidationError::NotAllowed {
                field: "service".to_string(),
                allowed: vec!["ssh".to_string(), "xray".to_string()],
            }),
        }
    }
}

// =============================================================================
// Backend Kind
// =============================================================================

/// Closed set of backends the engine generates artifacts for.
///
/// ## Lifecycles
/// ```text
/// Ssh      account-bearing   sshd_config + OS accounts (useradd/userdel)
/// Xray     identity-bearing  one JSON document listing active clients
/// OpenVpn  static daemon     server.conf, authenticates through PAM
/// L2tp     static daemon     xl2tpd.conf + ipsec.conf
/// Argo     static daemon     cloudflared tunnel ingress to SSH and Xray
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Ssh,
    Xray,
    OpenVpn,
    L2tp,
    Argo,
}

impl BackendKind {
    /// Every backend, in the fixed order the engine applies them.
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Ssh,
        BackendKind::Xray,
        BackendKind::OpenVpn,
        BackendKind::L2tp,
        BackendKind::Argo,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ssh => "ssh",
            BackendKind::Xray => "xray",
            BackendKind::OpenVpn => "openvpn",
            BackendKind::L2tp => "l2tp",
            BackendKind::Argo => "argo",
        }
    }

    /// Whether the artifact enumerates users by identity token.
    #[inline]
    pub const fn is_identity_bearing(&self) -> bool {
        matches!(self, BackendKind::Xray)
    }

    /// Whether users exist as OS accounts owned by the controller.
    #[inline]
    pub const fn is_account_bearing(&self) -> bool {
        matches!(self, BackendKind::Ssh)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// User Record
// =============================================================================

/// Durable record of one user and their entitlements.
///
/// The username is the key in [`UserMap`] and is not repeated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserRecord {
    /// Argon2 PHC string. Never the plaintext.
    pub credential: String,

    pub service: ServiceKind,

    /// Proxy client identifier, present iff `service` requires one
    #[ts(as = "Option<String>")]
    pub identity_token: Option<Uuid>,

    /// Immutable after creation
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Traffic quota in GB (2^30 bytes); `None` means unlimited
    pub quota_gb: Option<u64>,

    #[serde(default)]
    pub banned: bool,

    /// Set exactly when `banned` goes false → true
    #[ts(as = "Option<String>")]
    #[serde(default)]
    pub banned_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub login_attempts: u32,

    #[ts(as = "Option<String>")]
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Creates a fresh, unbanned record.
    ///
    /// The identity token is generated here for services that need one, so
    /// token presence always follows the service kind.
    pub fn new(
        credential: String,
        service: ServiceKind,
        quota_gb: Option<u64>,
        now: DateTime<Utc>,
    ) -> Self {
        let identity_token = service.requires_identity_token().then(Uuid::new_v4);
        UserRecord {
            credential,
            service,
            identity_token,
            created_at: now,
            quota_gb,
            banned: false,
            banned_at: None,
            locked: false,
            login_attempts: 0,
            last_login: None,
        }
    }

    /// Marks the user banned.
    ///
    /// Returns `true` if this call changed the state. Banning a banned user
    /// keeps the original `banned_at`.
    pub fn ban(&mut self, now: DateTime<Utc>) -> bool {
        if self.banned {
            return false;
        }
        self.banned = true;
        self.banned_at = Some(now);
        true
    }

    /// Clears the ban. Returns `true` if the user was banned.
    pub fn unban(&mut self) -> bool {
        let was_banned = self.banned;
        self.banned = false;
        self.banned_at = None;
        was_banned
    }

    /// Whether this user should appear in the given backend's client list.
    #[inline]
    pub fn is_active_on(&self, backend: BackendKind) -> bool {
        !self.banned && self.service.backend() == backend
    }
}

// =============================================================================
// User Map
// =============================================================================

/// One persisted user: the username plus its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
    #[serde(flatten)]
    pub record: UserRecord,
}

/// Insertion-ordered mapping of username → record.
///
/// Generated client lists follow this order, which keeps rendering
/// byte-identical across runs. Replacing an existing user keeps its slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserMap {
    entries: Vec<UserEntry>,
}

impl UserMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.entries
            .iter()
            .find(|e| e.username == username)
            .map(|e| &e.record)
    }

    pub fn get_mut(&mut self, username: &str) -> Option<&mut UserRecord> {
        self.entries
            .iter_mut()
            .find(|e| e.username == username)
            .map(|e| &mut e.record)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.get(username).is_some()
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn insert(&mut self, username: impl Into<String>, record: UserRecord) -> Option<UserRecord> {
        let username = username.into();
        match self.get_mut(&username) {
            Some(existing) => Some(std::mem::replace(existing, record)),
            None => {
                self.entries.push(UserEntry { username, record });
                None
            }
        }
    }

    pub fn remove(&mut self, username: &str) -> Option<UserRecord> {
        let idx = self.entries.iter().position(|e| e.username == username)?;
        Some(self.entries.remove(idx).record)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UserRecord)> {
        self.entries
            .iter()
            .map(|e| (e.username.as_str(), &e.record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Per-user traffic counters in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UsageCounters {
    pub upload: u64,
    pub download: u64,
    #[ts(as = "String")]
    pub last_reset: DateTime<Utc>,
}

impl UsageCounters {
    /// Zero counters starting at `now`.
    pub fn zero(now: DateTime<Utc>) -> Self {
        UsageCounters {
            upload: 0,
            download: 0,
            last_reset: now,
        }
    }

    /// upload + download, saturating.
    #[inline]
    pub fn total(&self) -> u64 {
        self.upload.saturating_add(self.download)
    }
}

/// What `get_user_info` returns: the record joined with its usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserInfo {
    pub username: String,
    pub record: UserRecord,
    pub usage: UsageCounters,
    /// Bytes left before the quota bans the user; `None` when unlimited
    pub remaining_bytes: Option<u64>,
}

impl UserInfo {
    pub fn new(username: impl Into<String>, record: UserRecord, usage: UsageCounters) -> Self {
        let remaining_bytes = quota::remaining_bytes(usage.total(), record.quota_gb);
        UserInfo {
            username: username.into(),
            record,
            usage,
            remaining_bytes,
        }
    }

    #[inline]
    pub fn usage_bytes(&self) -> u64 {
        self.usage.total()
    }
}

// =============================================================================
// Account Tasks
// =============================================================================

/// An OS account primitive that failed and still has to reach the host.
///
/// ```text
/// Deprovision   userdel failed after the record was removed; replayed by reconcile
/// Provision     useradd/chpasswd failed; needs the next credential change
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AccountTask {
    Provision,
    Deprovision,
}

/// A pending [`AccountTask`] and the backend owning the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingAccount {
    pub backend: BackendKind,
    pub task: AccountTask,
}

// =============================================================================
// Authentication Events
// =============================================================================

/// Reported by the authentication front-end after a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    LoginSucceeded,
    LoginFailed,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record(service: ServiceKind) -> UserRecord {
        UserRecord::new("hash".to_string(), service, None, Utc::now())
    }

    #[test]
    fn test_service_kind_aliases() {
        assert_eq!("proxy".parse::<ServiceKind>().unwrap(), ServiceKind::Xray);
        assert_eq!("V2Ray".parse::<ServiceKind>().unwrap(), ServiceKind::Xray);
        assert_eq!("openssh".parse::<ServiceKind>().unwrap(), ServiceKind::Ssh);
        assert!("openvpn".parse::<ServiceKind>().is_err());
    }

    #[test]
    fn test_identity_token_follows_service() {
        assert!(record(ServiceKind::Xray).identity_token.is_some());
        assert!(record(ServiceKind::Ssh).identity_token.is_none());
    }

    #[test]
    fn test_ban_keeps_original_timestamp() {
        let mut rec = record(ServiceKind::Xray);
        let first = Utc::now();
        assert!(rec.ban(first));
        assert!(!rec.ban(first + chrono::Duration::seconds(30)));
        assert_eq!(rec.banned_at, Some(first));

        assert!(rec.unban());
        assert!(rec.banned_at.is_none());
        assert!(!rec.unban());
    }

    #[test]
    fn test_user_map_keeps_insertion_order() {
        let mut map = UserMap::new();
        map.insert("carol", record(ServiceKind::Ssh));
        map.insert("alice", record(ServiceKind::Xray));
        map.insert("bob", record(ServiceKind::Xray));

        // Replacing keeps the slot
        let mut replaced = record(ServiceKind::Xray);
        replaced.quota_gb = Some(3);
        assert!(map.insert("alice", replaced).is_some());

        let names: Vec<&str> = map.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
        assert_eq!(map.get("alice").unwrap().quota_gb, Some(3));

        assert!(map.remove("carol").is_some());
        assert!(map.remove("carol").is_none());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_usernames_are_case_sensitive() {
        let mut map = UserMap::new();
        map.insert("Alice", record(ServiceKind::Ssh));
        assert!(!map.contains("alice"));
    }

    #[test]
    fn test_user_map_serializes_as_list() {
        let mut map = UserMap::new();
        map.insert("alice", record(ServiceKind::Ssh));

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json[0]["username"], "alice");
        assert_eq!(json[0]["service"], "ssh");

        let back: UserMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_user_info_remaining_quota() {
        let now = Utc::now();
        let mut usage = UsageCounters::zero(now);
        usage.upload = quota::GIB;

        let mut limited = record(ServiceKind::Xray);
        limited.quota_gb = Some(3);
        let info = UserInfo::new("alice", limited, usage);
        assert_eq!(info.remaining_bytes, Some(2 * quota::GIB));

        let unlimited = UserInfo::new("bob", record(ServiceKind::Ssh), usage);
        assert_eq!(unlimited.remaining_bytes, None);
    }
}
