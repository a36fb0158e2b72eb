//! # boxvps-store: Durable State for BoxVPS
//!
//! The single source of truth for users and their traffic counters.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BoxVPS Data Flow                                 │
//! │                                                                         │
//! │  Engine operation (add_user, ban_user, add_usage, ...)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   boxvps-store (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   UserStore   │    │  UsageStore   │    │ write_atomic │  │   │
//! │  │   │ (users.rs)    │    │ (usage.rs)    │    │ (atomic.rs)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ RwLock<Map>   │───►│ RwLock<Map>   │───►│ tmp + fsync  │  │   │
//! │  │   │ snapshot      │    │ snapshot      │    │ + rename     │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  /etc/boxvps/data/users.json, /etc/boxvps/data/usage.json              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crash Consistency
//! Every write serializes the complete document to a temp file in the same
//! directory, syncs it and renames it over the target. After a crash the
//! file holds either the old document or the new one, never a mix.
//!
//! ## Concurrency
//! Stores do not lock across processes. The engine is the single writer and
//! serializes mutations itself; readers get the last committed snapshot.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod atomic;
pub mod error;
pub mod tasks;
pub mod usage;
pub mod users;

// =============================================================================
// Re-exports
// =============================================================================

pub use atomic::write_atomic;
pub use error::{StoreError, StoreResult};
pub use tasks::AccountTaskStore;
pub use usage::UsageStore;
pub use users::UserStore;

/// File name of the user collection inside the data directory.
pub const USERS_FILE: &str = "users.json";

/// File name of the usage counters inside the data directory.
pub const USAGE_FILE: &str = "usage.json";

/// File name of the outstanding account tasks inside the data directory.
pub const ACCOUNT_TASKS_FILE: &str = "account_tasks.json";
