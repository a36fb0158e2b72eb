//! # boxvps-engine: Orchestration Engine for BoxVPS
//!
//! Turns administrative operations into store mutations, regenerated backend
//! artifacts, service restarts and OS account changes.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Engine Operation                               │
//! │                                                                         │
//! │  add_user / ban_user / delete_user / change_identity_token / ...       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌────────────┐   ┌──────────────────┐   ┌──────────────────────────┐  │
//! │  │ Validation │──►│ UserStore /      │──►│ boxvps_core::render      │  │
//! │  │ (core)     │   │ UsageStore       │   │ one artifact per backend │  │
//! │  └────────────┘   │ (write gate held)│   └────────────┬─────────────┘  │
//! │                   └──────────────────┘                │                │
//! │                                                       ▼                │
//! │                   ┌──────────────────────────────────────────────────┐ │
//! │                   │ Controller                                       │ │
//! │                   │  write_atomic + systemctl restart                │ │
//! │                   │  useradd / chpasswd / userdel / usermod          │ │
//! │                   └────────────────────────┬─────────────────────────┘ │
//! │                                            ▼                           │
//! │                   Committed  |  Degraded { failures } + pending set    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `Engine` and `OperationOutcome`
//! - [`controller`] - Artifact apply and account primitives
//! - [`system`] - `SystemRunner` seam over external commands
//! - [`usage`] - Usage counters and quota evaluation
//! - [`status`] - Resources, service states, session counts
//! - [`backup`] - tar.gz archives of state and backend config
//! - [`credential`] - Argon2 credential hashing
//! - [`config`] - `GatewayConfig` (TOML + environment)
//! - [`error`] - `EngineError` and `ApplyError`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use boxvps_core::ServiceKind;
//! use boxvps_engine::{Engine, GatewayConfig, ProcessRunner};
//!
//! let config = GatewayConfig::load(None)?;
//! let engine = Engine::open(config, Arc::new(ProcessRunner)).await?;
//!
//! let outcome = engine.add_user("alice", "s3cret-pw", ServiceKind::Xray, Some(50)).await?;
//! if !outcome.is_committed() {
//!     // Stored, but some backend is behind; retry later or reconcile
//!     engine.reconcile().await?;
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod config;
pub mod controller;
pub mod credential;
pub mod engine;
pub mod error;
pub mod status;
pub mod system;
pub mod usage;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::GatewayConfig;
pub use controller::Controller;
pub use engine::{Engine, OperationOutcome};
pub use error::{ApplyError, EngineError, EngineResult};
pub use status::{InterfaceAddress, ResourceSnapshot, ServiceState, SessionCount, SystemStatus};
pub use system::{CommandOutcome, CommandSpec, ProcessRunner, SystemRunner};
pub use usage::UsageTracker;

use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=boxvps_engine=trace` - Show command traces
/// - Default: INFO, DEBUG for boxvps crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,boxvps_engine=debug,boxvps_store=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
