//! # boxvps-core: Pure Domain Logic for BoxVPS
//!
//! This crate is the **heart** of the BoxVPS gateway. It contains the user
//! model, the service topology and the artifact renderers as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BoxVPS Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Admin front-ends (CLI, bot, HTTP)                  │   │
//! │  │      add_user, ban_user, set_quota, backup, restore, ...        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          boxvps-engine (orchestration + controller)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ boxvps-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ topology  │  │  render   │  │ validation│  │   │
//! │  │   │UserRecord │  │ ports     │  │ xray.json │  │ username  │  │   │
//! │  │   │ UserMap   │  │ toggles   │  │ sshd_conf │  │ credential│  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO PROCESSES • NO CLOCK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 boxvps-store (persistence)                      │   │
//! │  │               users.json, usage.json (atomic)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (UserRecord, UserMap, ServiceKind, BackendKind)
//! - [`topology`] - Immutable service topology and artifact layout
//! - [`render`] - Backend config artifact generation
//! - [`quota`] - Byte quota arithmetic
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use boxvps_core::quota::{is_over_quota, GIB};
//!
//! // 5 GB quota, 6 GB used
//! assert!(is_over_quota(6 * GIB, Some(5)));
//!
//! // No quota means unlimited
//! assert!(!is_over_quota(u64::MAX, None));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod quota;
pub mod render;
pub mod topology;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{RenderError, ValidationError};
pub use render::{render, Artifact, ArtifactFile};
pub use topology::{ArtifactLayout, ServiceTopology};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum username length.
///
/// Usernames double as Linux login names for SSH users, and `useradd`
/// rejects names longer than 32 characters.
pub const MAX_USERNAME_LEN: usize = 32;

/// Minimum credential length accepted from administrators.
pub const MIN_CREDENTIAL_LEN: usize = 4;

/// Maximum credential length accepted from administrators.
pub const MAX_CREDENTIAL_LEN: usize = 128;

/// Largest quota an administrator may assign, in GB.
pub const MAX_QUOTA_GB: u64 = 1_000_000;

/// Version written into `users.json` and `usage.json`.
pub const STORE_FORMAT_VERSION: u32 = 1;
