//! # Protocol Config Generator
//!
//! Pure functions that turn the user map and topology into each backend's
//! complete desired configuration. Every call produces the whole artifact,
//! never a diff.
//!
//! ## Render Pipeline
//! ```text
//! ┌──────────────┐   ┌──────────────────┐
//! │   UserMap    │   │ ServiceTopology  │
//! │ (snapshot)   │   │ + ArtifactLayout │
//! └──────┬───────┘   └────────┬─────────┘
//!        │                    │
//!        └─────────┬──────────┘
//!                  ▼
//!        render(BackendKind, ...)
//!                  │
//!     ┌────────────┼─────────────┬──────────────┬─────────────┐
//!     ▼            ▼             ▼              ▼             ▼
//!  ssh::render  xray::render  openvpn::render  l2tp::render  argo::render
//!     │            │             │              │             │
//!     └────────────┴──────┬──────┴──────────────┴─────────────┘
//!                         ▼
//!            Artifact { files, units }
//! ```
//!
//! ## Idempotence
//! Rendering twice from the same input is byte-identical. Client lists
//! follow the insertion order of the [`UserMap`], and structured documents
//! are serialized from structs with a fixed field order.

use std::path::PathBuf;

use crate::error::RenderError;
use crate::topology::{ArtifactLayout, ServiceTopology};
use crate::types::{BackendKind, UserMap};

pub mod argo;
pub mod l2tp;
pub mod openvpn;
pub mod ssh;
pub mod xray;

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// One file of an artifact, with its full contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub contents: String,
}

impl ArtifactFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        ArtifactFile {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// A backend's complete desired configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub backend: BackendKind,
    /// Files to write, in write order
    pub files: Vec<ArtifactFile>,
    /// systemd units to restart after writing, in restart order
    pub units: Vec<String>,
}

impl Artifact {
    pub fn new(backend: BackendKind) -> Self {
        Artifact {
            backend,
            files: Vec::new(),
            units: Vec::new(),
        }
    }

    pub fn file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.push(ArtifactFile::new(path, contents));
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.units.push(unit.to_string());
        self
    }
}

/// Renders one backend's artifact.
///
/// Dispatches on the backend tag; each backend module owns its format.
pub fn render(
    kind: BackendKind,
    users: &UserMap,
    topology: &ServiceTopology,
    layout: &ArtifactLayout,
) -> RenderResult<Artifact> {
    match kind {
        BackendKind::Ssh => ssh::render(topology, layout),
        BackendKind::Xray => xray::render(users, topology, layout),
        BackendKind::OpenVpn => openvpn::render(topology, layout),
        BackendKind::L2tp => l2tp::render(layout),
        BackendKind::Argo => argo::render(topology, layout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServiceKind, UserRecord};
    use chrono::Utc;

    #[test]
    fn test_every_backend_renders_twice_identically() {
        let mut users = UserMap::new();
        for (name, service) in [("alice", ServiceKind::Xray), ("bob", ServiceKind::Ssh)] {
            users.insert(
                name,
                UserRecord::new("hash".to_string(), service, None, Utc::now()),
            );
        }

        let mut topo = ServiceTopology {
            domain: "gw.example.com".to_string(),
            ..Default::default()
        };
        topo.openvpn.enabled = true;
        topo.openvpn.websocket.enabled = true;
        topo.l2tp.enabled = true;
        topo.ssh.websocket.enabled = true;
        topo.argo.enabled = true;
        topo.argo.tunnel = "boxvps".to_string();
        let layout = ArtifactLayout::default();

        for kind in BackendKind::ALL {
            let first = render(kind, &users, &topo, &layout).unwrap();
            let second = render(kind, &users, &topo, &layout).unwrap();
            assert_eq!(first, second, "{kind} artifact is not stable");
            assert_eq!(first.backend, kind);
            assert!(!first.files.is_empty());
            assert!(!first.units.is_empty());
        }
    }
}
