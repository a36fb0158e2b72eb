//! Argo tunnel artifact: cloudflared's `config.yml`.
//!
//! ```text
//! tunnel: <id>
//! credentials-file: /etc/cloudflared/credentials.json
//! ingress:
//!   - hostname: gw.example.com        path /xray ──► Xray VMess inbound
//!   - hostname: gw.example.com        anything else ──► OpenSSH
//!   - service: http_status:404        catch-all cloudflared requires
//! ```

use std::fmt::Write;

use super::{Artifact, RenderResult};
use crate::error::RenderError;
use crate::topology::{ArtifactLayout, ServiceTopology};
use crate::types::BackendKind;

pub const UNIT: &str = "cloudflared";

fn invalid(reason: &str) -> RenderError {
    RenderError::InvalidTopology {
        backend: BackendKind::Argo,
        reason: reason.to_string(),
    }
}

pub fn render(topology: &ServiceTopology, layout: &ArtifactLayout) -> RenderResult<Artifact> {
    let argo = &topology.argo;
    let domain = topology.domain.trim();
    if argo.tunnel.trim().is_empty() {
        return Err(invalid("argo.tunnel is empty"));
    }
    if domain.is_empty() {
        return Err(invalid("domain is required for tunnel ingress"));
    }
    if !topology.ssh.enabled && !topology.xray.enabled {
        return Err(invalid("neither ssh nor xray is enabled"));
    }

    let mut doc = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(doc, "tunnel: {}", argo.tunnel.trim());
    let _ = writeln!(doc, "credentials-file: {}", argo.credentials_file.display());
    doc.push_str("ingress:\n");
    if topology.xray.enabled {
        let _ = writeln!(doc, "  - hostname: {domain}");
        let _ = writeln!(doc, "    path: {}", argo.xray_path);
        let _ = writeln!(doc, "    service: http://localhost:{}", topology.xray.vmess_port());
    }
    if topology.ssh.enabled {
        let _ = writeln!(doc, "  - hostname: {domain}");
        let _ = writeln!(doc, "    service: http://localhost:{}", topology.ssh.port);
    }
    doc.push_str("  - service: http_status:404\n");

    Ok(Artifact::new(BackendKind::Argo)
        .file(&layout.cloudflared_config, doc)
        .unit(UNIT))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> ServiceTopology {
        let mut topo = ServiceTopology {
            domain: "gw.example.com".to_string(),
            ..Default::default()
        };
        topo.argo.enabled = true;
        topo.argo.tunnel = "6ff42ae2-765d-4adf-8112-31c55c1551ef".to_string();
        topo
    }

    #[test]
    fn test_ingress_routes_xray_then_ssh() {
        let layout = ArtifactLayout::default();
        let artifact = render(&topology(), &layout).unwrap();
        assert_eq!(artifact.units, vec!["cloudflared"]);
        assert_eq!(artifact.files[0].path, layout.cloudflared_config);

        let doc = &artifact.files[0].contents;
        assert!(doc.starts_with("tunnel: 6ff42ae2-765d-4adf-8112-31c55c1551ef\n"));
        assert!(doc.contains("credentials-file: /etc/cloudflared/credentials.json\n"));
        let xray = doc.find("service: http://localhost:10000").unwrap();
        let ssh = doc.find("service: http://localhost:22\n").unwrap();
        assert!(xray < ssh);
        assert!(doc.ends_with("  - service: http_status:404\n"));
    }

    #[test]
    fn test_disabled_xray_is_not_routed() {
        let mut topo = topology();
        topo.xray.enabled = false;
        let artifact = render(&topo, &ArtifactLayout::default()).unwrap();
        assert!(!artifact.files[0].contents.contains("path: /xray"));
    }

    #[test]
    fn test_missing_tunnel_or_domain() {
        let mut topo = topology();
        topo.argo.tunnel.clear();
        assert!(matches!(
            render(&topo, &ArtifactLayout::default()),
            Err(RenderError::InvalidTopology { backend: BackendKind::Argo, .. })
        ));

        let mut topo = topology();
        topo.domain = "  ".to_string();
        assert!(render(&topo, &ArtifactLayout::default()).is_err());
    }
}
