//! # Service Topology
//!
//! Which backends are enabled, where they listen and which sub-protocols
//! are active. The engine never mutates a topology; it is built once from
//! configuration and passed by reference into every render call.
//!
//! ## Default Listeners
//! ```text
//! ┌──────────────────────┬───────────┬────────────────────────────────┐
//! │ Listener             │ Port      │ Notes                          │
//! ├──────────────────────┼───────────┼────────────────────────────────┤
//! │ OpenSSH              │ 22/tcp    │                                │
//! │ Dropbear             │ 143/tcp   │ add-on, off by default         │
//! │ Squid                │ 3128/tcp  │ add-on, off by default         │
//! │ udpgw                │ 7300/tcp  │ add-on, forwards to OpenSSH    │
//! │ SlowDNS              │ 5300/udp  │ add-on, forwards to OpenSSH    │
//! │ SSH websocket (nginx)│ 80/tcp    │ add-on, needs a domain         │
//! │ Xray VMess/VLESS/Tro │ N, N+1, N+2 (tcp), N = 10000              │
//! │ OpenVPN              │ 1194/udp  │                                │
//! │ OpenVPN websocket    │ 2086/tcp  │ needs a domain                 │
//! │ Argo (cloudflared)   │ outbound  │ tunnel to SSH and Xray, domain │
//! └──────────────────────┴───────────┴────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::BackendKind;
use crate::validation::{validate_port, ValidationResult};

// =============================================================================
// Defaults
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_ssh_port() -> u16 {
    22
}

fn default_xray_port() -> u16 {
    10000
}

fn default_openvpn_port() -> u16 {
    1194
}

fn default_dropbear() -> Toggle {
    Toggle::off(143)
}

fn default_squid() -> Toggle {
    Toggle::off(3128)
}

fn default_udpgw() -> Toggle {
    Toggle::off(7300)
}

fn default_slowdns() -> Toggle {
    Toggle::off(5300)
}

fn default_ssh_websocket() -> Toggle {
    Toggle::off(80)
}

fn default_ovpn_websocket() -> Toggle {
    Toggle::off(2086)
}

fn default_argo_credentials() -> PathBuf {
    PathBuf::from("/etc/cloudflared/credentials.json")
}

fn default_argo_xray_path() -> String {
    "/xray".to_string()
}

// =============================================================================
// Topology
// =============================================================================

/// An optional listener with its own port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle {
    #[serde(default)]
    pub enabled: bool,
    pub port: u16,
}

impl Toggle {
    pub const fn off(port: u16) -> Self {
        Toggle {
            enabled: false,
            port,
        }
    }

    pub const fn on(port: u16) -> Self {
        Toggle {
            enabled: true,
            port,
        }
    }
}

/// Complete, immutable description of the gateway's services.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceTopology {
    /// Public hostname used by websocket fronts
    #[serde(default)]
    pub domain: String,

    #[serde(default)]
    pub ssh: SshTopology,

    #[serde(default)]
    pub xray: XrayTopology,

    #[serde(default)]
    pub openvpn: OpenVpnTopology,

    #[serde(default)]
    pub l2tp: L2tpTopology,

    #[serde(default)]
    pub argo: ArgoTopology,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshTopology {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_dropbear")]
    pub dropbear: Toggle,
    #[serde(default = "default_squid")]
    pub squid: Toggle,
    #[serde(default = "default_udpgw")]
    pub udpgw: Toggle,
    #[serde(default = "default_slowdns")]
    pub slowdns: Toggle,
    #[serde(default = "default_ssh_websocket")]
    pub websocket: Toggle,
}

impl Default for SshTopology {
    fn default() -> Self {
        SshTopology {
            enabled: true,
            port: default_ssh_port(),
            dropbear: default_dropbear(),
            squid: default_squid(),
            udpgw: default_udpgw(),
            slowdns: default_slowdns(),
            websocket: default_ssh_websocket(),
        }
    }
}

/// Xray inbounds. VMess listens on `port`, VLESS on `port + 1`, Trojan on
/// `port + 2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrayTopology {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_xray_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub vmess: bool,
    #[serde(default)]
    pub vless: bool,
    #[serde(default)]
    pub trojan: bool,
}

impl Default for XrayTopology {
    fn default() -> Self {
        XrayTopology {
            enabled: true,
            port: default_xray_port(),
            vmess: true,
            vless: false,
            trojan: false,
        }
    }
}

impl XrayTopology {
    pub fn vmess_port(&self) -> u16 {
        self.port
    }

    pub fn vless_port(&self) -> u16 {
        self.port.saturating_add(1)
    }

    pub fn trojan_port(&self) -> u16 {
        self.port.saturating_add(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenVpnTopology {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_openvpn_port")]
    pub port: u16,
    #[serde(default)]
    pub protocol: Transport,
    #[serde(default = "default_ovpn_websocket")]
    pub websocket: Toggle,
}

impl Default for OpenVpnTopology {
    fn default() -> Self {
        OpenVpnTopology {
            enabled: false,
            port: default_openvpn_port(),
            protocol: Transport::Udp,
            websocket: default_ovpn_websocket(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct L2tpTopology {
    #[serde(default)]
    pub enabled: bool,
}

/// Cloudflare tunnel fronting SSH and Xray under `domain`.
///
/// The tunnel itself is created out of band (`cloudflared tunnel create`);
/// only its id and credentials file are referenced here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgoTopology {
    #[serde(default)]
    pub enabled: bool,
    /// Tunnel UUID or name
    #[serde(default)]
    pub tunnel: String,
    #[serde(default = "default_argo_credentials")]
    pub credentials_file: PathBuf,
    /// Path routed to the Xray VMess inbound; everything else goes to SSH
    #[serde(default = "default_argo_xray_path")]
    pub xray_path: String,
}

impl Default for ArgoTopology {
    fn default() -> Self {
        ArgoTopology {
            enabled: false,
            tunnel: String::new(),
            credentials_file: default_argo_credentials(),
            xray_path: default_argo_xray_path(),
        }
    }
}

impl ServiceTopology {
    /// Whether artifacts for this backend should be generated and applied.
    pub fn is_enabled(&self, backend: BackendKind) -> bool {
        match backend {
            BackendKind::Ssh => self.ssh.enabled,
            BackendKind::Xray => self.xray.enabled,
            BackendKind::OpenVpn => self.openvpn.enabled,
            BackendKind::L2tp => self.l2tp.enabled,
            BackendKind::Argo => self.argo.enabled,
        }
    }

    /// Enabled backends in apply order.
    pub fn enabled_backends(&self) -> impl Iterator<Item = BackendKind> + '_ {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.is_enabled(*kind))
    }

    /// Every enabled listener as `(name, transport, port)`.
    fn listeners(&self) -> Vec<(&'static str, Transport, u16)> {
        let mut out = Vec::new();
        if self.ssh.enabled {
            out.push(("ssh.port", Transport::Tcp, self.ssh.port));
            let addons = [
                ("ssh.dropbear", Transport::Tcp, self.ssh.dropbear),
                ("ssh.squid", Transport::Tcp, self.ssh.squid),
                ("ssh.udpgw", Transport::Tcp, self.ssh.udpgw),
                ("ssh.slowdns", Transport::Udp, self.ssh.slowdns),
                ("ssh.websocket", Transport::Tcp, self.ssh.websocket),
            ];
            for (name, transport, toggle) in addons {
                if toggle.enabled {
                    out.push((name, transport, toggle.port));
                }
            }
        }
        if self.xray.enabled {
            if self.xray.vmess {
                out.push(("xray.vmess", Transport::Tcp, self.xray.vmess_port()));
            }
            if self.xray.vless {
                out.push(("xray.vless", Transport::Tcp, self.xray.vless_port()));
            }
            if self.xray.trojan {
                out.push(("xray.trojan", Transport::Tcp, self.xray.trojan_port()));
            }
        }
        if self.openvpn.enabled {
            out.push(("openvpn.port", self.openvpn.protocol, self.openvpn.port));
            if self.openvpn.websocket.enabled {
                out.push(("openvpn.websocket", Transport::Tcp, self.openvpn.websocket.port));
            }
        }
        out
    }

    fn websocket_enabled(&self) -> bool {
        (self.ssh.enabled && self.ssh.websocket.enabled)
            || (self.openvpn.enabled && self.openvpn.websocket.enabled)
    }

    /// Checks the topology can be rendered.
    ///
    /// ## Rejected
    /// - Empty domain while a websocket front is enabled
    /// - Port 0 on an enabled listener
    /// - Xray base port above 65533 (its three inbounds need N..=N+2)
    /// - Two enabled listeners on the same port and transport
    pub fn validate(&self) -> ValidationResult<()> {
        if self.websocket_enabled() && self.domain.trim().is_empty() {
            return Err(ValidationError::required("topology.domain"));
        }

        if self.xray.enabled && self.xray.port > u16::MAX - 2 {
            return Err(ValidationError::OutOfRange {
                field: "topology.xray.port".to_string(),
                min: 1,
                max: (u16::MAX - 2) as u64,
            });
        }

        let mut seen: HashMap<(Transport, u16), &'static str> = HashMap::new();
        for (name, transport, port) in self.listeners() {
            validate_port(name, port)?;
            if let Some(other) = seen.insert((transport, port), name) {
                return Err(ValidationError::Duplicate {
                    field: format!("port ({other}, {name})"),
                    value: format!("{port}/{transport}"),
                });
            }
        }

        Ok(())
    }
}

// =============================================================================
// Artifact Layout
// =============================================================================

fn default_xray_config() -> PathBuf {
    PathBuf::from("/usr/local/etc/xray/config.json")
}

fn default_sshd_config() -> PathBuf {
    PathBuf::from("/etc/ssh/sshd_config")
}

fn default_dropbear_defaults() -> PathBuf {
    PathBuf::from("/etc/default/dropbear")
}

fn default_squid_config() -> PathBuf {
    PathBuf::from("/etc/squid/squid.conf")
}

fn default_systemd_dir() -> PathBuf {
    PathBuf::from("/etc/systemd/system")
}

fn default_nginx_dir() -> PathBuf {
    PathBuf::from("/etc/nginx/conf.d")
}

fn default_openvpn_dir() -> PathBuf {
    PathBuf::from("/etc/openvpn")
}

fn default_xl2tpd_config() -> PathBuf {
    PathBuf::from("/etc/xl2tpd/xl2tpd.conf")
}

fn default_ipsec_config() -> PathBuf {
    PathBuf::from("/etc/ipsec.conf")
}

fn default_cloudflared_config() -> PathBuf {
    PathBuf::from("/etc/cloudflared/config.yml")
}

/// Canonical on-disk locations of every generated artifact.
///
/// Tests point these at a temporary directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLayout {
    #[serde(default = "default_xray_config")]
    pub xray_config: PathBuf,
    #[serde(default = "default_sshd_config")]
    pub sshd_config: PathBuf,
    #[serde(default = "default_dropbear_defaults")]
    pub dropbear_defaults: PathBuf,
    #[serde(default = "default_squid_config")]
    pub squid_config: PathBuf,
    /// udpgw.service and slowdns.service go here
    #[serde(default = "default_systemd_dir")]
    pub systemd_dir: PathBuf,
    /// websocket.conf and ovpn-ws.conf go here
    #[serde(default = "default_nginx_dir")]
    pub nginx_dir: PathBuf,
    /// server.conf, PKI material and the status log live here
    #[serde(default = "default_openvpn_dir")]
    pub openvpn_dir: PathBuf,
    #[serde(default = "default_xl2tpd_config")]
    pub xl2tpd_config: PathBuf,
    #[serde(default = "default_ipsec_config")]
    pub ipsec_config: PathBuf,
    #[serde(default = "default_cloudflared_config")]
    pub cloudflared_config: PathBuf,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        ArtifactLayout {
            xray_config: default_xray_config(),
            sshd_config: default_sshd_config(),
            dropbear_defaults: default_dropbear_defaults(),
            squid_config: default_squid_config(),
            systemd_dir: default_systemd_dir(),
            nginx_dir: default_nginx_dir(),
            openvpn_dir: default_openvpn_dir(),
            xl2tpd_config: default_xl2tpd_config(),
            ipsec_config: default_ipsec_config(),
            cloudflared_config: default_cloudflared_config(),
        }
    }
}

impl ArtifactLayout {
    /// Places every artifact under `root`, keeping the default relative paths.
    pub fn rooted_at(root: &std::path::Path) -> Self {
        let under = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(&p));
        let d = ArtifactLayout::default();
        ArtifactLayout {
            xray_config: under(d.xray_config),
            sshd_config: under(d.sshd_config),
            dropbear_defaults: under(d.dropbear_defaults),
            squid_config: under(d.squid_config),
            systemd_dir: under(d.systemd_dir),
            nginx_dir: under(d.nginx_dir),
            openvpn_dir: under(d.openvpn_dir),
            xl2tpd_config: under(d.xl2tpd_config),
            ipsec_config: under(d.ipsec_config),
            cloudflared_config: under(d.cloudflared_config),
        }
    }

    pub fn openvpn_config(&self) -> PathBuf {
        self.openvpn_dir.join("server.conf")
    }

    pub fn openvpn_status_log(&self) -> PathBuf {
        self.openvpn_dir.join("openvpn-status.log")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topology_is_valid() {
        let topo = ServiceTopology::default();
        assert!(topo.validate().is_ok());
        let enabled: Vec<_> = topo.enabled_backends().collect();
        assert_eq!(enabled, vec![BackendKind::Ssh, BackendKind::Xray]);
    }

    #[test]
    fn test_websocket_requires_domain() {
        let mut topo = ServiceTopology::default();
        topo.ssh.websocket.enabled = true;
        assert!(matches!(
            topo.validate(),
            Err(ValidationError::Required { .. })
        ));

        topo.domain = "vpn.example.com".to_string();
        assert!(topo.validate().is_ok());
    }

    #[test]
    fn test_duplicate_ports_rejected() {
        let mut topo = ServiceTopology::default();
        topo.ssh.dropbear = Toggle::on(22);
        assert!(matches!(
            topo.validate(),
            Err(ValidationError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_same_port_different_transport_allowed() {
        let mut topo = ServiceTopology::default();
        topo.openvpn.enabled = true;
        topo.openvpn.port = 5300;
        topo.ssh.slowdns = Toggle::on(5300);
        // both udp
        assert!(topo.validate().is_err());

        topo.openvpn.protocol = Transport::Tcp;
        assert!(topo.validate().is_ok());
    }

    #[test]
    fn test_xray_port_range() {
        let mut topo = ServiceTopology::default();
        topo.xray.port = 65534;
        assert!(topo.validate().is_err());
        topo.xray.port = 0;
        assert!(topo.validate().is_err());
    }

    #[test]
    fn test_disabled_listeners_ignored() {
        let mut topo = ServiceTopology::default();
        topo.xray.enabled = false;
        topo.xray.port = 22;
        assert!(topo.validate().is_ok());
    }

    #[test]
    fn test_layout_rooted_at() {
        let layout = ArtifactLayout::rooted_at(std::path::Path::new("/tmp/x"));
        assert_eq!(
            layout.xray_config,
            PathBuf::from("/tmp/x/usr/local/etc/xray/config.json")
        );
        assert_eq!(
            layout.openvpn_config(),
            PathBuf::from("/tmp/x/etc/openvpn/server.conf")
        );
        assert_eq!(
            layout.cloudflared_config,
            PathBuf::from("/tmp/x/etc/cloudflared/config.yml")
        );
    }

    #[test]
    fn test_partial_topology_uses_defaults() {
        let topo: ServiceTopology = serde_json::from_str(r#"{"xray": {"trojan": true}}"#).unwrap();
        assert!(topo.xray.enabled);
        assert!(topo.xray.vmess);
        assert!(topo.xray.trojan);
        assert_eq!(topo.ssh.port, 22);
        assert!(!topo.argo.enabled);
        assert_eq!(topo.argo.xray_path, "/xray");
    }
}
