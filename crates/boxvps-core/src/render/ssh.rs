//! SSH artifacts: sshd_config plus the optional add-on listeners.
//!
//! Users are never enumerated here. SSH users exist as OS accounts, which
//! the controller provisions directly.

use super::{Artifact, RenderResult};
use crate::topology::{ArtifactLayout, ServiceTopology};
use crate::types::BackendKind;

fn sshd_config(port: u16) -> String {
    format!(
        "Port {port}\n\
         PermitRootLogin no\n\
         PasswordAuthentication yes\n\
         X11Forwarding no\n\
         MaxSessions 1\n\
         ClientAliveInterval 60\n\
         ClientAliveCountMax 3\n"
    )
}

fn dropbear_defaults(port: u16) -> String {
    format!("DROPBEAR_PORT={port}\nDROPBEAR_EXTRA_ARGS=\"-w -g\"\n")
}

fn squid_config(port: u16) -> String {
    format!("http_port {port}\nvisible_hostname boxvps\n")
}

/// A forwarding daemon unit that relays to the OpenSSH port.
fn forwarder_unit(description: &str, binary: &str, listen: u16, ssh_port: u16) -> String {
    format!(
        "[Unit]\n\
         Description={description}\n\
         After=network.target\n\
         \n\
         [Service]\n\
         ExecStart=/usr/bin/{binary} -l {listen} -s 127.0.0.1:{ssh_port}\n\
         Restart=always\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n"
    )
}

/// nginx site proxying websocket upgrades on `listen` to `upstream`.
pub(crate) fn websocket_site(listen: u16, domain: &str, location: &str, upstream: u16) -> String {
    format!(
        "server {{\n\
         \x20   listen {listen};\n\
         \x20   server_name {domain};\n\
         \n\
         \x20   location {location} {{\n\
         \x20       proxy_pass http://127.0.0.1:{upstream};\n\
         \x20       proxy_http_version 1.1;\n\
         \x20       proxy_set_header Upgrade $http_upgrade;\n\
         \x20       proxy_set_header Connection \"upgrade\";\n\
         \x20       proxy_set_header Host $host;\n\
         \x20       proxy_set_header X-Real-IP $remote_addr;\n\
         \x20       proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\
         \x20       proxy_set_header X-Forwarded-Proto $scheme;\n\
         \x20   }}\n\
         }}\n"
    )
}

pub fn render(topology: &ServiceTopology, layout: &ArtifactLayout) -> RenderResult<Artifact> {
    let ssh = &topology.ssh;
    let mut artifact = Artifact::new(BackendKind::Ssh)
        .file(&layout.sshd_config, sshd_config(ssh.port))
        .unit("sshd");

    if ssh.dropbear.enabled {
        artifact = artifact
            .file(&layout.dropbear_defaults, dropbear_defaults(ssh.dropbear.port))
            .unit("dropbear");
    }
    if ssh.squid.enabled {
        artifact = artifact
            .file(&layout.squid_config, squid_config(ssh.squid.port))
            .unit("squid");
    }
    if ssh.udpgw.enabled {
        artifact = artifact
            .file(
                layout.systemd_dir.join("udpgw.service"),
                forwarder_unit("UDPGW Service", "udpgw", ssh.udpgw.port, ssh.port),
            )
            .unit("udpgw");
    }
    if ssh.slowdns.enabled {
        artifact = artifact
            .file(
                layout.systemd_dir.join("slowdns.service"),
                forwarder_unit("SlowDNS Service", "slowdns", ssh.slowdns.port, ssh.port),
            )
            .unit("slowdns");
    }
    if ssh.websocket.enabled {
        artifact = artifact
            .file(
                layout.nginx_dir.join("websocket.conf"),
                websocket_site(ssh.websocket.port, &topology.domain, "/", ssh.port),
            )
            .unit("nginx");
    }

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Toggle;

    #[test]
    fn test_plain_sshd() {
        let artifact = render(&ServiceTopology::default(), &ArtifactLayout::default()).unwrap();
        assert_eq!(artifact.files.len(), 1);
        assert_eq!(artifact.units, vec!["sshd".to_string()]);

        let conf = &artifact.files[0].contents;
        assert!(conf.starts_with("Port 22\n"));
        assert!(conf.contains("PermitRootLogin no\n"));
        assert!(conf.contains("ClientAliveCountMax 3\n"));
    }

    #[test]
    fn test_addons_forward_to_ssh_port() {
        let mut topo = ServiceTopology {
            domain: "gw.example.com".to_string(),
            ..Default::default()
        };
        topo.ssh.port = 2222;
        topo.ssh.dropbear = Toggle::on(143);
        topo.ssh.udpgw = Toggle::on(7300);
        topo.ssh.slowdns = Toggle::on(5300);
        topo.ssh.websocket = Toggle::on(80);

        let layout = ArtifactLayout::default();
        let artifact = render(&topo, &layout).unwrap();
        assert_eq!(
            artifact.units,
            vec!["sshd", "dropbear", "udpgw", "slowdns", "nginx"]
        );

        let udpgw = artifact
            .files
            .iter()
            .find(|f| f.path == layout.systemd_dir.join("udpgw.service"))
            .unwrap();
        assert!(udpgw
            .contents
            .contains("ExecStart=/usr/bin/udpgw -l 7300 -s 127.0.0.1:2222\n"));

        let site = artifact.files.last().unwrap();
        assert!(site.contents.contains("    listen 80;\n"));
        assert!(site.contents.contains("server_name gw.example.com;"));
        assert!(site.contents.contains("proxy_pass http://127.0.0.1:2222;"));
    }
}
