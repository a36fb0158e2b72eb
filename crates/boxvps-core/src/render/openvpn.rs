//! OpenVPN server artifact.
//!
//! OpenVPN clients log in with their SSH account credentials through the
//! PAM plugin, so no per-user file is generated.

use super::ssh::websocket_site;
use super::{Artifact, RenderResult};
use crate::topology::{ArtifactLayout, ServiceTopology};
use crate::types::BackendKind;

const PAM_PLUGIN: &str = "/usr/lib/openvpn/openvpn-plugin-auth-pam.so";

fn server_conf(topology: &ServiceTopology, layout: &ArtifactLayout) -> String {
    let ovpn = &topology.openvpn;
    let dir = layout.openvpn_dir.display();
    let status = layout.openvpn_status_log();
    format!(
        "port {port}\n\
         proto {proto}\n\
         dev tun\n\
         ca {dir}/ca.crt\n\
         cert {dir}/server.crt\n\
         key {dir}/server.key\n\
         dh {dir}/dh.pem\n\
         server 10.8.0.0 255.255.255.0\n\
         push \"redirect-gateway def1 bypass-dhcp\"\n\
         push \"dhcp-option DNS 8.8.8.8\"\n\
         push \"dhcp-option DNS 8.8.4.4\"\n\
         keepalive 10 120\n\
         cipher AES-256-CBC\n\
         plugin {PAM_PLUGIN} login\n\
         verify-client-cert none\n\
         username-as-common-name\n\
         user nobody\n\
         group nogroup\n\
         persist-key\n\
         persist-tun\n\
         status {status}\n\
         verb 3\n",
        port = ovpn.port,
        proto = ovpn.protocol,
        status = status.display(),
    )
}

pub fn render(topology: &ServiceTopology, layout: &ArtifactLayout) -> RenderResult<Artifact> {
    let ovpn = &topology.openvpn;
    let mut artifact = Artifact::new(BackendKind::OpenVpn)
        .file(layout.openvpn_config(), server_conf(topology, layout))
        .unit("openvpn");

    if ovpn.websocket.enabled {
        artifact = artifact
            .file(
                layout.nginx_dir.join("ovpn-ws.conf"),
                websocket_site(ovpn.websocket.port, &topology.domain, "/ovpn", ovpn.port),
            )
            .unit("nginx");
    }

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Transport;

    #[test]
    fn test_server_conf() {
        let mut topo = ServiceTopology::default();
        topo.openvpn.enabled = true;
        topo.openvpn.protocol = Transport::Tcp;
        topo.openvpn.port = 443;

        let layout = ArtifactLayout::default();
        let artifact = render(&topo, &layout).unwrap();
        assert_eq!(artifact.units, vec!["openvpn".to_string()]);
        assert_eq!(artifact.files[0].path, layout.openvpn_config());

        let conf = &artifact.files[0].contents;
        assert!(conf.starts_with("port 443\nproto tcp\n"));
        assert!(conf.contains("ca /etc/openvpn/ca.crt\n"));
        assert!(conf.contains("username-as-common-name\n"));
        assert!(conf.contains("status /etc/openvpn/openvpn-status.log\n"));
    }

    #[test]
    fn test_websocket_front() {
        let mut topo = ServiceTopology {
            domain: "gw.example.com".to_string(),
            ..Default::default()
        };
        topo.openvpn.enabled = true;
        topo.openvpn.websocket.enabled = true;

        let artifact = render(&topo, &ArtifactLayout::default()).unwrap();
        assert_eq!(artifact.units, vec!["openvpn", "nginx"]);
        let site = &artifact.files[1].contents;
        assert!(site.contains("listen 2086;"));
        assert!(site.contains("location /ovpn {"));
        assert!(site.contains("proxy_pass http://127.0.0.1:1194;"));
    }
}
