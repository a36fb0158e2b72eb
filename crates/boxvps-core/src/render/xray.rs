//! # Xray Artifact
//!
//! The only identity-bearing backend. One JSON document holds an inbound per
//! enabled sub-protocol, each listing every active Xray user as a client.
//!
//! ```text
//! inbounds[0]  vmess   :N    ws /vmess   clients [{id, alterId: 0, email}]
//! inbounds[1]  vless   :N+1  ws /vless   clients [{id, email}], decryption none
//! inbounds[2]  trojan  :N+2  ws /trojan  clients [{password, email}]
//! outbounds[0] freedom
//! ```
//!
//! Banned users and users of other services never appear.

use serde::Serialize;
use uuid::Uuid;

use super::{Artifact, RenderResult};
use crate::error::RenderError;
use crate::topology::{ArtifactLayout, ServiceTopology};
use crate::types::{BackendKind, UserMap};

pub const UNIT: &str = "xray";

// =============================================================================
// Document Model
// =============================================================================

#[derive(Debug, Serialize)]
struct XrayDocument {
    log: LogSettings,
    inbounds: Vec<Inbound>,
    outbounds: Vec<Outbound>,
}

#[derive(Debug, Serialize)]
struct LogSettings {
    loglevel: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Inbound {
    port: u16,
    protocol: &'static str,
    settings: InboundSettings,
    stream_settings: StreamSettings,
}

#[derive(Debug, Serialize)]
struct InboundSettings {
    clients: Vec<Client>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decryption: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Client {
    #[serde(rename_all = "camelCase")]
    Vmess { id: Uuid, alter_id: u32, email: String },
    Vless { id: Uuid, email: String },
    Trojan { password: String, email: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamSettings {
    network: &'static str,
    ws_settings: WsSettings,
}

#[derive(Debug, Serialize)]
struct WsSettings {
    path: &'static str,
}

#[derive(Debug, Serialize)]
struct Outbound {
    protocol: &'static str,
    settings: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
enum SubProtocol {
    Vmess,
    Vless,
    Trojan,
}

impl SubProtocol {
    fn name(self) -> &'static str {
        match self {
            SubProtocol::Vmess => "vmess",
            SubProtocol::Vless => "vless",
            SubProtocol::Trojan => "trojan",
        }
    }

    fn path(self) -> &'static str {
        match self {
            SubProtocol::Vmess => "/vmess",
            SubProtocol::Vless => "/vless",
            SubProtocol::Trojan => "/trojan",
        }
    }

    fn client(self, token: Uuid, email: &str) -> Client {
        let email = email.to_string();
        match self {
            SubProtocol::Vmess => Client::Vmess {
                id: token,
                alter_id: 0,
                email,
            },
            SubProtocol::Vless => Client::Vless { id: token, email },
            SubProtocol::Trojan => Client::Trojan {
                password: token.to_string(),
                email,
            },
        }
    }
}

// =============================================================================
// Render
// =============================================================================

/// Active `(username, token)` pairs in insertion order.
///
/// Fails on the first active user without a token.
pub fn active_clients(users: &UserMap) -> RenderResult<Vec<(&str, Uuid)>> {
    users
        .iter()
        .filter(|(_, rec)| rec.is_active_on(BackendKind::Xray))
        .map(|(name, rec)| {
            rec.identity_token
                .map(|token| (name, token))
                .ok_or_else(|| RenderError::MissingIdentityToken {
                    username: name.to_string(),
                    backend: BackendKind::Xray,
                })
        })
        .collect()
}

pub fn render(
    users: &UserMap,
    topology: &ServiceTopology,
    layout: &ArtifactLayout,
) -> RenderResult<Artifact> {
    let clients = active_clients(users)?;
    let xray = &topology.xray;

    let enabled = [
        (xray.vmess, SubProtocol::Vmess, xray.vmess_port()),
        (xray.vless, SubProtocol::Vless, xray.vless_port()),
        (xray.trojan, SubProtocol::Trojan, xray.trojan_port()),
    ];

    let inbounds = enabled
        .into_iter()
        .filter(|(on, _, _)| *on)
        .map(|(_, proto, port)| Inbound {
            port,
            protocol: proto.name(),
            settings: InboundSettings {
                clients: clients
                    .iter()
                    .map(|(name, token)| proto.client(*token, name))
                    .collect(),
                decryption: matches!(proto, SubProtocol::Vless).then_some("none"),
            },
            stream_settings: StreamSettings {
                network: "ws",
                ws_settings: WsSettings { path: proto.path() },
            },
        })
        .collect();

    let doc = XrayDocument {
        log: LogSettings {
            loglevel: "warning",
        },
        inbounds,
        outbounds: vec![Outbound {
            protocol: "freedom",
            settings: serde_json::Map::new(),
        }],
    };

    let mut json =
        serde_json::to_string_pretty(&doc).map_err(|e| RenderError::Serialization {
            backend: BackendKind::Xray,
            reason: e.to_string(),
        })?;
    json.push('\n');

    Ok(Artifact::new(BackendKind::Xray)
        .file(&layout.xray_config, json)
        .unit(UNIT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServiceKind, UserRecord};
    use chrono::Utc;

    fn users(names: &[(&str, ServiceKind)]) -> UserMap {
        let mut map = UserMap::new();
        for (name, service) in names {
            map.insert(
                *name,
                UserRecord::new("hash".to_string(), *service, None, Utc::now()),
            );
        }
        map
    }

    fn parse(artifact: &Artifact) -> serde_json::Value {
        serde_json::from_str(&artifact.files[0].contents).unwrap()
    }

    #[test]
    fn test_only_active_xray_users_are_clients() {
        let mut map = users(&[
            ("alice", ServiceKind::Xray),
            ("bob", ServiceKind::Ssh),
            ("carol", ServiceKind::Xray),
        ]);
        map.get_mut("carol").unwrap().ban(Utc::now());

        let artifact = render(&map, &ServiceTopology::default(), &ArtifactLayout::default()).unwrap();
        let doc = parse(&artifact);
        let clients = doc["inbounds"][0]["settings"]["clients"].as_array().unwrap();

        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0]["email"], "alice");
        assert_eq!(clients[0]["alterId"], 0);
        assert_eq!(
            clients[0]["id"],
            map.get("alice").unwrap().identity_token.unwrap().to_string()
        );
        assert_eq!(artifact.units, vec!["xray".to_string()]);
    }

    #[test]
    fn test_sub_protocol_ports_and_paths() {
        let map = users(&[("alice", ServiceKind::Xray)]);
        let mut topo = ServiceTopology::default();
        topo.xray.port = 8443;
        topo.xray.vless = true;
        topo.xray.trojan = true;

        let doc = parse(&render(&map, &topo, &ArtifactLayout::default()).unwrap());
        let inbounds = doc["inbounds"].as_array().unwrap();
        assert_eq!(inbounds.len(), 3);

        assert_eq!(inbounds[0]["protocol"], "vmess");
        assert_eq!(inbounds[0]["port"], 8443);
        assert_eq!(inbounds[0]["streamSettings"]["wsSettings"]["path"], "/vmess");
        assert!(inbounds[0]["settings"].get("decryption").is_none());

        assert_eq!(inbounds[1]["protocol"], "vless");
        assert_eq!(inbounds[1]["port"], 8444);
        assert_eq!(inbounds[1]["settings"]["decryption"], "none");

        assert_eq!(inbounds[2]["protocol"], "trojan");
        assert_eq!(inbounds[2]["port"], 8445);
        let token = map.get("alice").unwrap().identity_token.unwrap().to_string();
        assert_eq!(inbounds[2]["settings"]["clients"][0]["password"], token);

        assert_eq!(doc["outbounds"][0]["protocol"], "freedom");
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let mut map = users(&[("alice", ServiceKind::Xray)]);
        map.get_mut("alice").unwrap().identity_token = None;

        let err = render(&map, &ServiceTopology::default(), &ArtifactLayout::default()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::MissingIdentityToken { ref username, .. } if username == "alice"
        ));
    }

    #[test]
    fn test_missing_token_on_banned_user_is_ignored() {
        let mut map = users(&[("alice", ServiceKind::Xray)]);
        let rec = map.get_mut("alice").unwrap();
        rec.identity_token = None;
        rec.ban(Utc::now());

        assert!(render(&map, &ServiceTopology::default(), &ArtifactLayout::default()).is_ok());
    }

    #[test]
    fn test_client_order_follows_insertion() {
        let map = users(&[
            ("zed", ServiceKind::Xray),
            ("amy", ServiceKind::Xray),
        ]);
        let doc = parse(&render(&map, &ServiceTopology::default(), &ArtifactLayout::default()).unwrap());
        let clients = doc["inbounds"][0]["settings"]["clients"].as_array().unwrap();
        assert_eq!(clients[0]["email"], "zed");
        assert_eq!(clients[1]["email"], "amy");
    }
}
