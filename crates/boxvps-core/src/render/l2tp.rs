//! L2TP/IPsec artifacts: xl2tpd.conf and ipsec.conf.
//!
//! The address pool (10.9.0.0/24) is kept apart from OpenVPN's 10.8.0.0/24
//! so both daemons can run on one host.

use super::{Artifact, RenderResult};
use crate::topology::ArtifactLayout;
use crate::types::BackendKind;

const XL2TPD_CONF: &str = "[global]
ipsec saref = yes
saref refinfo = 30

[lns default]
ip range = 10.9.0.2-10.9.0.254
local ip = 10.9.0.1
require chap = yes
refuse pap = yes
require authentication = yes
name = l2tpd
pppoptfile = /etc/ppp/options.xl2tpd
length bit = yes
";

const IPSEC_CONF: &str = "config setup
    charondebug=\"ike 1, knl 1, cfg 0\"
    uniqueids=no

conn L2TP-PSK-NAT
    type=transport
    keyexchange=ikev1
    authby=secret
    keyingtries=3
    rekey=no
    left=%defaultroute
    leftprotoport=17/1701
    right=%any
    rightprotoport=17/%any
    forceencaps=yes
    auto=add
";

pub fn render(layout: &ArtifactLayout) -> RenderResult<Artifact> {
    Ok(Artifact::new(BackendKind::L2tp)
        .file(&layout.xl2tpd_config, XL2TPD_CONF)
        .file(&layout.ipsec_config, IPSEC_CONF)
        .unit("xl2tpd")
        .unit("strongswan"))
}
