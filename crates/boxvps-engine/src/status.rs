//! # System Status
//!
//! Host resources, per-unit service state and active session counts.
//!
//! ```text
//! SystemStatus
//! ├── resources   /proc/loadavg, /proc/meminfo, /proc/uptime,
//! │               statvfs("/"), `ip -o -4 addr show`
//! ├── services    systemctl is-active <unit>, every enabled backend's units
//! ├── sessions    ssh      lines of `who`
//! │               xray     configured, non-banned clients
//! │               openvpn  CLIENT_LIST rows in the status log
//! │               l2tp     ppp* interfaces in /proc/net/dev
//! ├── pending     backends whose last apply failed
//! └── pending_accounts  users whose useradd/userdel has not reached the host
//! ```
//!
//! Missing `/proc` files read as zero and a failed statvfs or `ip` leaves
//! its fields empty. Status never fails.

use std::collections::HashMap;
use std::ffi::CString;
use std::net::Ipv4Addr;
use std::path::Path;

use boxvps_core::BackendKind;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::controller::Controller;
use crate::system::{CommandOutcome, CommandSpec};

// =============================================================================
// DTOs
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResourceSnapshot {
    pub cpu_count: u32,
    pub load_1: f64,
    pub load_5: f64,
    pub load_15: f64,
    pub mem_total_kb: u64,
    pub mem_available_kb: u64,
    pub uptime_secs: u64,
    pub disk_total_kb: u64,
    pub disk_available_kb: u64,
    /// IPv4 addresses of every interface except loopback
    pub interfaces: Vec<InterfaceAddress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InterfaceAddress {
    pub interface: String,
    #[ts(as = "String")]
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

/// Result of `systemctl is-active` for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceState {
    pub unit: String,
    /// Raw state word: active, inactive, failed, unknown, unavailable
    pub state: String,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionCount {
    pub backend: BackendKind,
    pub active: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SystemStatus {
    pub resources: ResourceSnapshot,
    pub services: Vec<ServiceState>,
    pub sessions: Vec<SessionCount>,
    /// Backends not yet consistent with the stored state
    pub pending: Vec<BackendKind>,
    /// Users with an account task still to reach the host
    pub pending_accounts: Vec<String>,
}

// =============================================================================
// Parsers
// =============================================================================

/// First three fields of `/proc/loadavg`.
pub fn parse_loadavg(contents: &str) -> Option<[f64; 3]> {
    let mut fields = contents.split_whitespace().map(|f| f.parse::<f64>().ok());
    Some([fields.next()??, fields.next()??, fields.next()??])
}

/// `Key: value kB` lines of `/proc/meminfo`.
pub fn parse_meminfo(contents: &str) -> HashMap<String, u64> {
    contents
        .lines()
        .filter_map(|line| {
            let (key, rest) = line.split_once(':')?;
            let value = rest.split_whitespace().next()?.parse().ok()?;
            Some((key.trim().to_string(), value))
        })
        .collect()
}

/// Whole seconds from the first field of `/proc/uptime`.
pub fn parse_uptime(contents: &str) -> Option<u64> {
    let secs: f64 = contents.split_whitespace().next()?.parse().ok()?;
    Some(secs as u64)
}

/// Logged-in sessions from `who` output.
pub fn count_who_sessions(output: &str) -> u32 {
    output.lines().filter(|l| !l.trim().is_empty()).count() as u32
}

/// Connected clients in an OpenVPN status log (v1 or v2 format).
pub fn count_openvpn_clients(status_log: &str) -> u32 {
    let mut in_v1_table = false;
    let mut count = 0;
    for line in status_log.lines() {
        if line.starts_with("CLIENT_LIST,") {
            // v2/v3: one CLIENT_LIST row per client
            count += 1;
        } else if line.starts_with("Common Name,") {
            in_v1_table = true;
        } else if line.starts_with("ROUTING TABLE") {
            in_v1_table = false;
        } else if in_v1_table && !line.trim().is_empty() {
            count += 1;
        }
    }
    count
}

/// `ppp*` interfaces listed in `/proc/net/dev`.
pub fn count_ppp_interfaces(net_dev: &str) -> u32 {
    net_dev
        .lines()
        .filter_map(|l| l.split_once(':'))
        .filter(|(name, _)| name.trim().starts_with("ppp"))
        .count() as u32
}

/// `ip -o -4 addr show` output, loopback excluded.
///
/// ```text
/// 2: eth0    inet 203.0.113.7/24 brd 203.0.113.255 scope global eth0\       valid_lft forever
/// ```
pub fn parse_ip_addr(output: &str) -> Vec<InterfaceAddress> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let interface = fields.nth(1)?.trim_end_matches(':');
            if interface == "lo" || fields.next()? != "inet" {
                return None;
            }
            let (address, prefix) = fields.next()?.split_once('/')?;
            Some(InterfaceAddress {
                interface: interface.to_string(),
                address: address.parse().ok()?,
                prefix_len: prefix.parse().ok()?,
            })
        })
        .collect()
}

// =============================================================================
// Collection
// =============================================================================

async fn read(path: &Path) -> String {
    tokio::fs::read_to_string(path).await.unwrap_or_default()
}

/// `(total_kb, available_kb)` of the filesystem holding `path`.
fn read_disk(path: &Path) -> Option<(u64, u64)> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut vfs = unsafe { std::mem::zeroed::<libc::statvfs>() };
    let result = unsafe { libc::statvfs(c_path.as_ptr(), &mut vfs) };
    if result != 0 {
        return None;
    }
    let block_size = vfs.f_frsize as u64;
    Some((
        (vfs.f_blocks as u64).saturating_mul(block_size) / 1024,
        (vfs.f_bavail as u64).saturating_mul(block_size) / 1024,
    ))
}

/// Reads host resources from a procfs root (normally `/proc`) and the
/// filesystem holding `disk_root`.
pub async fn read_resources(proc_root: &Path, disk_root: &Path) -> ResourceSnapshot {
    let load = parse_loadavg(&read(&proc_root.join("loadavg")).await).unwrap_or_default();
    let mem = parse_meminfo(&read(&proc_root.join("meminfo")).await);
    let uptime = parse_uptime(&read(&proc_root.join("uptime")).await).unwrap_or(0);
    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);
    let (disk_total_kb, disk_available_kb) = read_disk(disk_root).unwrap_or_default();

    ResourceSnapshot {
        cpu_count,
        load_1: load[0],
        load_5: load[1],
        load_15: load[2],
        mem_total_kb: mem.get("MemTotal").copied().unwrap_or(0),
        mem_available_kb: mem.get("MemAvailable").copied().unwrap_or(0),
        uptime_secs: uptime,
        disk_total_kb,
        disk_available_kb,
        interfaces: Vec::new(),
    }
}

/// Interface IPv4 addresses via `ip`. Empty if `ip` is unavailable.
pub async fn interface_addresses(controller: &Controller) -> Vec<InterfaceAddress> {
    match controller.run(&CommandSpec::new("ip", ["-o", "-4", "addr", "show"])).await {
        CommandOutcome::Success { stdout } => parse_ip_addr(&stdout),
        _ => Vec::new(),
    }
}

/// Active SSH logins via `who`. Zero if `who` is unavailable.
pub async fn ssh_sessions(controller: &Controller) -> u32 {
    match controller.run(&CommandSpec::new("who", Vec::<String>::new())).await {
        CommandOutcome::Success { stdout } => count_who_sessions(&stdout),
        _ => 0,
    }
}

pub async fn openvpn_sessions(status_log: &Path) -> u32 {
    count_openvpn_clients(&read(status_log).await)
}

pub async fn l2tp_sessions(proc_root: &Path) -> u32 {
    count_ppp_interfaces(&read(&proc_root.join("net/dev")).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loadavg() {
        assert_eq!(
            parse_loadavg("0.52 0.58 0.59 1/467 12345\n"),
            Some([0.52, 0.58, 0.59])
        );
        assert_eq!(parse_loadavg(""), None);
        assert_eq!(parse_loadavg("x y z"), None);
    }

    #[test]
    fn test_parse_meminfo() {
        let mem = parse_meminfo("MemTotal:        2030048 kB\nMemFree:          112340 kB\nMemAvailable:    1200000 kB\n");
        assert_eq!(mem.get("MemTotal"), Some(&2_030_048));
        assert_eq!(mem.get("MemAvailable"), Some(&1_200_000));
    }

    #[test]
    fn test_parse_uptime() {
        assert_eq!(parse_uptime("35230.47 69871.22\n"), Some(35230));
        assert_eq!(parse_uptime(""), None);
    }

    #[test]
    fn test_count_who() {
        let who = "alice    pts/0        2024-01-01 10:00 (10.0.0.2)\nbob      pts/1        2024-01-01 10:05 (10.0.0.3)\n";
        assert_eq!(count_who_sessions(who), 2);
        assert_eq!(count_who_sessions(""), 0);
    }

    #[test]
    fn test_count_openvpn_v2() {
        let log = "TITLE,OpenVPN 2.5\n\
                   HEADER,CLIENT_LIST,Common Name,Real Address\n\
                   CLIENT_LIST,alice,1.2.3.4:5555\n\
                   CLIENT_LIST,bob,5.6.7.8:6666\n\
                   HEADER,ROUTING_TABLE,Virtual Address\n\
                   ROUTING_TABLE,10.8.0.6,alice\n\
                   END\n";
        assert_eq!(count_openvpn_clients(log), 2);
    }

    #[test]
    fn test_count_openvpn_v1() {
        let log = "OpenVPN CLIENT LIST\n\
                   Updated,Thu Jan  1 10:00:00 2024\n\
                   Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since\n\
                   alice,1.2.3.4:5555,100,200,Thu Jan  1 09:00:00 2024\n\
                   ROUTING TABLE\n\
                   Virtual Address,Common Name,Real Address,Last Ref\n\
                   10.8.0.6,alice,1.2.3.4:5555,Thu Jan  1 10:00:00 2024\n\
                   GLOBAL STATS\n\
                   END\n";
        assert_eq!(count_openvpn_clients(log), 1);
    }

    #[test]
    fn test_count_ppp() {
        let dev = "Inter-|   Receive\n face |bytes\n    lo: 100 0\n  eth0: 200 0\n  ppp0: 300 0\n  ppp1: 400 0\n";
        assert_eq!(count_ppp_interfaces(dev), 2);
    }

    #[test]
    fn test_parse_ip_addr() {
        let out = "1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever\n\
                   2: eth0    inet 203.0.113.7/24 brd 203.0.113.255 scope global eth0\\       valid_lft forever\n\
                   3: wg0    inet 10.8.0.1/24 scope global wg0\n\
                   garbage\n";
        assert_eq!(
            parse_ip_addr(out),
            vec![
                InterfaceAddress {
                    interface: "eth0".to_string(),
                    address: Ipv4Addr::new(203, 0, 113, 7),
                    prefix_len: 24,
                },
                InterfaceAddress {
                    interface: "wg0".to_string(),
                    address: Ipv4Addr::new(10, 8, 0, 1),
                    prefix_len: 24,
                },
            ]
        );
    }

    #[test]
    fn test_read_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (total, available) = read_disk(dir.path()).unwrap();
        assert!(total > 0);
        assert!(available <= total);
        assert!(read_disk(&dir.path().join("missing")).is_none());
    }

    #[tokio::test]
    async fn test_missing_proc_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let snap = read_resources(dir.path(), &dir.path().join("missing")).await;
        assert_eq!(snap.mem_total_kb, 0);
        assert_eq!(snap.uptime_secs, 0);
        assert_eq!(snap.load_1, 0.0);
        assert!(snap.cpu_count >= 1);
        assert_eq!(snap.disk_total_kb, 0);
        assert_eq!(l2tp_sessions(dir.path()).await, 0);
    }

    #[tokio::test]
    async fn test_read_resources_from_fake_proc() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loadavg"), "1.00 0.50 0.25 1/100 42\n").unwrap();
        std::fs::write(dir.path().join("meminfo"), "MemTotal: 1000 kB\nMemAvailable: 400 kB\n").unwrap();
        std::fs::write(dir.path().join("uptime"), "120.9 200.0\n").unwrap();

        let snap = read_resources(dir.path(), dir.path()).await;
        assert_eq!(snap.load_1, 1.0);
        assert_eq!(snap.load_15, 0.25);
        assert_eq!(snap.mem_total_kb, 1000);
        assert_eq!(snap.mem_available_kb, 400);
        assert_eq!(snap.uptime_secs, 120);
        assert!(snap.disk_total_kb > 0);
    }
}
