//! # Gateway Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BOXVPS_DATA_DIR=/srv/boxvps/data                                   │
//! │     BOXVPS_DOMAIN=vpn.example.com                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $BOXVPS_CONFIG, else /etc/boxvps/boxvps.toml,                      │
//! │     else ~/.config/boxvps/boxvps.toml (Linux)                          │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     /etc/boxvps/data, SSH + Xray(VMess) enabled, 30s apply timeout     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [paths]
//! data_dir = "/etc/boxvps/data"
//! backup_dir = "/etc/boxvps/backup"
//!
//! [engine]
//! apply_timeout_secs = 30
//! max_login_attempts = 5
//!
//! [topology]
//! domain = "vpn.example.com"
//!
//! [topology.xray]
//! port = 10000
//! vless = true
//!
//! [topology.ssh.websocket]
//! enabled = true
//! port = 80
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use boxvps_core::{ArtifactLayout, ServiceTopology};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// System-wide config location used when `$BOXVPS_CONFIG` is unset.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/boxvps/boxvps.toml";

// =============================================================================
// Paths
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Holds users.json and usage.json
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where backup archives are written
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Where restore extracts archives
    #[serde(default = "default_restore_root")]
    pub restore_root: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/etc/boxvps/data")
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from("/etc/boxvps/backup")
}

fn default_restore_root() -> PathBuf {
    PathBuf::from("/")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backup_dir: default_backup_dir(),
            restore_root: default_restore_root(),
        }
    }
}

impl PathSettings {
    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join(boxvps_store::USERS_FILE)
    }

    pub fn usage_file(&self) -> PathBuf {
        self.data_dir.join(boxvps_store::USAGE_FILE)
    }

    pub fn account_tasks_file(&self) -> PathBuf {
        self.data_dir.join(boxvps_store::ACCOUNT_TASKS_FILE)
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Upper bound on each external command (restart, useradd, ...)
    #[serde(default = "default_apply_timeout")]
    pub apply_timeout_secs: u64,

    /// Failed logins before an account is marked locked
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,

    /// Login shell for provisioned SSH accounts
    #[serde(default = "default_account_shell")]
    pub account_shell: String,
}

fn default_apply_timeout() -> u64 {
    30
}

fn default_max_login_attempts() -> u32 {
    5
}

fn default_account_shell() -> String {
    "/bin/bash".to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            apply_timeout_secs: default_apply_timeout(),
            max_login_attempts: default_max_login_attempts(),
            account_shell: default_account_shell(),
        }
    }
}

impl EngineSettings {
    pub fn apply_timeout(&self) -> Duration {
        Duration::from_secs(self.apply_timeout_secs)
    }
}

// =============================================================================
// Backup Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Absolute paths captured in addition to `paths.data_dir`
    #[serde(default = "default_backup_include")]
    pub include: Vec<PathBuf>,
}

fn default_backup_include() -> Vec<PathBuf> {
    [
        "/etc/boxvps",
        "/usr/local/etc/xray",
        "/etc/ssh",
        "/etc/openvpn",
        "/etc/xl2tpd",
        "/etc/ipsec.conf",
        "/etc/cloudflared",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            include: default_backup_include(),
        }
    }
}

// =============================================================================
// Gateway Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    /// Enabled backends, ports and sub-protocol toggles.
    #[serde(default)]
    pub topology: ServiceTopology,

    /// Where generated artifacts are written.
    #[serde(default)]
    pub layout: ArtifactLayout,

    #[serde(default)]
    pub backup: BackupSettings,
}

impl GatewayConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (boxvps.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(path = %path.display(), "Loading gateway config from file");
                let contents = std::fs::read_to_string(&path).map_err(|e| {
                    EngineError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(path = %path.display(), "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load gateway config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration as TOML.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| EngineError::Config(format!("cannot write {}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Gateway config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.engine.apply_timeout_secs == 0 {
            return Err(EngineError::Config(
                "engine.apply_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.engine.max_login_attempts == 0 {
            return Err(EngineError::Config(
                "engine.max_login_attempts must be greater than 0".into(),
            ));
        }

        if !self.paths.data_dir.is_absolute() || !self.paths.backup_dir.is_absolute() {
            return Err(EngineError::Config(
                "paths.data_dir and paths.backup_dir must be absolute".into(),
            ));
        }

        if let Some(rel) = self.backup.include.iter().find(|p| !p.is_absolute()) {
            return Err(EngineError::Config(format!(
                "backup.include entries must be absolute, got {}",
                rel.display()
            )));
        }

        self.topology
            .validate()
            .map_err(|e| EngineError::Config(format!("invalid topology: {}", e)))
    }

    /// Applies overrides from environment-style lookups.
    fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("BOXVPS_DATA_DIR") {
            debug!(data_dir = %dir, "Overriding data dir from environment");
            self.paths.data_dir = PathBuf::from(dir);
        }

        if let Some(dir) = lookup("BOXVPS_BACKUP_DIR") {
            self.paths.backup_dir = PathBuf::from(dir);
        }

        if let Some(domain) = lookup("BOXVPS_DOMAIN") {
            debug!(domain = %domain, "Overriding domain from environment");
            self.topology.domain = domain;
        }

        if let Some(secs) = lookup("BOXVPS_APPLY_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.engine.apply_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid BOXVPS_APPLY_TIMEOUT_SECS"),
            }
        }

        if let Some(port) = lookup("BOXVPS_XRAY_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.topology.xray.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid BOXVPS_XRAY_PORT"),
            }
        }

        if let Some(port) = lookup("BOXVPS_SSH_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.topology.ssh.port = p,
                Err(_) => warn!(value = %port, "Ignoring invalid BOXVPS_SSH_PORT"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("BOXVPS_CONFIG") {
            return Some(PathBuf::from(path));
        }

        let system = PathBuf::from(SYSTEM_CONFIG_PATH);
        if system.exists() {
            return Some(system);
        }

        directories::ProjectDirs::from("com", "boxvps", "boxvps")
            .map(|dirs| dirs.config_dir().join("boxvps.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.paths.users_file(), PathBuf::from("/etc/boxvps/data/users.json"));
        assert_eq!(config.engine.apply_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [engine]
            max_login_attempts = 3

            [topology]
            domain = "vpn.example.com"

            [topology.xray]
            port = 8443
            trojan = true

            [topology.openvpn]
            enabled = true
            protocol = "tcp"

            [topology.argo]
            enabled = true
            tunnel = "boxvps-tunnel"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.max_login_attempts, 3);
        assert_eq!(config.engine.apply_timeout_secs, 30);
        assert_eq!(config.topology.xray.port, 8443);
        assert!(config.topology.xray.vmess);
        assert!(config.topology.xray.trojan);
        assert!(config.topology.openvpn.enabled);
        assert_eq!(config.topology.ssh.port, 22);
        assert_eq!(config.topology.argo.tunnel, "boxvps-tunnel");
        assert!(config.backup.include.contains(&PathBuf::from("/etc/cloudflared")));
        assert_eq!(config.paths.data_dir, PathBuf::from("/etc/boxvps/data"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("BOXVPS_DATA_DIR", "/srv/data"),
            ("BOXVPS_DOMAIN", "gw.example.com"),
            ("BOXVPS_APPLY_TIMEOUT_SECS", "5"),
            ("BOXVPS_XRAY_PORT", "not-a-port"),
            ("BOXVPS_SSH_PORT", "2222"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/data"));
        assert_eq!(config.topology.domain, "gw.example.com");
        assert_eq!(config.engine.apply_timeout_secs, 5);
        assert_eq!(config.topology.xray.port, 10000);
        assert_eq!(config.topology.ssh.port, 2222);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = GatewayConfig::default();
        config.engine.apply_timeout_secs = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        let mut config = GatewayConfig::default();
        config.backup.include.push(PathBuf::from("relative/dir"));
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.topology.ssh.websocket.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/boxvps.toml");

        let mut config = GatewayConfig::default();
        config.topology.xray.vless = true;
        config.save(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[paths]"));
        assert!(contents.contains("[topology.xray]"));

        let loaded: GatewayConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }
}
