//! netwarden.toml configuration parser.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("snmp.timeout_ms must be at least 1")]
    ZeroTimeout,

    #[error("poller.default_interval_secs must be at least 1")]
    ZeroInterval,

    #[error("invalid listen address: {0}")]
    Listen(String),
}

/// Accepted but suspicious configuration. Returned rather than logged so
/// the daemon can report them once logging is set up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigWarning {
    #[error("config file {} not found, using defaults", .0.display())]
    MissingFile(PathBuf),

    #[error("no administrators configured; change requests can never be resolved")]
    NoAdmins,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetwardenConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub snmp: SnmpConfig,
    pub poller: PollerConfig,
    pub governance: GovernanceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the redb database file.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/netwarden/netwarden.redb"),
        }
    }
}

/// SNMP transport budget. Defaults mirror a plain v2c `get` against
/// port 161 with a 2s timeout and a single retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnmpConfig {
    pub port: u16,
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            port: 161,
            timeout_ms: 2000,
            retries: 1,
        }
    }
}

impl SnmpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Interval applied to devices created without one.
    pub default_interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Actors allowed to approve or reject change requests.
    pub admins: Vec<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            admins: vec!["admin".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive string; `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info,netwardend=debug,netwarden=debug".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl NetwardenConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NetwardenConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults with a
    /// [`ConfigWarning::MissingFile`].
    pub fn load_or_default(path: &Path) -> anyhow::Result<(Self, Option<ConfigWarning>)> {
        if path.exists() {
            Ok((Self::from_file(path)?, None))
        } else {
            Ok((Self::default(), Some(ConfigWarning::MissingFile(path.to_path_buf()))))
        }
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.snmp.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.poller.default_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn warnings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        if self.governance.admins.is_empty() {
            warnings.push(ConfigWarning::NoAdmins);
        }
        warnings
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .listen
            .parse()
            .map_err(|_| ConfigError::Listen(self.server.listen.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: NetwardenConfig = toml::from_str("").unwrap();
        assert_eq!(config, NetwardenConfig::default());
        assert_eq!(config.snmp.port, 161);
        assert_eq!(config.snmp.timeout(), Duration::from_secs(2));
        assert_eq!(config.snmp.retries, 1);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml_str = r#"
[snmp]
timeout_ms = 500

[governance]
admins = ["alice", "bob"]

[log]
format = "json"
"#;
        let config: NetwardenConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.snmp.timeout_ms, 500);
        assert_eq!(config.snmp.retries, 1);
        assert_eq!(config.governance.admins, vec!["alice", "bob"]);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.server.listen, "0.0.0.0:8080");
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut config = NetwardenConfig::default();
        config.snmp.timeout_ms = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTimeout));

        let mut config = NetwardenConfig::default();
        config.poller.default_interval_secs = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));

        let mut config = NetwardenConfig::default();
        config.server.listen = "not-an-address".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Listen(_))));
    }

    #[test]
    fn from_file_round_trips_written_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netwarden.toml");
        let mut config = NetwardenConfig::default();
        config.storage.path = dir.path().join("db.redb");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = NetwardenConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let (config, warning) = NetwardenConfig::load_or_default(&path).unwrap();
        assert_eq!(config, NetwardenConfig::default());
        assert_eq!(warning, Some(ConfigWarning::MissingFile(path.clone())));
        assert!(warning.unwrap().to_string().contains("absent.toml"));
    }

    #[test]
    fn load_or_default_reads_existing_file_without_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netwarden.toml");
        std::fs::write(&path, "[snmp]\nretries = 3\n").unwrap();

        let (config, warning) = NetwardenConfig::load_or_default(&path).unwrap();
        assert_eq!(config.snmp.retries, 3);
        assert_eq!(warning, None);
    }

    #[test]
    fn empty_admin_list_is_a_warning_not_an_error() {
        let mut config = NetwardenConfig::default();
        assert!(config.warnings().is_empty());

        config.governance.admins.clear();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.warnings(), vec![ConfigWarning::NoAdmins]);
    }
}
