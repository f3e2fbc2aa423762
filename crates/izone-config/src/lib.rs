//! Layered configuration for the `izone` command-line tool.
//!
//! Built-in defaults, then a TOML file in the platform config directory,
//! then `IZONE_`-prefixed environment variables. Command-line flags are
//! applied on top by the binary. The result translates into an
//! [`izone_core::DiscoveryConfig`].

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use izone_core::DiscoveryConfig;
use izone_core::config::DEFAULT_POLL_INTERVAL;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Network settings for the discovery session.
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Output and selection defaults.
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DiscoverySettings {
    /// Local UDP port for announcements and change notifications.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Remote UDP port the beacon is sent to.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Periodic refresh in seconds; unset disables polling, `0` picks
    /// the standard interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,

    /// Beacon targets. Empty enumerates the host's interfaces.
    #[serde(default)]
    pub broadcast: Vec<Ipv4Addr>,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            discovery_port: default_discovery_port(),
            http_port: default_http_port(),
            timeout: default_timeout(),
            poll_interval: None,
            broadcast: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    /// Controller to address when `--uid` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Seconds to wait for discovery before giving up.
    #[serde(default = "default_wait")]
    pub wait: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            uid: None,
            wait: default_wait(),
        }
    }
}

fn default_listen_port() -> u16 {
    DiscoveryConfig::default().listen_port
}
fn default_discovery_port() -> u16 {
    DiscoveryConfig::default().discovery_port
}
fn default_http_port() -> u16 {
    DiscoveryConfig::default().http_port
}
fn default_timeout() -> u64 {
    DiscoveryConfig::default().request_timeout.as_secs()
}
fn default_output() -> String {
    "table".into()
}
fn default_wait() -> u64 {
    5
}

// ── Translation ─────────────────────────────────────────────────────

impl DiscoverySettings {
    /// Build the runtime configuration, rejecting values the service
    /// cannot run with.
    pub fn to_discovery_config(&self) -> Result<DiscoveryConfig, ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::Validation {
                field: "discovery.timeout".into(),
                reason: "must be at least one second".into(),
            });
        }

        let poll_interval = self.poll_interval.map(|secs| match secs {
            0 => DEFAULT_POLL_INTERVAL,
            secs => Duration::from_secs(secs),
        });

        Ok(DiscoveryConfig {
            listen_port: self.listen_port,
            discovery_port: self.discovery_port,
            http_port: self.http_port,
            request_timeout: Duration::from_secs(self.timeout),
            poll_interval,
            broadcast_addresses: (!self.broadcast.is_empty()).then(|| self.broadcast.clone()),
            ..DiscoveryConfig::default()
        })
    }
}

impl Config {
    /// Render as TOML, as it would appear in the config file.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "izone").map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("izone");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from the canonical config path and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` and the environment. A missing file is not an error.
///
/// Nested keys use a double underscore:
/// `IZONE_DISCOVERY__HTTP_PORT=8080`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("IZONE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning the defaults if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_the_runtime_defaults() {
        let config = Config::default().discovery.to_discovery_config().unwrap();
        let runtime = DiscoveryConfig::default();
        assert_eq!(config.listen_port, runtime.listen_port);
        assert_eq!(config.discovery_port, runtime.discovery_port);
        assert_eq!(config.http_port, runtime.http_port);
        assert_eq!(config.request_timeout, runtime.request_timeout);
        assert_eq!(config.poll_interval, None);
        assert_eq!(config.broadcast_addresses, None);
    }

    #[test]
    fn file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [discovery]
                http_port = 8080
                timeout = 10
                broadcast = ["192.168.1.255"]

                [defaults]
                output = "json"
                uid = "000013170"
                "#,
            )?;
            jail.set_env("IZONE_DISCOVERY__TIMEOUT", "7");

            let config = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(config.discovery.http_port, 8080);
            assert_eq!(config.discovery.timeout, 7);
            assert_eq!(config.discovery.listen_port, 7005);
            assert_eq!(config.defaults.output, "json");
            assert_eq!(config.defaults.uid.as_deref(), Some("000013170"));

            let runtime = config.discovery.to_discovery_config().unwrap();
            assert_eq!(runtime.request_timeout, Duration::from_secs(7));
            assert_eq!(
                runtime.broadcast_addresses,
                Some(vec![Ipv4Addr::new(192, 168, 1, 255)])
            );
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|_| {
            let config = load_config_from(Path::new("absent.toml")).unwrap();
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn malformed_value_is_reported() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[discovery]\nhttp_port = \"eighty\"\n")?;
            let err = load_config_from(Path::new("config.toml")).unwrap_err();
            assert!(matches!(err, ConfigError::Figment(_)));
            Ok(())
        });
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let settings = DiscoverySettings {
            timeout: 0,
            ..DiscoverySettings::default()
        };
        let err = settings.to_discovery_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "discovery.timeout"));
    }

    #[test]
    fn poll_interval_zero_means_standard_interval() {
        let mut settings = DiscoverySettings {
            poll_interval: Some(0),
            ..DiscoverySettings::default()
        };
        assert_eq!(
            settings.to_discovery_config().unwrap().poll_interval,
            Some(DEFAULT_POLL_INTERVAL)
        );
        settings.poll_interval = Some(60);
        assert_eq!(
            settings.to_discovery_config().unwrap().poll_interval,
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn toml_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.discovery.broadcast = vec![Ipv4Addr::new(10, 0, 0, 255)];
        config.defaults.uid = Some("000013170".into());
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
