//! Resolves the effective settings for one invocation.
//!
//! Layers the `izone-config` file/environment configuration under the
//! command-line flags.

use std::time::Duration;

use clap::ValueEnum;

use izone_config::Config;
use izone_core::DiscoveryConfig;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;

pub use izone_config::{config_path, load_config};

/// Everything a command needs once flags and config are merged.
#[derive(Debug, Clone)]
pub struct Settings {
    pub discovery: DiscoveryConfig,
    pub wait: Duration,
    pub uid: Option<String>,
    pub output: OutputFormat,
}

/// Apply command-line overrides to the loaded configuration.
pub fn apply_overrides(mut cfg: Config, global: &GlobalOpts) -> Config {
    let discovery = &mut cfg.discovery;
    if let Some(port) = global.listen_port {
        discovery.listen_port = port;
    }
    if let Some(port) = global.http_port {
        discovery.http_port = port;
    }
    if let Some(secs) = global.timeout {
        discovery.timeout = secs;
    }
    if let Some(secs) = global.poll {
        discovery.poll_interval = Some(secs);
    }
    if !global.broadcast.is_empty() {
        discovery.broadcast.clone_from(&global.broadcast);
    }

    let defaults = &mut cfg.defaults;
    if let Some(secs) = global.wait {
        defaults.wait = secs;
    }
    if global.uid.is_some() {
        defaults.uid.clone_from(&global.uid);
    }
    cfg
}

/// Build the settings for a command from a loaded configuration.
pub fn resolve_with(cfg: Config, global: &GlobalOpts) -> Result<Settings, CliError> {
    let cfg = apply_overrides(cfg, global);

    let output = match global.output {
        Some(format) => format,
        None => OutputFormat::from_str(&cfg.defaults.output, true).map_err(|reason| {
            CliError::Validation {
                field: "defaults.output".into(),
                reason,
            }
        })?,
    };

    Ok(Settings {
        discovery: cfg.discovery.to_discovery_config()?,
        wait: Duration::from_secs(cfg.defaults.wait),
        uid: cfg.defaults.uid,
        output,
    })
}

/// Load the configuration and merge the command-line flags over it.
pub fn resolve(global: &GlobalOpts) -> Result<Settings, CliError> {
    resolve_with(load_config()?, global)
}
