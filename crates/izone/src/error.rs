//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` variants into user-facing errors with actionable help text.

use std::net::SocketAddr;

use miette::Diagnostic;
use thiserror::Error;

use izone_config::ConfigError;
use izone_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach controller {device_uid}")]
    #[diagnostic(
        code(izone::connection_failed),
        help(
            "Check that the controller is powered and on the same network.\n\
             Run: izone discover"
        )
    )]
    ConnectionFailed {
        device_uid: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Request to controller {device_uid} timed out after {seconds}s")]
    #[diagnostic(
        code(izone::timeout),
        help("Increase the timeout with --timeout or check the controller's network link.")
    )]
    Timeout { device_uid: String, seconds: u64 },

    #[error("Cannot listen on {addr}")]
    #[diagnostic(
        code(izone::bind),
        help(
            "Another program (or another izone session) is using this port.\n\
             Use --listen-port 0 to pick a free one; push updates will not arrive."
        )
    )]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    // ── Resources ────────────────────────────────────────────────────
    #[error("No controller {target} answered within {wait_secs}s")]
    #[diagnostic(
        code(izone::no_controller),
        help(
            "Increase the wait with --wait, or name the subnet's broadcast\n\
             address with --broadcast if this host has several interfaces."
        )
    )]
    NoController { target: String, wait_secs: u64 },

    #[error("Zone {index} not found")]
    #[diagnostic(
        code(izone::zone_not_found),
        help("This controller has {count} zones, numbered from 0. Run: izone show")
    )]
    ZoneNotFound { index: usize, count: usize },

    // ── Controller data ──────────────────────────────────────────────
    #[error("Unexpected response from controller: {message}")]
    #[diagnostic(code(izone::protocol))]
    Protocol { message: String },

    #[error("The discovery session closed unexpectedly")]
    #[diagnostic(code(izone::closed))]
    Closed,

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(izone::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(izone::config),
        help("Check the config file. Run: izone config path")
    )]
    Config(Box<figment::Error>),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    #[diagnostic(code(izone::serialization))]
    Serialization(String),
}

impl From<figment::Error> for CliError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NoController { .. } | Self::ZoneNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connection { device_uid, source } => {
                if let izone_api::Error::Timeout { timeout_secs } = source.as_ref() {
                    return CliError::Timeout {
                        device_uid,
                        seconds: *timeout_secs,
                    };
                }
                CliError::ConnectionFailed {
                    device_uid,
                    source: Box::new(source),
                }
            }

            CoreError::Closed => CliError::Closed,

            CoreError::NotFound {
                device_uid,
                timeout_secs,
            } => CliError::NoController {
                target: device_uid.unwrap_or_else(|| "at all".into()),
                wait_secs: timeout_secs,
            },

            CoreError::Bind { addr, source } => CliError::Bind { addr, source },

            CoreError::Validation { message } => CliError::Validation {
                field: "value".into(),
                reason: message,
            },

            err @ (CoreError::InvalidState { .. }
            | CoreError::ZoneIndexMismatch { .. }
            | CoreError::Protocol { .. }
            | CoreError::Api { .. }) => CliError::Protocol {
                message: err.to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Figment(err) => CliError::Config(err),
            ConfigError::Serialization(err) => CliError::Serialization(err.to_string()),
        }
    }
}
