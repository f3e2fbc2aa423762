// ── Core error types ──
//
// Errors surfaced to consumers of izone-core. Transport failures arrive
// wrapped in `Connection`; the raw `izone_api::Error` stays reachable
// through `source()` for diagnostics.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// The controller could not be reached, or was already known to be
    /// unreachable when the call was made.
    #[error("Controller {device_uid} is unreachable")]
    Connection {
        device_uid: String,
        #[source]
        source: Arc<izone_api::Error>,
    },

    #[error("Discovery service is closed")]
    Closed,

    /// No matching controller was registered in time.
    #[error("No controller found within {timeout_secs}s")]
    NotFound {
        device_uid: Option<String>,
        timeout_secs: u64,
    },

    #[error("Cannot bind UDP socket on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    // ── Data errors ──────────────────────────────────────────────────
    /// A requested value was rejected before anything was sent.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// The cached settings hold a value this crate cannot interpret.
    #[error("Unexpected value {value} for {key}")]
    InvalidState { key: &'static str, value: String },

    /// A zone group response placed a zone at the wrong index.
    #[error("Zone index mismatch: slot {expected} received zone {received}")]
    ZoneIndexMismatch { expected: usize, received: String },

    /// The controller answered with data inconsistent with what we know of it.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String },
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` for failures tracked by connection health.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` for local validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

/// Errors that never touch connection health (bad URLs, undecodable
/// bodies). Controllers map connection failures themselves so they can
/// record them first.
impl From<izone_api::Error> for CoreError {
    fn from(err: izone_api::Error) -> Self {
        Self::Api {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_keeps_transport_source() {
        let err = CoreError::Connection {
            device_uid: "000000001".into(),
            source: Arc::new(izone_api::Error::Timeout { timeout_secs: 3 }),
        };
        assert!(err.is_connection());
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Request timed out after 3s"));
    }

    #[test]
    fn undecodable_body_is_not_a_connection_error() {
        let err = CoreError::from(izone_api::Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        });
        assert!(!err.is_connection());
        assert!(matches!(err, CoreError::Api { .. }));
    }
}
