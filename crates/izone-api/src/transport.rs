// Shared transport configuration for building the reqwest::Client.
//
// One client is shared by every controller a discovery session finds;
// the per-request timeout lives here.

use std::time::Duration;

/// Default per-request timeout. Controllers answer on the LAN within
/// milliseconds, so anything slower is treated as a dead link.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("izone-rs/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// Proxies are bypassed: controllers only ever live on the local network.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(&self.user_agent)
            .no_proxy()
            .build()
            .map_err(|e| crate::error::Error::Client(format!("failed to build HTTP client: {e}")))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
