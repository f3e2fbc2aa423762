// ── Discovery configuration ──
//
// Everything a discovery session needs, supplied by the caller.
// Defaults match the controller firmware's fixed ports and timings.

use std::net::Ipv4Addr;
use std::time::Duration;

use izone_api::datagram::{DISCOVERY_PORT, UPDATE_PORT};
use izone_api::transport::DEFAULT_TIMEOUT;

/// Interval between beacons while every controller is healthy.
pub const IDLE_SCAN_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Interval between beacons while any controller is disconnected.
pub const DEGRADED_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Minimum spacing between reconnection attempts to one controller.
pub const RECONNECT_COOLDOWN: Duration = Duration::from_secs(20);

/// Poll interval used when polling is switched on without an explicit value.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(25);

/// Configuration for a [`DiscoveryService`](crate::DiscoveryService).
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local UDP port for announcements and change notifications.
    /// `0` picks an ephemeral port (useful in tests).
    pub listen_port: u16,
    /// Remote UDP port the beacon is sent to.
    pub discovery_port: u16,
    /// HTTP port of each controller.
    pub http_port: u16,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub idle_scan_interval: Duration,
    pub degraded_scan_interval: Duration,
    pub reconnect_cooldown: Duration,
    /// Periodic full refresh of each controller. `None` relies on pushed
    /// change notifications alone.
    pub poll_interval: Option<Duration>,
    /// Where to send beacons. `None` enumerates the host's interfaces.
    pub broadcast_addresses: Option<Vec<Ipv4Addr>>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            listen_port: UPDATE_PORT,
            discovery_port: DISCOVERY_PORT,
            http_port: 80,
            request_timeout: DEFAULT_TIMEOUT,
            idle_scan_interval: IDLE_SCAN_INTERVAL,
            degraded_scan_interval: DEGRADED_SCAN_INTERVAL,
            reconnect_cooldown: RECONNECT_COOLDOWN,
            poll_interval: None,
            broadcast_addresses: None,
        }
    }
}
