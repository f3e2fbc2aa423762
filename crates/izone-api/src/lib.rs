// izone-api: Async Rust client for the iZone controller local API
//
// Two surfaces: the HTTP resource/command endpoints on each controller,
// and the UDP datagrams used for discovery and change notification.

pub mod client;
pub mod datagram;
pub mod error;
pub mod models;
pub mod transport;

pub use client::IZoneClient;
pub use datagram::{Announcement, Datagram, DatagramError};
pub use error::Error;
pub use transport::TransportConfig;
