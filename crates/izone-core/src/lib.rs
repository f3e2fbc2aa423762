//! Discovery, connection health, and device model for iZone HVAC
//! controllers on the local network.
//!
//! - **[`DiscoveryService`]**: Broadcasts the discovery beacon, listens
//!   for announcements and change notifications on one UDP socket, and
//!   keeps a registry of initialized controllers. Consumers observe it
//!   through [`Listener`] callbacks or the [`events()`](DiscoveryService::events)
//!   broadcast stream.
//!
//! - **[`Controller`]**: A single controller with cached system and zone
//!   documents, typed accessors, validated setters, and edge-triggered
//!   connection health ([`ConnectionState`]).
//!
//! - **[`Zone`]** and **[`Power`]**: Per-zone control and the optional
//!   power-monitor subsystem, both reached through their controller.
//!
//! Raw HTTP and datagram handling live in `izone-api`.

pub mod config;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod health;
pub mod listener;
pub mod model;
pub mod power;
pub mod zone;

mod sync;
mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::DiscoveryConfig;
pub use controller::{Controller, MAX_ZONES};
pub use discovery::DiscoveryService;
pub use error::CoreError;
pub use health::ConnectionState;
pub use listener::{DiscoveryEvent, Listener};
pub use model::{
    BatteryLevel, Fan, PowerChannel, PowerDevice, PowerGroup, RasMode, Settings, SystemMode,
    ZoneMode, ZoneType,
};
pub use power::Power;
pub use validate::{DEFAULT_TEMP_RANGE, SLEEP_TIMER_MAX};
pub use zone::Zone;
