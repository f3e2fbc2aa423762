//! UDP datagram codec for discovery and change notifications.
//!
//! Controllers answer a broadcast beacon on [`DISCOVERY_PORT`] with an ASCII
//! announcement, and push fixed sentinel payloads to [`UPDATE_PORT`] whenever
//! their state changes. [`Datagram::parse`] classifies any received payload.

use std::fmt;

use thiserror::Error;

/// Port controllers listen on for the discovery beacon.
pub const DISCOVERY_PORT: u16 = 12107;

/// Port controllers send announcements and change notifications to.
pub const UPDATE_PORT: u16 = 7005;

/// Broadcast payload that provokes an announcement from every controller.
pub const DISCOVERY_BEACON: &[u8] = b"IASD";

/// Pushed when system settings changed on the device.
pub const SYSTEM_CHANGED: &[u8] = b"iZoneChanged_System";

/// Pushed when any zone's settings changed on the device.
pub const ZONES_CHANGED: &[u8] = b"iZoneChanged_Zones";

/// Pushed when schedules changed. Schedules are not modelled.
pub const SCHEDULES_CHANGED: &[u8] = b"iZoneChanged_Schedules";

/// First field of every announcement.
pub const PROTOCOL_TAG: &str = "ASPort_12107";

/// Optional fourth field naming the product line.
pub const PRODUCT_TAG: &str = "iZone";

// ── Types ────────────────────────────────────────────────────────────

/// A controller announcing itself in reply to a beacon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Device identifier (the `Mac_` field).
    pub device_uid: String,
    /// Address the controller reports for itself (the `IP_` field).
    pub address: String,
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{PROTOCOL_TAG},Mac_{},IP_{},{PRODUCT_TAG}",
            self.device_uid, self.address
        )
    }
}

/// A classified UDP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datagram {
    /// Our own beacon, looped back.
    Beacon,
    SystemChanged,
    ZonesChanged,
    SchedulesChanged,
    Announcement(Announcement),
}

/// Reasons a payload could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatagramError {
    #[error("datagram is not valid UTF-8")]
    NotUtf8,

    #[error("announcement has {count} fields, expected at least 3")]
    TooFewFields { count: usize },

    #[error("unknown protocol tag '{tag}'")]
    UnknownTag { tag: String },

    #[error("announcement from foreign product '{product}'")]
    ForeignProduct { product: String },

    #[error("announcement field '{field}' has no value")]
    MissingValue { field: &'static str },
}

impl DatagramError {
    /// A well-formed announcement from another product on the same protocol.
    /// Expected on mixed networks and not worth a warning.
    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::ForeignProduct { .. })
    }
}

// ── Parsing ──────────────────────────────────────────────────────────

impl Datagram {
    pub fn parse(data: &[u8]) -> Result<Self, DatagramError> {
        match data {
            DISCOVERY_BEACON => return Ok(Self::Beacon),
            SYSTEM_CHANGED => return Ok(Self::SystemChanged),
            ZONES_CHANGED => return Ok(Self::ZonesChanged),
            SCHEDULES_CHANGED => return Ok(Self::SchedulesChanged),
            _ => {}
        }

        let text = std::str::from_utf8(data).map_err(|_| DatagramError::NotUtf8)?;
        let text = text.trim_end_matches(['\0', '\r', '\n', ' ']);
        let fields: Vec<&str> = text.split(',').collect();

        let [tag, mac, ip, rest @ ..] = fields.as_slice() else {
            return Err(DatagramError::TooFewFields {
                count: fields.len(),
            });
        };
        if *tag != PROTOCOL_TAG {
            return Err(DatagramError::UnknownTag {
                tag: (*tag).to_owned(),
            });
        }
        if let Some(product) = rest.first() {
            if *product != PRODUCT_TAG {
                return Err(DatagramError::ForeignProduct {
                    product: (*product).to_owned(),
                });
            }
        }

        Ok(Self::Announcement(Announcement {
            device_uid: field_value(mac, "Mac")?,
            address: field_value(ip, "IP")?,
        }))
    }
}

/// The part of `Key_value` after the first underscore.
fn field_value(field: &str, name: &'static str) -> Result<String, DatagramError> {
    match field.split_once('_') {
        Some((_, value)) if !value.is_empty() => Ok(value.to_owned()),
        _ => Err(DatagramError::MissingValue { field: name }),
    }
}
