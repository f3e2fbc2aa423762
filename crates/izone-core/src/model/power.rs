//! Power-monitor views.
//!
//! The controller reports power monitoring as two documents: a static
//! configuration (devices, channels, grouping) and a numbered status
//! snapshot with live readings. These types join the two.

use serde::Serialize;
use strum::Display;

use izone_api::models::{PowerMonitorConfig, PowerMonitorStatus};

/// Group numbers at or above this mean "not grouped".
const UNGROUPED: u16 = 255;

/// Battery level of a power-monitor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryLevel {
    /// Reading below 600.
    Critical,
    /// 600 to 700.
    Low,
    /// 700 to 800.
    Normal,
    /// Above 800.
    Full,
}

impl BatteryLevel {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Critical),
            1 => Some(Self::Low),
            2 => Some(Self::Normal),
            3 => Some(Self::Full),
            _ => None,
        }
    }
}

/// One monitored circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerChannel {
    pub device: usize,
    pub index: usize,
    pub name: String,
    pub enabled: bool,
    pub group_number: Option<u16>,
    /// The circuit generates power (solar) rather than consuming it.
    pub generate: bool,
    pub add_to_total: bool,
    /// Latest reading in watts; `None` before the first status refresh.
    pub power_watts: Option<i64>,
}

/// A monitoring device carrying up to three channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerDevice {
    pub index: usize,
    pub enabled: bool,
    pub ok: bool,
    pub battery: Option<BatteryLevel>,
    pub channels: Vec<PowerChannel>,
}

/// Channels sharing a group number, reported as one load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerGroup {
    pub group_number: u16,
    /// Name of the group's first channel.
    pub name: String,
    /// Every device contributing a channel is OK.
    pub ok: bool,
    /// Reading of the group's first channel.
    pub power_watts: Option<i64>,
    /// `(device, channel)` indices of the members.
    pub members: Vec<(usize, usize)>,
}

pub(crate) fn devices(
    config: &PowerMonitorConfig,
    status: Option<&PowerMonitorStatus>,
) -> Vec<PowerDevice> {
    config
        .devices
        .iter()
        .enumerate()
        .map(|(index, device)| {
            let live = status.and_then(|s| s.dev.get(index));
            let channels = device
                .channels
                .iter()
                .enumerate()
                .map(|(ch, channel)| PowerChannel {
                    device: index,
                    index: ch,
                    name: channel.name.clone(),
                    enabled: channel.enabled,
                    group_number: (channel.group_number < UNGROUPED)
                        .then_some(channel.group_number),
                    generate: channel.generate,
                    add_to_total: channel.add_to_total,
                    power_watts: live.and_then(|d| d.ch.get(ch)).map(|c| c.pwr),
                })
                .collect();
            PowerDevice {
                index,
                enabled: device.enabled,
                ok: live.is_some_and(|d| d.ok),
                battery: live.and_then(|d| BatteryLevel::from_raw(d.batt)),
                channels,
            }
        })
        .collect()
}

/// Group channels by group number, in device/channel order.
pub(crate) fn groups(devices: &[PowerDevice]) -> Vec<PowerGroup> {
    let mut groups: Vec<PowerGroup> = Vec::new();
    for channel in devices.iter().flat_map(|d| &d.channels) {
        let Some(number) = channel.group_number else {
            continue;
        };
        let device_ok = devices.get(channel.device).is_some_and(|d| d.ok);
        let member = (channel.device, channel.index);
        match groups.iter_mut().find(|g| g.group_number == number) {
            Some(group) => {
                group.ok &= device_ok;
                group.members.push(member);
            }
            None => groups.push(PowerGroup {
                group_number: number,
                name: channel.name.clone(),
                ok: device_ok,
                power_watts: channel.power_watts,
                members: vec![member],
            }),
        }
    }
    groups
}
