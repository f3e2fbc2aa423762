// Wire models for the controller's JSON bodies.
//
// System and zone settings are handled as untyped maps by `izone-core`;
// only the command payloads and the power-monitor documents have a fixed
// shape worth decoding here. Field names follow the firmware's PascalCase.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

// ── Commands ─────────────────────────────────────────────────────────

/// Payload of the per-zone commands (`ZoneCommand`, `AirMinCommand`,
/// `AirMaxCommand`). Both fields travel as strings; `zone_no` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneCommand {
    #[serde(rename = "ZoneNo")]
    pub zone_no: String,
    #[serde(rename = "Command")]
    pub command: String,
}

impl ZoneCommand {
    /// Build the payload for the zone at 0-based `index`.
    pub fn new(index: usize, command: impl ToString) -> Self {
        Self {
            zone_no: (index + 1).to_string(),
            command: command.to_string(),
        }
    }
}

impl From<ZoneCommand> for Value {
    fn from(command: ZoneCommand) -> Self {
        json!({ "ZoneNo": command.zone_no, "Command": command.command })
    }
}

/// Which power-monitor document a `PowerRequest` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRequestKind {
    Config,
    Status,
}

/// Command name for power-monitor queries.
pub const POWER_REQUEST: &str = "PowerRequest";

/// Payload of the `PowerRequest` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerRequest {
    #[serde(rename = "Type")]
    pub kind: u8,
    #[serde(rename = "No")]
    pub no: u8,
    #[serde(rename = "No1")]
    pub no1: u8,
}

impl PowerRequest {
    pub fn new(kind: PowerRequestKind) -> Self {
        let kind = match kind {
            PowerRequestKind::Config => 1,
            PowerRequestKind::Status => 2,
        };
        Self { kind, no: 0, no1: 0 }
    }
}

impl From<PowerRequest> for Value {
    fn from(request: PowerRequest) -> Self {
        json!({ "Type": request.kind, "No": request.no, "No1": request.no1 })
    }
}

// ── Power monitor configuration ──────────────────────────────────────

/// Response envelope for `PowerRequest` type 1.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerConfigResponse {
    #[serde(rename = "PowerMonitorConfig")]
    pub config: PowerMonitorConfig,
}

/// Static power-monitor configuration: up to 5 devices of 3 channels.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerMonitorConfig {
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    pub tag1: Option<String>,
    pub tag2: Option<String>,
    pub voltage: i64,
    #[serde(rename = "PF")]
    pub power_factor: i64,
    pub cost_of_power: i64,
    pub emissions: i64,
    pub devices: Vec<PowerDeviceConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerDeviceConfig {
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    pub channels: Vec<PowerChannelConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerChannelConfig {
    pub name: String,
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    /// Group number; 255 and above means ungrouped.
    #[serde(rename = "GrNo")]
    pub group_number: u16,
    #[serde(deserialize_with = "flag")]
    pub generate: bool,
    #[serde(deserialize_with = "flag")]
    pub add_to_total: bool,
}

// ── Power monitor status ─────────────────────────────────────────────

/// Response envelope for `PowerRequest` type 2.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerStatusResponse {
    #[serde(rename = "PowerMonitorStatus")]
    pub status: PowerMonitorStatus,
}

/// A numbered snapshot of live readings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerMonitorStatus {
    /// Sequence number of the reading. Unchanged means no new data.
    #[serde(alias = "lastReadingNo", alias = "leasReadingNo")]
    pub last_reading_no: i64,
    pub dev: Vec<PowerDeviceStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerDeviceStatus {
    #[serde(deserialize_with = "flag")]
    pub ok: bool,
    /// Battery level, 0 (critical) to 3 (full).
    pub batt: u8,
    pub ch: Vec<PowerChannelStatus>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PowerChannelStatus {
    /// Power in watts.
    pub pwr: i64,
}

/// The firmware sends flags as `0`/`1`; accept JSON booleans too.
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zone_command_is_one_based_and_stringly() {
        let body = serde_json::to_value(ZoneCommand::new(2, 45)).unwrap();
        assert_eq!(body, json!({"ZoneNo": "3", "Command": "45"}));
        assert_eq!(Value::from(ZoneCommand::new(2, 45)), body);
    }

    #[test]
    fn power_request_payload() {
        let body = serde_json::to_value(PowerRequest::new(PowerRequestKind::Status)).unwrap();
        assert_eq!(body, json!({"Type": 2, "No": 0, "No1": 0}));
        assert_eq!(Value::from(PowerRequest::new(PowerRequestKind::Status)), body);
    }

    #[test]
    fn decodes_power_config_with_int_flags() {
        let raw = json!({
            "AirStreamDeviceUId": "000005273",
            "PowerMonitorConfig": {
                "Enabled": 1,
                "Voltage": 240,
                "PF": 90,
                "CostOfPower": 2500,
                "Emissions": 800,
                "Devices": [{
                    "Enabled": 1,
                    "Channels": [
                        {"Name": "Solar", "GrNo": 0, "Enabled": 1, "Generate": 1, "AddToTotal": 0},
                        {"Name": "", "GrNo": 255, "Enabled": 0, "AddToTotal": 0}
                    ]
                }]
            }
        });
        let resp: PowerConfigResponse = serde_json::from_value(raw).unwrap();
        let config = resp.config;
        assert!(config.enabled);
        assert_eq!(config.power_factor, 90);
        let channels = &config.devices[0].channels;
        assert_eq!(channels[0].name, "Solar");
        assert!(channels[0].generate);
        assert_eq!(channels[1].group_number, 255);
        assert!(!channels[1].generate);
    }

    #[test]
    fn decodes_power_status_reading_number_aliases() {
        let resp: PowerStatusResponse = serde_json::from_value(json!({
            "PowerMonitorStatus": {
                "leasReadingNo": 17,
                "Dev": [{"Ok": 1, "Batt": 2, "Ch": [{"Pwr": 1200}, {"Pwr": 0}, {"Pwr": 5}]}]
            }
        }))
        .unwrap();
        assert_eq!(resp.status.last_reading_no, 17);
        assert!(resp.status.dev[0].ok);
        assert_eq!(resp.status.dev[0].ch[0].pwr, 1200);
    }
}
