// ── System-level enumerations ──
//
// Wire spellings are lowercase, except the `RAS` sensor mode.

use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Operating mode of the AC unit.
///
/// Free air is an independent flag on the controller, not a mode.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SystemMode {
    Cool,
    Heat,
    Vent,
    Dry,
    Auto,
}

/// Fan speed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Fan {
    Low,
    #[strum(to_string = "med", serialize = "medium")]
    Med,
    High,
    Top,
    Auto,
}

impl Fan {
    /// Spelling expected by the `SystemFAN` command, which differs from
    /// the one reported in settings for medium.
    pub fn command_value(self) -> &'static str {
        match self {
            Self::Med => "medium",
            other => other.into(),
        }
    }
}

/// Fan speeds a controller accepts, from its `FanAuto` field.
pub fn fan_modes_for(fan_group: &str) -> Vec<Fan> {
    match fan_group {
        "disabled" => vec![Fan::Low, Fan::Med, Fan::High],
        "3-speed" | "var-speed" => vec![Fan::Low, Fan::Med, Fan::High, Fan::Auto],
        "2-speed" => vec![Fan::Low, Fan::High, Fan::Auto],
        _ => vec![Fan::Low, Fan::Med, Fan::High, Fan::Top, Fan::Auto],
    }
}

/// Which sensor the AC unit is regulating from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum RasMode {
    /// A manually selected zone sensor.
    Master,
    /// The unit's own return-air sensor.
    #[strum(serialize = "RAS")]
    Ras,
    /// A zone sensor picked automatically by demand.
    Zones,
}
