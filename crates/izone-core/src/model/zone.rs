// ── Zone enumerations ──

use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// How a zone is regulated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    /// Temperature controlled.
    Auto,
    /// Open/close damper only.
    Opcl,
    /// Always open; mode cannot be changed.
    Const,
}

/// Current damper mode of a zone.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr, Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ZoneMode {
    Open,
    Close,
    /// Temperature control towards the zone setpoint.
    Auto,
}
