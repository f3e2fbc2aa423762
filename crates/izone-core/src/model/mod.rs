// ── Domain model ──
//
// Typed vocabulary over the controller's settings documents. Raw
// documents stay as `Settings`; the enums here decode individual fields.

pub mod power;
pub mod settings;
pub mod system;
pub mod zone;

pub use power::{BatteryLevel, PowerChannel, PowerDevice, PowerGroup};
pub use settings::Settings;
pub use system::{Fan, RasMode, SystemMode, fan_modes_for};
pub use zone::{ZoneMode, ZoneType};
