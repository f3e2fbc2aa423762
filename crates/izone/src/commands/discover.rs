//! Discover command handler.

use serde::Serialize;
use tabled::Tabled;

use izone_core::{Controller, DiscoveryService, SystemMode};

use crate::cli::GlobalOpts;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

// ── Summary ─────────────────────────────────────────────────────────

/// One line per controller.
#[derive(Debug, Serialize)]
pub struct ControllerSummary {
    pub device_uid: String,
    pub ip: String,
    pub connected: bool,
    pub on: Option<bool>,
    pub mode: Option<SystemMode>,
    pub temp_setpoint: Option<f64>,
    pub zones: usize,
}

impl From<&Controller> for ControllerSummary {
    fn from(c: &Controller) -> Self {
        Self {
            device_uid: c.device_uid().to_owned(),
            ip: c.device_ip(),
            connected: c.is_connected(),
            on: c.is_on().ok(),
            mode: c.mode().ok(),
            temp_setpoint: c.temp_setpoint().ok().flatten(),
            zones: c.zone_count(),
        }
    }
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ControllerRow {
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Setpoint")]
    setpoint: String,
    #[tabled(rename = "Zones")]
    zones: usize,
}

fn row(s: &ControllerSummary, color: bool) -> ControllerRow {
    ControllerRow {
        uid: s.device_uid.clone(),
        ip: s.ip.clone(),
        state: if s.connected { "connected" } else { "disconnected" }.into(),
        power: s
            .on
            .map_or_else(|| "-".into(), |on| output::on_off(on, color)),
        mode: s.mode.map_or_else(|| "-".into(), |m| m.to_string()),
        setpoint: output::temperature(s.temp_setpoint),
        zones: s.zones,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

/// Listen for the whole wait window, then list every controller found.
pub async fn handle(
    service: &DiscoveryService,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    tokio::time::sleep(settings.wait).await;

    let summaries: Vec<ControllerSummary> = service
        .controllers()
        .iter()
        .map(ControllerSummary::from)
        .collect();

    if summaries.is_empty() && !global.quiet {
        eprintln!("No controllers found within {}s", settings.wait.as_secs());
    }

    let color = output::should_color(global.color);
    let out = output::render_list(settings.output, &summaries, |s| row(s, color))?;
    output::print_output(&out, global.quiet);
    Ok(())
}
