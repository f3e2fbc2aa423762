//! Power command handler.

use serde::Serialize;
use tabled::Tabled;

use izone_core::{DiscoveryService, PowerDevice, PowerGroup};

use crate::cli::{GlobalOpts, PowerArgs};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ChannelRow {
    #[tabled(rename = "Device")]
    device: usize,
    #[tabled(rename = "Ch")]
    channel: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "Battery")]
    battery: String,
    #[tabled(rename = "OK")]
    ok: bool,
}

#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Group")]
    group: u16,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Channels")]
    channels: usize,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "OK")]
    ok: bool,
}

impl From<&PowerGroup> for GroupRow {
    fn from(g: &PowerGroup) -> Self {
        Self {
            group: g.group_number,
            name: g.name.clone(),
            channels: g.members.len(),
            power: watts(g.power_watts),
            ok: g.ok,
        }
    }
}

fn watts(value: Option<i64>) -> String {
    value.map_or_else(|| "-".into(), |w| format!("{w} W"))
}

fn channel_rows(devices: &[PowerDevice]) -> Vec<ChannelRow> {
    devices
        .iter()
        .filter(|d| d.enabled)
        .flat_map(|d| {
            d.channels.iter().filter(|c| c.enabled).map(move |c| ChannelRow {
                device: d.index,
                channel: c.index,
                name: c.name.clone(),
                group: c.group_number.map_or_else(|| "-".into(), |g| g.to_string()),
                power: watts(c.power_watts),
                battery: d.battery.map_or_else(|| "-".into(), |b| b.to_string()),
                ok: d.ok,
            })
        })
        .collect()
}

#[derive(Serialize)]
struct DevicesView<'a> {
    last_reading: Option<i64>,
    devices: &'a [PowerDevice],
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    service: &DiscoveryService,
    args: &PowerArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let controller = util::select_controller(service, settings).await?;
    let power = controller.power().await?;
    if !power.enabled() && !global.quiet {
        eprintln!(
            "Power monitoring is not enabled on {}",
            controller.device_uid()
        );
    }
    power.refresh().await?;

    let out = if args.groups {
        output::render_list(settings.output, &power.groups()?, |g| GroupRow::from(g))?
    } else {
        let devices = power.devices()?;
        let view = DevicesView {
            last_reading: power.last_reading()?,
            devices: &devices,
        };
        output::render_single(settings.output, &view, |v| {
            output::render_table(&channel_rows(v.devices))
        })?
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
