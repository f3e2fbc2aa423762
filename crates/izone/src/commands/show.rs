//! Show command handler: system detail plus the zone table.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use izone_core::{Controller, DiscoveryService, Fan, RasMode, SystemMode, Zone, ZoneMode, ZoneType};

use crate::cli::GlobalOpts;
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SystemView {
    pub device_uid: String,
    pub ip: String,
    pub connected: bool,
    pub last_refreshed: Option<DateTime<Utc>>,
    pub on: bool,
    pub mode: SystemMode,
    pub fan: Fan,
    pub fan_modes: Vec<Fan>,
    pub sleep_timer: i64,
    pub free_air_enabled: bool,
    pub free_air: bool,
    pub temp_setpoint: Option<f64>,
    pub temp_supply: Option<f64>,
    pub temp_return: Option<f64>,
    pub temp_min: f64,
    pub temp_max: f64,
    pub eco_lock: bool,
    pub ras_mode: RasMode,
    pub zone_ctrl: i64,
    pub zones_total: i64,
    pub zones_const: i64,
    pub sys_type: String,
}

impl SystemView {
    pub fn read(c: &Controller) -> Result<Self, CliError> {
        Ok(Self {
            device_uid: c.device_uid().to_owned(),
            ip: c.device_ip(),
            connected: c.is_connected(),
            last_refreshed: c.last_refreshed(),
            on: c.is_on()?,
            mode: c.mode()?,
            fan: c.fan()?,
            fan_modes: c.fan_modes(),
            sleep_timer: c.sleep_timer()?,
            free_air_enabled: c.free_air_enabled()?,
            free_air: c.free_air()?,
            temp_setpoint: c.temp_setpoint()?,
            temp_supply: c.temp_supply()?,
            temp_return: c.temp_return()?,
            temp_min: c.temp_min()?,
            temp_max: c.temp_max()?,
            eco_lock: c.eco_lock()?,
            ras_mode: c.ras_mode()?,
            zone_ctrl: c.zone_ctrl()?,
            zones_total: c.zones_total()?,
            zones_const: c.zones_const()?,
            sys_type: c.sys_type()?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ZoneView {
    pub index: usize,
    pub name: String,
    pub zone_type: ZoneType,
    pub mode: ZoneMode,
    pub temp_setpoint: Option<f64>,
    pub temp_current: Option<f64>,
    pub airflow_min: i64,
    pub airflow_max: i64,
}

impl ZoneView {
    pub fn read(z: &Zone) -> Result<Self, CliError> {
        Ok(Self {
            index: z.index(),
            name: z.name()?,
            zone_type: z.zone_type()?,
            mode: z.mode()?,
            temp_setpoint: z.temp_setpoint()?,
            temp_current: z.temp_current()?,
            airflow_min: z.airflow_min()?,
            airflow_max: z.airflow_max()?,
        })
    }
}

#[derive(Debug, Serialize)]
struct StatusView {
    system: SystemView,
    zones: Vec<ZoneView>,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct ZoneRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    zone_type: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Setpoint")]
    setpoint: String,
    #[tabled(rename = "Temp")]
    current: String,
    #[tabled(rename = "Airflow")]
    airflow: String,
}

impl From<&ZoneView> for ZoneRow {
    fn from(z: &ZoneView) -> Self {
        Self {
            index: z.index,
            name: z.name.clone(),
            zone_type: z.zone_type.to_string(),
            mode: z.mode.to_string(),
            setpoint: output::temperature(z.temp_setpoint),
            current: output::temperature(z.temp_current),
            airflow: format!("{}-{}%", z.airflow_min, z.airflow_max),
        }
    }
}

pub fn system_detail(s: &SystemView, color: bool) -> String {
    let fan_modes: Vec<String> = s.fan_modes.iter().map(ToString::to_string).collect();
    let mut lines = vec![
        format!("UID:        {}", s.device_uid),
        format!("IP:         {}", s.ip),
        format!(
            "State:      {}",
            if s.connected { "connected" } else { "disconnected" }
        ),
        format!("Power:      {}", output::on_off(s.on, color)),
        format!("Mode:       {}", s.mode),
        format!("Fan:        {} ({})", s.fan, fan_modes.join("/")),
        format!("Setpoint:   {}", output::temperature(s.temp_setpoint)),
        format!("Supply:     {}", output::temperature(s.temp_supply)),
        format!("Return:     {}", output::temperature(s.temp_return)),
        format!("Sensor:     {}", s.ras_mode),
    ];
    if s.sleep_timer > 0 {
        lines.push(format!("Sleep:      {} min", s.sleep_timer));
    }
    if s.free_air_enabled {
        lines.push(format!("Free air:   {}", output::on_off(s.free_air, color)));
    }
    if s.eco_lock {
        lines.push(format!(
            "Eco lock:   {:.1}-{:.1}°C",
            s.temp_min, s.temp_max
        ));
    }
    if let Some(at) = s.last_refreshed {
        lines.push(format!("Refreshed:  {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    service: &DiscoveryService,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let controller = util::select_controller(service, settings).await?;
    let status = StatusView {
        system: SystemView::read(&controller)?,
        zones: controller
            .zones()
            .iter()
            .map(ZoneView::read)
            .collect::<Result<_, _>>()?,
    };

    let color = output::should_color(global.color);
    let out = output::render_single(settings.output, &status, |s| {
        let rows: Vec<ZoneRow> = s.zones.iter().map(ZoneRow::from).collect();
        format!(
            "{}\n\n{}",
            system_detail(&s.system, color),
            output::render_table(&rows)
        )
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
