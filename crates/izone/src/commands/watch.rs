//! Watch command: stream discovery and update events until Ctrl-C.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;

use izone_core::{Controller, DiscoveryService, Listener, Zone};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

/// One printed event.
#[derive(Debug, Serialize)]
struct EventLine {
    time: DateTime<Utc>,
    event: &'static str,
    device_uid: String,
    ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl EventLine {
    fn new(event: &'static str, controller: &Controller) -> Self {
        Self {
            time: Utc::now(),
            event,
            device_uid: controller.device_uid().to_owned(),
            ip: controller.device_ip(),
            zone: None,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: String) -> Self {
        self.detail = Some(detail);
        self
    }
}

struct Printer {
    format: OutputFormat,
    color: bool,
}

impl Printer {
    fn print(&self, line: &EventLine) {
        let text = match self.format {
            OutputFormat::Table => self.human(line),
            OutputFormat::Json | OutputFormat::JsonCompact => {
                match output::render_json(line, true) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot render event");
                        return;
                    }
                }
            }
        };
        output::print_output(&text, false);
    }

    fn human(&self, line: &EventLine) -> String {
        let time = line.time.with_timezone(&Local).format("%H:%M:%S");
        let event = if self.color {
            match line.event {
                "controller_discovered" | "controller_reconnected" => {
                    line.event.green().to_string()
                }
                "controller_disconnected" => line.event.red().to_string(),
                _ => line.event.cyan().to_string(),
            }
        } else {
            line.event.to_owned()
        };
        let mut text = format!("{time}  {event:<24} {} ({})", line.device_uid, line.ip);
        if let Some(zone) = line.zone {
            text.push_str(&format!("  zone {zone}"));
        }
        if let Some(ref detail) = line.detail {
            text.push_str(&format!("  {detail}"));
        }
        text
    }

    fn system_detail(controller: &Controller) -> Option<String> {
        let on = controller.is_on().ok()?;
        let mode = controller.mode().ok()?;
        let setpoint = controller.temp_setpoint().ok()?;
        Some(format!(
            "{} {mode} {}",
            if on { "on" } else { "off" },
            output::temperature(setpoint)
        ))
    }
}

impl Listener for Printer {
    fn controller_discovered(&self, controller: &Controller) {
        let line = EventLine::new("controller_discovered", controller)
            .with_detail(format!("{} zones", controller.zone_count()));
        self.print(&line);
    }

    fn controller_disconnected(&self, controller: &Controller, error: &izone_api::Error) {
        let line =
            EventLine::new("controller_disconnected", controller).with_detail(error.to_string());
        self.print(&line);
    }

    fn controller_reconnected(&self, controller: &Controller) {
        self.print(&EventLine::new("controller_reconnected", controller));
    }

    fn controller_updated(&self, controller: &Controller) {
        let mut line = EventLine::new("controller_updated", controller);
        line.detail = Self::system_detail(controller);
        self.print(&line);
    }

    fn zone_updated(&self, controller: &Controller, zone: &Zone) {
        let mut line = EventLine::new("zone_updated", controller);
        line.zone = Some(zone.index());
        line.detail = zone.mode().ok().map(|mode| {
            format!(
                "{} {mode} {}",
                zone.name().unwrap_or_default(),
                output::temperature(zone.temp_current().ok().flatten())
            )
        });
        self.print(&line);
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    service: &DiscoveryService,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let printer: Arc<dyn Listener> = Arc::new(Printer {
        format: settings.output,
        color: output::should_color(global.color),
    });
    service.add_listener(Arc::clone(&printer));

    if !global.quiet {
        eprintln!("Watching for events, press Ctrl-C to stop");
    }
    tokio::signal::ctrl_c().await?;

    service.remove_listener(&printer);
    Ok(())
}
