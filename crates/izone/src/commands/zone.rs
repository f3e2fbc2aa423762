//! Zone command handlers.

use izone_core::DiscoveryService;

use crate::cli::{GlobalOpts, ZoneArgs, ZoneCommand};
use crate::config::Settings;
use crate::error::CliError;
use crate::output;

use super::show::{ZoneRow, ZoneView};
use super::util;

pub async fn handle(
    service: &DiscoveryService,
    args: ZoneArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let controller = util::select_controller(service, settings).await?;
    let zone = util::resolve_zone(&controller, args.index)?;

    let message = match args.command {
        ZoneCommand::Show => {
            let view = ZoneView::read(&zone)?;
            let out = output::render_single(settings.output, &view, |z| {
                output::render_table(&[ZoneRow::from(z)])
            })?;
            output::print_output(&out, global.quiet);
            return Ok(());
        }
        ZoneCommand::Mode { mode } => {
            zone.set_mode(mode).await?;
            format!("mode set to {mode}")
        }
        ZoneCommand::Setpoint { value } => {
            zone.set_temp_setpoint(value).await?;
            format!("setpoint set to {value:.1}°C")
        }
        ZoneCommand::AirflowMin { percent } => {
            zone.set_airflow_min(percent).await?;
            format!("minimum airflow set to {percent}%")
        }
        ZoneCommand::AirflowMax { percent } => {
            zone.set_airflow_max(percent).await?;
            format!("maximum airflow set to {percent}%")
        }
    };

    if !global.quiet {
        let name = zone.name().unwrap_or_default();
        eprintln!("Zone {} ({name}) {message}", zone.index());
    }
    Ok(())
}
