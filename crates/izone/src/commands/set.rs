//! Set command handler: system-level writes.

use izone_core::DiscoveryService;

use crate::cli::{GlobalOpts, SetArgs, SetCommand};
use crate::config::Settings;
use crate::error::CliError;

use super::util;

pub async fn handle(
    service: &DiscoveryService,
    args: SetArgs,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let controller = util::select_controller(service, settings).await?;

    let message = match args.command {
        SetCommand::Power { state } => {
            controller.set_on(state.is_on()).await?;
            format!("AC unit switched {}", if state.is_on() { "on" } else { "off" })
        }
        SetCommand::Mode { mode } => {
            controller.set_mode(mode).await?;
            format!("Mode set to {mode}")
        }
        SetCommand::Fan { fan } => {
            controller.set_fan(fan).await?;
            format!("Fan set to {fan}")
        }
        SetCommand::Sleep { minutes } => {
            controller.set_sleep_timer(minutes).await?;
            if minutes == 0 {
                "Sleep timer cleared".to_owned()
            } else {
                format!("Sleep timer set to {minutes} min")
            }
        }
        SetCommand::Setpoint { value } => {
            controller.set_temp_setpoint(value).await?;
            format!("Setpoint set to {value:.1}°C")
        }
        SetCommand::FreeAir { state } => {
            controller.set_free_air(state.is_on()).await?;
            format!("Free air switched {}", if state.is_on() { "on" } else { "off" })
        }
    };

    if !global.quiet {
        eprintln!("{message} on {}", controller.device_uid());
    }
    Ok(())
}
