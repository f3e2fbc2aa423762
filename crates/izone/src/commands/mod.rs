//! Command dispatch: bridges CLI args -> discovery session -> output formatting.

pub mod config_cmd;
pub mod discover;
pub mod power;
pub mod set;
pub mod show;
pub mod util;
pub mod watch;
pub mod zone;

use izone_core::DiscoveryService;

use crate::cli::{Command, GlobalOpts};
use crate::config::Settings;
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    service: &DiscoveryService,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Discover => discover::handle(service, settings, global).await,
        Command::Show => show::handle(service, settings, global).await,
        Command::Set(args) => set::handle(service, args, settings, global).await,
        Command::Zone(args) => zone::handle(service, args, settings, global).await,
        Command::Watch => watch::handle(service, settings, global).await,
        Command::Power(args) => power::handle(service, &args, settings, global).await,
        // Config is handled before a session is opened
        Command::Config(args) => config_cmd::handle(&args, global),
    }
}
