mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use izone_core::DiscoveryService;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::config::Settings;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need the network
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        // Everything else runs inside a discovery session
        cmd => {
            let settings = config::resolve(&cli.global)?;
            let service = DiscoveryService::new(settings.discovery.clone())?;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = execute(cmd, &service, &settings, &cli.global).await;
            service.close().await;
            result
        }
    }
}

async fn execute(
    cmd: Command,
    service: &DiscoveryService,
    settings: &Settings,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    service.start().await?;
    commands::dispatch(cmd, service, settings, global).await
}
