//! Clap derive structures for the `izone` CLI.

use std::net::Ipv4Addr;

use clap::{Args, Parser, Subcommand, ValueEnum};

use izone_core::{Fan, SystemMode, ZoneMode};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// izone -- discover and control iZone HVAC systems
#[derive(Debug, Parser)]
#[command(
    name = "izone",
    version,
    about = "Discover and control iZone HVAC systems on the local network",
    long_about = "Finds iZone controllers by UDP broadcast, then reads and writes\n\
        system and zone settings over the controller's HTTP interface.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Controller to address (device UID); defaults to the first found
    #[arg(long, short = 'u', env = "IZONE_UID", global = true)]
    pub uid: Option<String>,

    /// Seconds to wait for controllers to answer the discovery beacon
    #[arg(long, short = 'w', env = "IZONE_WAIT", global = true)]
    pub wait: Option<u64>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "IZONE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// HTTP port of the controllers
    #[arg(long, env = "IZONE_HTTP_PORT", global = true)]
    pub http_port: Option<u16>,

    /// Local UDP port for announcements (0 picks a free port)
    #[arg(long, env = "IZONE_LISTEN_PORT", global = true)]
    pub listen_port: Option<u16>,

    /// Broadcast addresses for the beacon (comma separated)
    #[arg(
        long,
        short = 'b',
        env = "IZONE_BROADCAST",
        value_delimiter = ',',
        global = true
    )]
    pub broadcast: Vec<Ipv4Addr>,

    /// Refresh controllers every N seconds while running (0 = standard interval)
    #[arg(long, env = "IZONE_POLL", global = true)]
    pub poll: Option<u64>,

    /// Output format
    #[arg(long, short = 'o', env = "IZONE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List controllers answering the discovery beacon
    #[command(alias = "ls")]
    Discover,

    /// Show a controller's system settings and zones
    Show,

    /// Change system settings
    Set(SetArgs),

    /// Change one zone's settings
    #[command(alias = "z")]
    Zone(ZoneArgs),

    /// Print discovery and update events until interrupted
    Watch,

    /// Show power-monitor readings
    Power(PowerArgs),

    /// Inspect the configuration file
    Config(ConfigArgs),
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    #[command(subcommand)]
    pub command: SetCommand,
}

#[derive(Debug, Subcommand)]
pub enum SetCommand {
    /// Switch the AC unit on or off
    Power { state: Switch },

    /// Operating mode: cool, heat, vent, dry or auto
    Mode { mode: SystemMode },

    /// Fan speed: low, med, high, top or auto
    Fan { fan: Fan },

    /// Sleep timer in minutes (multiple of 30, at most 120; 0 disables)
    Sleep { minutes: i64 },

    /// Target temperature in degrees (half-degree steps)
    Setpoint { value: f64 },

    /// Switch free air on or off
    FreeAir { state: Switch },
}

// ── Zone ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ZoneArgs {
    /// Zone index as listed by `izone show`
    pub index: usize,

    #[command(subcommand)]
    pub command: ZoneCommand,
}

#[derive(Debug, Subcommand)]
pub enum ZoneCommand {
    /// Show this zone only
    Show,

    /// Damper mode: open, close or auto
    Mode { mode: ZoneMode },

    /// Zone target temperature in degrees (half-degree steps)
    Setpoint { value: f64 },

    /// Minimum airflow percentage (multiple of 5)
    AirflowMin { percent: i64 },

    /// Maximum airflow percentage (multiple of 5)
    AirflowMax { percent: i64 },
}

// ── Power ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PowerArgs {
    /// Combine channels sharing a group number
    #[arg(long, short = 'g')]
    pub groups: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,

    /// Print the config file location
    Path,
}
