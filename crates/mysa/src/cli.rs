//! Command-line surface of `mysa`, declared with clap derive.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

/// Talk to Mysa smart thermostats from a terminal
#[derive(Debug, Parser)]
#[command(
    name = "mysa",
    version,
    about = "Control Mysa smart thermostats from the command line",
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

// ── Flags shared by every command ────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Named account profile from the config file
    #[arg(long, short = 'p', env = "MYSA_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Read configuration from this file instead of the platform default
    #[arg(long, env = "MYSA_CONFIG", global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Keep the login session in this file instead of the platform default
    #[arg(long, env = "MYSA_SESSION_FILE", global = true, value_name = "PATH")]
    pub session_file: Option<PathBuf>,

    /// Account e-mail; takes precedence over the profile
    #[arg(long, short = 'u', env = "MYSA_USERNAME", global = true)]
    pub username: Option<String>,

    /// How results are printed
    #[arg(
        long,
        short = 'o',
        env = "MYSA_OUTPUT",
        value_enum,
        default_value_t = OutputFormat::Table,
        global = true
    )]
    pub output: OutputFormat,

    /// Colorize output
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    pub color: ColorMode,

    /// More log output; repeat for debug and trace
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print errors only
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// HTTP timeout in seconds; takes precedence over the profile
    #[arg(long, env = "MYSA_TIMEOUT", global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Bordered table
    Table,
    /// Indented JSON
    Json,
    /// JSON on a single line
    JsonCompact,
    /// Bare identifiers, one per line
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Only when stdout is a terminal and NO_COLOR is unset
    Auto,
    Always,
    Never,
}

/// Operating modes accepted by `set --mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Off,
    Heat,
    Cool,
    Dry,
    FanOnly,
    Auto,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and save the session for later commands
    Login(LoginArgs),

    /// Delete the saved session
    Logout,

    /// List the thermostats on the account
    #[command(visible_alias = "ls")]
    Devices,

    /// Show each thermostat's installed firmware
    #[command(visible_alias = "fw")]
    Firmware,

    /// Show the last state each thermostat reported
    States,

    /// Look up a thermostat's hardware serial number
    Serial(SerialArgs),

    /// Change a thermostat's set point, mode, or both
    Set(SetArgs),

    /// Stream live readings until Ctrl-C
    Watch(WatchArgs),

    /// Inspect the local configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Remember the password in the system keyring for this profile
    #[arg(long)]
    pub save_password: bool,
}

#[derive(Debug, Args)]
pub struct SerialArgs {
    pub device_id: String,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("change")
        .required(true)
        .multiple(true)
        .args(["temperature", "mode"])
))]
pub struct SetArgs {
    pub device_id: String,

    /// Target temperature in °C
    #[arg(long, short = 't', visible_alias = "temp")]
    pub temperature: Option<f64>,

    #[arg(long, short = 'm', value_enum)]
    pub mode: Option<ModeArg>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[arg(required = true, value_name = "DEVICE_ID")]
    pub device_ids: Vec<String>,

    /// Print every payload as received, before decoding
    #[arg(long)]
    pub raw: bool,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Where the config and session files live
    Path,

    /// The resolved profile, with any password masked
    Show,
}
