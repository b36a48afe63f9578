//! Clap derive structures for the `siac` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};
use siac_core::{AlertSeverity, DeviceStatus, ResourceKind};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// siac -- inspect and manage a SIAC-IoT backend
#[derive(Debug, Parser)]
#[command(
    name = "siac",
    version,
    about = "Manage SIAC-IoT devices and alerts from the command line",
    long_about = "A command-line client for SIAC-IoT backends.\n\n\
        Lists devices, alerts, telemetry and intrusion events, applies\n\
        changes with optimistic feedback, and follows the live event stream.",
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
    /// Backend profile to use
    #[arg(long, short = 'p', env = "SIAC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend URL (overrides profile)
    #[arg(long, short = 'u', env = "SIAC_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SIAC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "SIAC_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "SIAC_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one identifier per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store a bearer token for the profile
    Login(LoginArgs),

    /// Forget the stored token for the profile
    Logout,

    /// Manage registered devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// View, acknowledge and resolve alerts
    #[command(alias = "a")]
    Alerts(AlertsArgs),

    /// Latest telemetry reading per device
    #[command(alias = "t")]
    Telemetry(TelemetryArgs),

    /// Recent intrusion-detection events
    #[command(alias = "ids")]
    Intrusions,

    /// Dashboard counters
    Summary,

    /// Follow live changes until interrupted
    Watch(WatchArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Login ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct LoginArgs {
    /// Username (defaults to the profile's username)
    #[arg(long, short = 'U')]
    pub username: Option<String>,

    /// Read the password from stdin instead of prompting
    #[arg(long)]
    pub password_stdin: bool,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List devices
    #[command(alias = "ls")]
    List(DeviceListArgs),

    /// Show one device
    Get { device: String },

    /// Register a new device
    Create(DeviceCreateArgs),

    /// Change fields of a device
    Update {
        device: String,

        #[command(flatten)]
        fields: DeviceFields,
    },

    /// Remove a device
    #[command(alias = "rm")]
    Delete { device: String },
}

#[derive(Debug, Args)]
pub struct DeviceListArgs {
    /// Only devices with this status
    #[arg(long)]
    pub status: Option<StatusArg>,

    /// Only devices at this location
    #[arg(long)]
    pub location: Option<String>,

    /// Only devices carrying this tag
    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Debug, Args)]
pub struct DeviceCreateArgs {
    /// Identifier the device reports telemetry under
    pub device_id: String,

    #[command(flatten)]
    pub fields: DeviceFields,
}

#[derive(Debug, Args)]
pub struct DeviceFields {
    #[arg(long)]
    pub name: Option<String>,

    /// Hardware type, e.g. esp32
    #[arg(long = "type")]
    pub device_type: Option<String>,

    #[arg(long)]
    pub firmware: Option<String>,

    #[arg(long)]
    pub location: Option<String>,

    /// Tag (repeatable); replaces the existing tags on update
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Online,
    Offline,
    Warning,
    Unknown,
}

impl From<StatusArg> for DeviceStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Online => Self::Online,
            StatusArg::Offline => Self::Offline,
            StatusArg::Warning => Self::Warning,
            StatusArg::Unknown => Self::Unknown,
        }
    }
}

// ── Alerts ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlertsArgs {
    #[command(subcommand)]
    pub command: AlertsCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List active alerts
    #[command(alias = "ls")]
    List(AlertListArgs),

    /// Acknowledge an alert
    #[command(alias = "ack")]
    Acknowledge { alert: String },

    /// Mark an alert resolved
    Resolve { alert: String },
}

#[derive(Debug, Args)]
pub struct AlertListArgs {
    /// Only alerts nobody has acknowledged
    #[arg(long)]
    pub unacknowledged: bool,

    /// Only alerts at or above this severity
    #[arg(long)]
    pub min_severity: Option<SeverityArg>,

    /// Only alerts raised by this device
    #[arg(long)]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<SeverityArg> for AlertSeverity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => Self::Low,
            SeverityArg::Medium => Self::Medium,
            SeverityArg::High => Self::High,
            SeverityArg::Critical => Self::Critical,
        }
    }
}

// ── Telemetry ────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TelemetryArgs {
    /// Only this device
    #[arg(long)]
    pub device: Option<String>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Resources to follow (default: devices and alerts)
    #[arg(long = "resource", short = 'r', value_parser = parse_resource)]
    pub resources: Vec<ResourceKind>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<u64>,
}

fn parse_resource(raw: &str) -> Result<ResourceKind, String> {
    ResourceKind::parse(raw).map_err(|e| e.to_string())
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create or replace a profile
    Init {
        /// Backend root URL, e.g. http://localhost:8000
        #[arg(long)]
        api_url: String,

        /// Profile name
        #[arg(long, default_value = "default")]
        name: String,

        /// Username offered by `siac login`
        #[arg(long)]
        username: Option<String>,

        /// Make this the default profile
        #[arg(long)]
        make_default: bool,
    },

    /// Print the effective configuration
    Show,

    /// List profile names
    Profiles,

    /// Print the config file location
    Path,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
