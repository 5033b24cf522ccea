//! Clap derive structures for the `devhub` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use devhub_core::{Direction, Orientation};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// devhub -- console for remote device farms
#[derive(Debug, Parser)]
#[command(
    name = "devhub",
    version,
    about = "Drive remote device-farm devices from the command line",
    long_about = "List devices and their live availability, hold a control session on a\n\
        device, and send it taps, swipes, text and app installs.",
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
    /// Hub profile to use
    #[arg(long, short = 'p', env = "DEVHUB_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Hub URL (overrides profile)
    #[arg(long, short = 'u', env = "DEVHUB_URL", global = true)]
    pub url: Option<String>,

    /// Bearer token
    #[arg(long, env = "DEVHUB_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Operator username
    #[arg(long, env = "DEVHUB_USERNAME", global = true)]
    pub username: Option<String>,

    /// Workspace to follow (overrides profile)
    #[arg(long, short = 'w', env = "DEVHUB_WORKSPACE", global = true)]
    pub workspace: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "DEVHUB_OUTPUT",
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
    #[arg(long, short = 'k', env = "DEVHUB_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "DEVHUB_TIMEOUT", global = true)]
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
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
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
    /// List and watch devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Hold a control session on a device until Ctrl-C or the hub ends it
    #[command(alias = "ctl")]
    Control(ControlArgs),

    /// Tap at device coordinates
    Tap(TapArgs),

    /// Swipe between device coordinates, or from the center in a direction
    Swipe(SwipeArgs),

    /// Map a pointer gesture on a scaled video surface and send it
    Gesture(GestureArgs),

    /// Type text into the focused field
    #[command(name = "type")]
    TypeText(TypeArgs),

    /// Capture a screenshot as PNG
    #[command(alias = "shot")]
    Screenshot(ScreenshotArgs),

    /// Upload and install an app package
    Install(InstallArgs),

    /// Uninstall an app
    Uninstall(UninstallArgs),

    /// List installed apps
    Apps(DeviceArg),

    /// Set the video stream orientation
    Orientation(OrientationArgs),

    /// Press the home button
    Home(DeviceArg),

    /// Lock the screen
    Lock(DeviceArg),

    /// Unlock the screen
    Unlock(DeviceArg),

    /// List workspaces
    #[command(alias = "ws")]
    Workspaces,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DeviceArg {
    /// Device UDID
    pub device: String,
}

/// `X,Y` pair parsed from one argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair(pub f64, pub f64);

impl std::str::FromStr for Pair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected X,Y but got '{s}'"))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{v}' is not a number"))
        };
        Ok(Self(parse(x)?, parse(y)?))
    }
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List the device inventory
    #[command(alias = "ls")]
    List {
        /// Only devices with this status (offline, in-use, available, unavailable)
        #[arg(long, short = 's')]
        status: Option<StatusFilter>,
    },

    /// Follow live availability until Ctrl-C
    Watch,

    /// Show a device's details and health
    Info(DeviceArg),

    /// Force-release a device reserved by another operator
    Release(DeviceArg),

    /// Print the MJPEG stream URL for an external player
    StreamUrl(DeviceArg),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    Offline,
    InUse,
    Available,
    Unavailable,
}

// ── Control ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ControlArgs {
    /// Device UDID
    pub device: String,

    /// Liveness period in milliseconds (overrides profile)
    #[arg(long)]
    pub liveness_ms: Option<u64>,
}

// ── Input ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct TapArgs {
    /// Device UDID
    pub device: String,
    /// X in device pixels
    pub x: i64,
    /// Y in device pixels
    pub y: i64,
}

#[derive(Debug, Args)]
pub struct SwipeArgs {
    /// Device UDID
    pub device: String,

    /// Start point in device pixels (X,Y)
    #[arg(long, required_unless_present = "direction", conflicts_with = "direction")]
    pub from: Option<Pair>,

    /// End point in device pixels (X,Y)
    #[arg(long, required_unless_present = "direction", conflicts_with = "direction")]
    pub to: Option<Pair>,

    /// Swipe from the screen center (up, down, left, right)
    #[arg(long, short = 'd')]
    pub direction: Option<Direction>,
}

#[derive(Debug, Args)]
pub struct GestureArgs {
    /// Device UDID
    pub device: String,

    /// Video surface rectangle in client pixels: LEFT,TOP,WIDTHxHEIGHT
    #[arg(long)]
    pub surface: SurfaceArg,

    /// Pointer-down position in client pixels (X,Y)
    #[arg(long)]
    pub down: Pair,

    /// Pointer-up position in client pixels (X,Y)
    #[arg(long)]
    pub up: Pair,

    /// Print the mapped gesture without sending it
    #[arg(long)]
    pub dry_run: bool,
}

/// `LEFT,TOP,WIDTHxHEIGHT`, e.g. `0,0,300x600`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceArg {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl std::str::FromStr for SurfaceArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("expected LEFT,TOP,WIDTHxHEIGHT but got '{s}'");
        let mut parts = s.split(',');
        let (Some(left), Some(top), Some(size), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };
        let (width, height) = size.split_once(['x', 'X']).ok_or_else(bad)?;
        let num = |v: &str| v.trim().parse::<f64>().map_err(|_| bad());
        Ok(Self {
            left: num(left)?,
            top: num(top)?,
            width: num(width)?,
            height: num(height)?,
        })
    }
}

#[derive(Debug, Args)]
pub struct TypeArgs {
    /// Device UDID
    pub device: String,
    /// Text to type
    pub text: String,
}

// ── Apps & screen ────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ScreenshotArgs {
    /// Device UDID
    pub device: String,

    /// Output file (default: <udid>-<timestamp>.png)
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Device UDID
    pub device: String,
    /// App package (.ipa / .apk)
    pub package: PathBuf,
}

#[derive(Debug, Args)]
pub struct UninstallArgs {
    /// Device UDID
    pub device: String,
    /// Bundle identifier or package name
    pub app: String,
}

#[derive(Debug, Args)]
pub struct OrientationArgs {
    /// Device UDID
    pub device: String,
    /// portrait or landscape
    pub orientation: Orientation,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Set a profile value
    Set {
        /// Key (url, username, workspace, token_env, insecure, timeout, ca_cert,
        /// reconnect_delay_ms, liveness_interval_ms, ping_reply)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a token in the system keyring
    SetToken {
        /// Profile name (defaults to active profile)
        #[arg(long)]
        profile: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
