//! Clap derive structures for the `indisync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use indisync_core::BlobPolicy;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// indisync -- device property synchronization toolkit
#[derive(Debug, Parser)]
#[command(
    name = "indisync",
    version,
    about = "Validate device definitions and run loopback property sessions",
    long_about = "Tools around the indisync property store.\n\n\
        `check` validates a device definition file, `demo` runs a driver and a\n\
        client session over an in-memory transport and prints every event the\n\
        client's queue receives.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "INDISYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
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
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact JSON, one record per line
    JsonCompact,
    /// Plain text, one record per line (scripting)
    Plain,
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

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a device definition file and list its vectors
    Check(CheckArgs),

    /// Run a driver and a client over an in-memory transport
    Demo(DemoArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Check ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Device definition file (defaults to `devices` from the config)
    pub file: Option<PathBuf>,
}

// ── Demo ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DemoArgs {
    /// Device definition file (defaults to a built-in demo board)
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    /// Submit a value from the client: DEVICE.VECTOR.MEMBER=VALUE
    #[arg(long = "set", value_name = "ASSIGNMENT")]
    pub set: Vec<String>,

    /// Ask the driver for BLOB payloads with this policy
    #[arg(long, value_parser = parse_blob_policy)]
    pub blobs: Option<BlobPolicy>,

    /// Print a final snapshot of the client's mirror
    #[arg(long)]
    pub snapshot: bool,

    /// Quiet period that ends each phase, in milliseconds
    #[arg(long, default_value = "200")]
    pub settle_ms: u64,
}

fn parse_blob_policy(raw: &str) -> Result<BlobPolicy, String> {
    raw.parse()
        .map_err(|_| format!("expected Never, Also or Only, got '{raw}'"))
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Print the effective configuration
    Show,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
