//! Clap derive structures for the `loxly` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use loxly_core::StateId;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// loxly -- watch live state changes on a Loxone Miniserver
#[derive(Debug, Parser)]
#[command(
    name = "loxly",
    version,
    about = "Watch live Loxone Miniserver state changes from the command line",
    long_about = "Connects to a Loxone Miniserver over its WebSocket API, authenticates,\n\
        and prints state changes as they happen, resolved to room and control names\n\
        from the Miniserver's structure file.",
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
    /// Miniserver profile to use
    #[arg(long, short = 'p', env = "LOXLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Miniserver host or host:port (overrides profile)
    #[arg(long, short = 'H', env = "LOXLY_HOST", global = true)]
    pub host: Option<String>,

    /// Username (overrides profile)
    #[arg(long, short = 'u', env = "LOXLY_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format [default: from config, else human]
    #[arg(long, short = 'o', env = "LOXLY_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Use a local LoxAPP3.json instead of downloading it
    #[arg(long, value_name = "FILE", global = true)]
    pub structure: Option<PathBuf>,

    /// Download the structure file even if the cached copy is fresh
    #[arg(long, global = true)]
    pub refresh_structure: bool,

    /// Handshake timeout in seconds
    #[arg(long, env = "LOXLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines and tables
    Human,
    /// One JSON object per line (watch) or a JSON document (rooms, map, status)
    Json,
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

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream state changes as they happen
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// List rooms and how many controls each holds
    #[command(alias = "r")]
    Rooms,

    /// Show every room with its controls, their types and ids
    #[command(alias = "m")]
    Map,

    /// Print the current value of every state in one room, then exit
    #[command(alias = "s")]
    Status(StatusArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
#[command(after_help = "Examples:\n  \
    loxly watch --room Office                  Everything in the office\n  \
    loxly watch --control \"Light\" --changes-only\n  \
    loxly watch --state-key tempActual         All temperatures\n  \
    loxly watch --room \"Kids Room\" --state-key active")]
pub struct WatchArgs {
    /// Watch every state in this room (exact name, case-insensitive; repeatable)
    #[arg(long, short = 'r')]
    pub room: Vec<String>,

    /// Watch controls whose name contains this text (case-insensitive; repeatable)
    #[arg(long, short = 'c')]
    pub control: Vec<String>,

    /// Only report states whose key contains this text (repeatable)
    #[arg(long, short = 's')]
    pub state_key: Vec<String>,

    /// Watch one state id (8-4-4-4-12 or 8-4-4-16; repeatable)
    #[arg(long, value_name = "ID")]
    pub uuid: Vec<StateId>,

    /// Stop after this long (e.g. 30s, 5m, 1h)
    #[arg(long, short = 'd')]
    pub duration: Option<humantime::Duration>,

    /// Skip the initial state dump, report changes only
    #[arg(long)]
    pub changes_only: bool,
}

#[derive(Debug, Args)]
#[command(after_help = "Examples:\n  \
    loxly status Office\n  \
    loxly status \"Kids Room\" --wait 5s -o json")]
pub struct StatusArgs {
    /// Room to report (exact name, case-insensitive)
    pub room: String,

    /// How long to collect values after connecting
    #[arg(long, short = 'w', default_value = "2s")]
    pub wait: humantime::Duration,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
