//! Clap derive structures for the `gantry` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use gantry_core::EventKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// gantry -- talk to game-server host daemons from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "gantry",
    version,
    about = "Manage game-server hosts from the command line",
    long_about = "Browse and edit server files, send console commands, and stream\n\
        live server events through a host daemon's WebSocket channel.",
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
    /// Daemon profile to use
    #[arg(long, short = 'p', env = "GANTRY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Daemon WebSocket URL (overrides profile)
    #[arg(long, short = 'd', env = "GANTRY_DAEMON", global = true)]
    pub daemon: Option<String>,

    /// Bearer token (overrides profile)
    #[arg(long, env = "GANTRY_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Seconds to wait for the daemon connection
    #[arg(long, env = "GANTRY_CONNECT_TIMEOUT", global = true)]
    pub connect_timeout: Option<u64>,

    /// Output format
    #[arg(long, short = 'o', env = "GANTRY_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Browse and edit a server's files
    #[command(alias = "f")]
    Files(FilesArgs),

    /// Send a line of input to a server console
    Console(ConsoleArgs),

    /// Stream live events for a server
    Watch(WatchArgs),

    /// Inspect the configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Files ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct FilesArgs {
    #[command(subcommand)]
    pub command: FilesCommand,
}

#[derive(Debug, Subcommand)]
pub enum FilesCommand {
    /// List a directory
    #[command(alias = "list")]
    Ls {
        /// Server ID
        server: String,
        /// Directory path
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a text file
    Cat {
        /// Server ID
        server: String,
        /// File path
        path: String,
    },

    /// Write a file from a local file or stdin
    Write {
        /// Server ID
        server: String,
        /// Destination path on the server
        path: String,
        /// Read contents from this local file instead of stdin
        #[arg(long, short = 'f')]
        from: Option<PathBuf>,
        /// Upload raw bytes instead of UTF-8 text
        #[arg(long)]
        binary: bool,
    },

    /// Create a directory
    Mkdir {
        /// Server ID
        server: String,
        /// Directory path
        path: String,
    },

    /// Rename or move an entry
    #[command(alias = "rename")]
    Mv {
        /// Server ID
        server: String,
        /// Current path
        from: String,
        /// New path
        to: String,
    },

    /// Delete one or more entries
    #[command(alias = "delete")]
    Rm {
        /// Server ID
        server: String,
        /// Paths to delete
        #[arg(required = true, num_args = 1..)]
        paths: Vec<String>,
    },
}

// ── Console ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConsoleArgs {
    /// Server ID
    pub server: String,

    /// Command line to send
    #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Keep printing console output until interrupted
    #[arg(long, short = 'f')]
    pub follow: bool,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Server ID
    pub server: String,

    /// Also subscribe to this host's events
    #[arg(long)]
    pub host: Option<String>,

    /// Event kinds to show (default: all)
    #[arg(long, short = 'k', value_enum, value_delimiter = ',')]
    pub kind: Vec<WatchKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WatchKind {
    Status,
    Console,
    Stats,
    InstallProgress,
    InstallComplete,
    InstallError,
}

impl From<WatchKind> for EventKind {
    fn from(kind: WatchKind) -> Self {
        match kind {
            WatchKind::Status => Self::Status,
            WatchKind::Console => Self::ConsoleLine,
            WatchKind::Stats => Self::Stats,
            WatchKind::InstallProgress => Self::InstallProgress,
            WatchKind::InstallComplete => Self::InstallComplete,
            WatchKind::InstallError => Self::InstallError,
        }
    }
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Display the loaded configuration (tokens redacted)
    Show,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
