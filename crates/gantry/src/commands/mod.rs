//! Command dispatch: bridges CLI args -> session operations -> output.

pub mod config_cmd;
pub mod console;
pub mod files;
pub mod watch;

use gantry_core::Session;

use crate::cli::{Command, OutputFormat};
use crate::error::CliError;

/// Per-invocation settings every handler reads.
#[derive(Debug, Clone, Copy)]
pub struct Ctx {
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Dispatch a daemon-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, ctx: Ctx) -> Result<(), CliError> {
    match cmd {
        Command::Files(args) => files::handle(session, args, ctx).await,
        Command::Console(args) => console::handle(session, args, ctx).await,
        Command::Watch(args) => watch::handle(session, args, ctx).await,
        // Config and Completions are handled before a session exists
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
