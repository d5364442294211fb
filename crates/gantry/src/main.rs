mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gantry_core::{CoreError, Session};

use crate::cli::{Cli, Command};
use crate::commands::Ctx;
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
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a daemon connection
        Command::Config(ref args) => commands::config_cmd::handle(args, &cli.global),

        // Shell completions generation
        Command::Completions(ref args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "gantry", &mut std::io::stdout());
            Ok(())
        }

        // All other commands require a daemon connection
        cmd => {
            let cfg = gantry_config::load_config_or_default();
            let resolved = config::resolve(&cli.global, &cfg)?;
            let ctx = Ctx {
                format: config::output_format(&cli.global, &cfg),
                quiet: cli.global.quiet,
            };

            let url = resolved.session.daemon_url.to_string();
            let session = Session::websocket(resolved.session);
            session.connect()?;

            if let Err(e) = session.wait_until_connected(resolved.connect_timeout).await {
                session.disconnect().await;
                return Err(match e {
                    CoreError::AuthenticationFailed { message } => CliError::AuthFailed {
                        profile: resolved.profile_name,
                        reason: message,
                    },
                    CoreError::ConnectionFailed { reason } => {
                        CliError::ConnectionFailed { url, reason }
                    }
                    other => other.into(),
                });
            }

            tracing::debug!(command = ?cmd, daemon = %url, "dispatching command");
            let result = commands::dispatch(cmd, &session, ctx).await;
            session.disconnect().await;
            result
        }
    }
}
