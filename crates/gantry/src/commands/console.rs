//! Console command: send one line of input, optionally following output.

use gantry_core::{EntityId, EventKind, Session, TopicKind};

use super::{Ctx, watch};
use crate::cli::ConsoleArgs;
use crate::error::CliError;
use crate::output;

pub async fn handle(session: &Session, args: ConsoleArgs, ctx: Ctx) -> Result<(), CliError> {
    let server = EntityId::from(args.server);
    let line = args.command.join(" ");

    if !args.follow {
        session.send_console_command(&server, &line)?;
        output::print_done(ctx.format, ctx.quiet, "sent", &line);
        return Ok(());
    }

    // Subscribe before sending so the command's own output is not missed.
    session.subscribe(TopicKind::Server, server.clone());
    let (events, _listeners) =
        watch::forward(session, &[EventKind::ConsoleLine], std::slice::from_ref(&server));
    session.send_console_command(&server, &line)?;
    watch::follow(session, events, ctx).await
}
