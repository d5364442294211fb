//! Watch command: stream push events until interrupted.

use std::io::{self, Write};

use clap::ValueEnum;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};

use gantry_core::{
    ConnectionState, ConnectivityEvent, EntityId, EventKind, ListenerHandle, PushEvent, Session,
    TopicKind,
};

use super::Ctx;
use crate::cli::{OutputFormat, WatchArgs, WatchKind};
use crate::error::CliError;

pub async fn handle(session: &Session, args: WatchArgs, ctx: Ctx) -> Result<(), CliError> {
    let kinds: Vec<EventKind> = if args.kind.is_empty() {
        WatchKind::value_variants().iter().copied().map(EventKind::from).collect()
    } else {
        args.kind.into_iter().map(EventKind::from).collect()
    };

    let server = EntityId::from(args.server);
    session.subscribe(TopicKind::Server, server.clone());
    let mut entities = vec![server];
    if let Some(host) = args.host {
        let host = EntityId::from(host);
        session.subscribe(TopicKind::Host, host.clone());
        entities.push(host);
    }

    let (events, _listeners) = forward(session, &kinds, &entities);
    follow(session, events, ctx).await
}

/// Route matching push events into a channel. Dropping the handles stops
/// delivery.
pub(super) fn forward(
    session: &Session,
    kinds: &[EventKind],
    entities: &[EntityId],
) -> (mpsc::UnboundedReceiver<PushEvent>, Vec<ListenerHandle>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut handles = Vec::with_capacity(kinds.len() * entities.len());
    for &kind in kinds {
        for entity in entities {
            let tx = tx.clone();
            handles.push(session.on_entity(kind, entity.clone(), move |event| {
                let _ = tx.send(event.clone());
            }));
        }
    }
    (rx, handles)
}

/// Print events until Ctrl-C. Connectivity changes go to stderr; a revoked
/// token ends the stream.
pub(super) async fn follow(
    session: &Session,
    mut events: mpsc::UnboundedReceiver<PushEvent>,
    ctx: Ctx,
) -> Result<(), CliError> {
    let mut connectivity = session.connectivity();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            biased;

            signal = &mut interrupt => {
                signal?;
                tracing::debug!("interrupted");
                return Ok(());
            }

            notice = connectivity.recv() => match notice {
                Ok(ConnectivityEvent::AuthRejected { reason }) => {
                    return Err(CliError::AuthFailed {
                        profile: "current".into(),
                        reason,
                    });
                }
                Ok(ConnectivityEvent::StateChanged(state)) if !ctx.quiet => {
                    match state {
                        ConnectionState::Disconnected => eprintln!("-- connection lost, reconnecting"),
                        ConnectionState::Connected => eprintln!("-- reconnected"),
                        ConnectionState::Connecting => {}
                    }
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Err(CliError::Disconnected),
            },

            Some(event) = events.recv() => {
                if !ctx.quiet {
                    let line = render_event(&event, ctx.format)?;
                    let mut stdout = io::stdout().lock();
                    writeln!(stdout, "{line}")?;
                }
            }
        }
    }
}

/// One line per event: JSON Lines in JSON mode, a short summary otherwise.
fn render_event(event: &PushEvent, format: OutputFormat) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string(&json!({
            "event": event.kind.to_string(),
            "entityId": event.entity_id,
            "data": event.payload,
        }))?);
    }

    Ok(match event.kind {
        EventKind::ConsoleLine => event.console_line().unwrap_or_default().to_owned(),
        EventKind::Status => format!(
            "[{}] status: {}",
            event.entity_id,
            event.status().unwrap_or("unknown")
        ),
        EventKind::InstallProgress => match event.progress() {
            Some(pct) => format!("[{}] install: {pct:.0}%", event.entity_id),
            None => format!("[{}] install: in progress", event.entity_id),
        },
        EventKind::InstallComplete => format!("[{}] install: complete", event.entity_id),
        EventKind::InstallError => format!(
            "[{}] install failed: {}",
            event.entity_id,
            event
                .payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
        ),
        EventKind::Stats => format!("[{}] stats: {}", event.entity_id, stats_summary(&event.payload)),
    })
}

/// Compact `key=value` list of the numeric/string stats fields.
fn stats_summary(payload: &Value) -> String {
    payload
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .filter(|(key, _)| key.as_str() != "entityId")
                .filter_map(|(key, value)| match value {
                    Value::Number(n) => Some(format!("{key}={n}")),
                    Value::String(s) => Some(format!("{key}={s}")),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn event(kind: EventKind, payload: Value) -> PushEvent {
        PushEvent {
            kind,
            entity_id: EntityId::from("S1"),
            payload,
        }
    }

    #[test]
    fn console_lines_print_verbatim() {
        let ev = event(EventKind::ConsoleLine, json!({"entityId": "S1", "line": "Done (2.1s)!"}));
        assert_eq!(render_event(&ev, OutputFormat::Table).unwrap(), "Done (2.1s)!");
    }

    #[test]
    fn status_and_progress_are_summarised() {
        let ev = event(EventKind::Status, json!({"entityId": "S1", "status": "running"}));
        assert_eq!(render_event(&ev, OutputFormat::Plain).unwrap(), "[S1] status: running");

        let ev = event(EventKind::InstallProgress, json!({"entityId": "S1", "progress": 42.4}));
        assert_eq!(render_event(&ev, OutputFormat::Plain).unwrap(), "[S1] install: 42%");

        let ev = event(EventKind::InstallError, json!({"entityId": "S1", "error": "disk full"}));
        assert_eq!(render_event(&ev, OutputFormat::Plain).unwrap(), "[S1] install failed: disk full");
    }

    #[test]
    fn stats_skip_the_entity_field() {
        let ev = event(EventKind::Stats, json!({"entityId": "S1", "cpu": 12.5, "state": "up"}));
        assert_eq!(render_event(&ev, OutputFormat::Table).unwrap(), "[S1] stats: cpu=12.5 state=up");
    }

    #[test]
    fn json_mode_emits_one_object_per_line() {
        let ev = event(EventKind::Status, json!({"entityId": "S1", "status": "stopped"}));
        let line = render_event(&ev, OutputFormat::Json).unwrap();
        assert!(!line.contains('\n'));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "server:status");
        assert_eq!(value["entityId"], "S1");
        assert_eq!(value["data"]["status"], "stopped");
    }
}
