//! Files command handlers.

use std::io::{self, Read, Write};

use bytesize::ByteSize;
use tabled::Tabled;

use gantry_core::{DirectoryEntry, EntityId, Session};

use super::Ctx;
use crate::cli::{FilesArgs, FilesCommand, OutputFormat};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: &'static str,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

fn entry_row(e: &DirectoryEntry) -> EntryRow {
    EntryRow {
        name: e.name.clone(),
        kind: entry_kind(e),
        size: if e.is_directory {
            "-".into()
        } else {
            ByteSize::b(e.size).to_string()
        },
        modified: e
            .modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
    }
}

fn entry_kind(e: &DirectoryEntry) -> &'static str {
    if e.is_directory {
        "dir"
    } else if e.is_file {
        "file"
    } else {
        "other"
    }
}

/// Directories first, then by name.
fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: FilesArgs, ctx: Ctx) -> Result<(), CliError> {
    match args.command {
        FilesCommand::Ls { server, path } => {
            let mut entries = session.list_directory(&EntityId::from(server), &path).await?;
            sort_entries(&mut entries);
            let out = output::render_list(ctx.format, &entries, entry_row, |e| {
                if e.is_directory {
                    format!("{}/", e.name)
                } else {
                    e.name.clone()
                }
            })?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }

        FilesCommand::Cat { server, path } => {
            let content = session.read_file(&EntityId::from(server), &path).await?;
            if ctx.format == OutputFormat::Json {
                let out = output::render_json(&serde_json::json!({
                    "path": path,
                    "content": content,
                }))?;
                output::print_output(&out, ctx.quiet);
            } else if !ctx.quiet {
                let mut stdout = io::stdout().lock();
                stdout.write_all(content.as_bytes())?;
                stdout.flush()?;
            }
            Ok(())
        }

        FilesCommand::Write {
            server,
            path,
            from,
            binary,
        } => {
            let bytes = match from {
                Some(file) => std::fs::read(&file)?,
                None => {
                    let mut buf = Vec::new();
                    io::stdin().lock().read_to_end(&mut buf)?;
                    buf
                }
            };
            let server = EntityId::from(server);
            if binary {
                session.write_binary_file(&server, &path, &bytes).await?;
            } else {
                let text = String::from_utf8(bytes).map_err(|_| CliError::Validation {
                    field: "contents".into(),
                    reason: "input is not valid UTF-8; pass --binary to upload raw bytes".into(),
                })?;
                session.write_file(&server, &path, &text).await?;
            }
            output::print_done(ctx.format, ctx.quiet, "written", &path);
            Ok(())
        }

        FilesCommand::Mkdir { server, path } => {
            session.create_directory(&EntityId::from(server), &path).await?;
            output::print_done(ctx.format, ctx.quiet, "created", &path);
            Ok(())
        }

        FilesCommand::Mv { server, from, to } => {
            session.rename(&EntityId::from(server), &from, &to).await?;
            output::print_done(ctx.format, ctx.quiet, "renamed", &format!("{from} -> {to}"));
            Ok(())
        }

        FilesCommand::Rm { server, paths } => {
            session.delete(&EntityId::from(server), &paths).await?;
            output::print_done(ctx.format, ctx.quiet, "deleted", &paths.join(", "));
            Ok(())
        }
    }
}
