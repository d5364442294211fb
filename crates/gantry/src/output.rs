//! Output formatting: table, JSON, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! JSON uses serde, plain emits one identifier per line.

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: maps each item through `to_row` and builds a rounded table
/// - `json`: serializes the original data via serde
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data)?,
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

/// One-line confirmation for mutations. JSON mode prints a small object so
/// scripts get a parseable result either way.
pub fn print_done(format: OutputFormat, quiet: bool, action: &str, target: &str) {
    let line = match format {
        OutputFormat::Json => serde_json::json!({ "ok": true, "action": action, "target": target })
            .to_string(),
        OutputFormat::Table | OutputFormat::Plain => format!("{action}: {target}"),
    };
    print_output(&line, quiet);
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Pretty-printed JSON.
pub fn render_json<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(data)?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        name: String,
        size: u64,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "Name")]
        name: String,
    }

    fn items() -> Vec<Item> {
        vec![
            Item {
                name: "world".into(),
                size: 0,
            },
            Item {
                name: "server.jar".into(),
                size: 4096,
            },
        ]
    }

    fn render(format: OutputFormat) -> String {
        render_list(
            format,
            &items(),
            |i| Row {
                name: i.name.clone(),
            },
            |i| i.name.clone(),
        )
        .unwrap()
    }

    #[test]
    fn plain_is_one_identifier_per_line() {
        assert_eq!(render(OutputFormat::Plain), "world\nserver.jar");
    }

    #[test]
    fn json_keeps_all_fields() {
        let value: serde_json::Value = serde_json::from_str(&render(OutputFormat::Json)).unwrap();
        assert_eq!(value[1]["size"], 4096);
    }

    #[test]
    fn table_has_header_and_rows() {
        let table = render(OutputFormat::Table);
        assert!(table.contains("Name"));
        assert!(table.contains("server.jar"));
        assert!(table.starts_with('╭'));
    }
}
