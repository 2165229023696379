//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one line per item.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use patchbay_core::Action;

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// One-character marker for an action: `+`, `~` or `-`.
pub fn action_marker(action: Action, color: bool) -> String {
    let marker = match action {
        Action::New => "+",
        Action::Modified => "~",
        Action::Removed => "-",
    };
    if !color {
        return marker.to_owned();
    }
    match action {
        Action::New => marker.green().to_string(),
        Action::Modified => marker.yellow().to_string(),
        Action::Removed => marker.red().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `line_fn` on each item to emit one line per item
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    line_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&line_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since composite views don't map onto one `Tabled` row type.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    plain_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => plain_fn(data),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub(crate) fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Tabled)]
    struct Row {
        name: String,
        value: u32,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                name: "a".into(),
                value: 1,
            },
            Row {
                name: "b".into(),
                value: 2,
            },
        ]
    }

    fn same(r: &Row) -> Row {
        Row {
            name: r.name.clone(),
            value: r.value,
        }
    }

    #[test]
    fn plain_emits_one_line_per_item() {
        let out = render_list(OutputFormat::Plain, &rows(), same, |r| r.name.clone());
        assert_eq!(out, "a\nb");
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_list(OutputFormat::JsonCompact, &rows(), same, |r| r.name.clone());
        assert_eq!(out, r#"[{"name":"a","value":1},{"name":"b","value":2}]"#);
    }

    #[test]
    fn table_has_headers() {
        let out = render_list(OutputFormat::Table, &rows(), same, |r| r.name.clone());
        assert!(out.contains("name") && out.contains("value"), "{out}");
    }

    #[test]
    fn markers_without_color_are_bare() {
        assert_eq!(action_marker(Action::New, false), "+");
        assert_eq!(action_marker(Action::Removed, false), "-");
        assert!(action_marker(Action::Modified, true).contains('~'));
    }
}
