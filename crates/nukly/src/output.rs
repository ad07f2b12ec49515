//! Output formatting: table, JSON, plain.

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;

/// Render a list in the chosen format.
///
/// `table` builds rows with `to_row`; `plain` emits `id_fn` per item.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => render_json(data),
        OutputFormat::Plain => data.iter().map(id_fn).collect::<Vec<_>>().join("\n"),
    }
}

pub fn print_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Item {
        id: u64,
        ip: &'static str,
    }

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "ID")]
        id: u64,
        #[tabled(rename = "IP")]
        ip: &'static str,
    }

    fn items() -> Vec<Item> {
        vec![
            Item { id: 1, ip: "10.0.0.2" },
            Item { id: 2, ip: "10.0.0.3" },
        ]
    }

    fn row(i: &Item) -> Row {
        Row { id: i.id, ip: i.ip }
    }

    #[test]
    fn table_has_headers_and_rows() {
        let out = render_list(&OutputFormat::Table, &items(), row, |i| i.id.to_string());
        assert!(out.contains("ID"));
        assert!(out.contains("10.0.0.3"));
    }

    #[test]
    fn json_round_trips() {
        let out = render_list(&OutputFormat::Json, &items(), row, |i| i.id.to_string());
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[1]["ip"], "10.0.0.3");
    }

    #[test]
    fn plain_lists_identifiers() {
        let out = render_list(&OutputFormat::Plain, &items(), row, |i| i.id.to_string());
        assert_eq!(out, "1\n2");
    }
}
