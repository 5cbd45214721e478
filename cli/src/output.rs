//! Result rendering.
//!
//! Flat rows are shown as a table, anything nested as pretty-printed JSON.

use comfy_table::{presets::UTF8_BORDERS_ONLY, Cell, ContentArrangement, Table};
use serde_json::Value;
use shared::backends::{Outcome, QueryOutput, Row};

/// Renders the outcome of a query for the terminal.
pub fn render_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Data(output) => render_output(output),
        Outcome::Rejected { reason } => format!("Error: {reason}"),
    }
}

fn render_output(output: &QueryOutput) -> String {
    match output {
        QueryOutput::Rows(rows) if rows.iter().all(is_flat) => render_table(rows),
        QueryOutput::Rows(rows) => pretty(&Value::Array(
            rows.iter().cloned().map(Value::Object).collect(),
        )),
        QueryOutput::Aggregations(aggregations) => pretty(&Value::Object(aggregations.clone())),
        QueryOutput::Count(count) => format!("count: {count}"),
        QueryOutput::Echo(value) => pretty(value),
    }
}

fn render_table(rows: &[Row]) -> String {
    if rows.is_empty() {
        return "(0 rows)".to_string();
    }

    // Rows may carry different keys; the header is their union in first-seen order.
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns.iter().map(Cell::new));

    for row in rows {
        table.add_row(
            columns
                .iter()
                .map(|column| Cell::new(row.get(*column).map_or_else(String::new, cell_text))),
        );
    }

    let noun = if rows.len() == 1 { "row" } else { "rows" };
    format!("{table}\n({} {noun})", rows.len())
}

fn is_flat(row: &Row) -> bool {
    row.values()
        .all(|value| !matches!(value, Value::Object(_) | Value::Array(_)))
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
