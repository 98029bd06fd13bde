//! Terminal rendering of table snapshots

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use jtable_core::{ColumnDescriptor, SortDirection, Value, ValueKind};
use jtable_services::{Pagination, TableSnapshot, TableStatus};

/// Render the visible page with sort markers and a status line
pub fn render_snapshot(columns: &[ColumnDescriptor], snapshot: &TableSnapshot) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(
        columns
            .iter()
            .map(|column| header_cell(column, snapshot))
            .collect::<Vec<_>>(),
    );

    for row in &snapshot.result.rows {
        table.add_row(
            columns
                .iter()
                .map(|column| value_cell(column.kind, &column.value_of(row)))
                .collect::<Vec<_>>(),
        );
    }

    for (index, column) in columns.iter().enumerate() {
        if column.kind == ValueKind::Number {
            if let Some(table_column) = table.column_mut(index) {
                table_column.set_cell_alignment(CellAlignment::Right);
            }
        }
    }

    format!("{}\n{}", table, status_line(snapshot))
}

fn header_cell(column: &ColumnDescriptor, snapshot: &TableSnapshot) -> Cell {
    let query = &snapshot.query;
    let marker = match (&query.sort_field, query.sort_direction) {
        (Some(field), SortDirection::Ascending) if *field == column.key => " ▲",
        (Some(field), SortDirection::Descending) if *field == column.key => " ▼",
        _ => "",
    };
    let filtered = query.filters.get(&column.key).is_some_and(|f| !f.is_empty());
    let label = format!(
        "{}{}{}",
        column.display_label(),
        marker,
        if filtered { " *" } else { "" }
    );
    Cell::new(label).add_attribute(Attribute::Bold)
}

fn value_cell(kind: ValueKind, value: &Value) -> Cell {
    match value {
        Value::Null => Cell::new("NULL").fg(Color::DarkGrey),
        Value::Bool(true) => Cell::new("yes").fg(Color::Green),
        Value::Bool(false) => Cell::new("no").fg(Color::DarkGrey),
        other if kind == ValueKind::Enum => Cell::new(other.display_text()).fg(Color::Cyan),
        other => Cell::new(other.display_text()),
    }
}

/// "Showing 11-20 of 95 (page 2 of 10)" plus loading/error markers
pub fn status_line(snapshot: &TableSnapshot) -> String {
    let pagination = Pagination::new(
        snapshot.query.page,
        snapshot.query.page_size,
        snapshot.result.total_count,
        snapshot.result.rows.len(),
    );
    let mut line = pagination.status_text();
    if snapshot.query.has_search() {
        line.push_str(&format!(" | search: {:?}", snapshot.query.search_text));
    }
    match snapshot.status {
        TableStatus::Resolving => line.push_str(" | loading..."),
        TableStatus::Error => {
            if let Some(error) = &snapshot.result.error {
                line.push_str(&format!(" | error: {}", error));
            }
        }
        TableStatus::Idle => {}
    }
    line
}
