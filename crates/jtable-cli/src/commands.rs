//! Subcommand implementations

use anyhow::{Context, Result, anyhow, bail};
use jtable_core::{ColumnDescriptor, FilterValue, Row, RowKey, SortDirection, Value, ValueKind};
use jtable_services::{
    DataBacking, ResolutionOutcome, TableConfig, TableController, TableMode, TableSettings,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cli::{AddArgs, DeleteArgs, QueryArgs, TableArgs, UpdateArgs, ViewArgs};
use crate::dataset::Dataset;
use crate::render::{render_snapshot, status_line};
use crate::source::InMemorySource;

/// Default settings location under the user's config directory
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jtable")
        .join("settings.json")
}

pub fn run_settings(path: &Path, init: bool) -> Result<()> {
    if init && !path.exists() {
        TableSettings::default().save_to(path)?;
        println!("Created {}", path.display());
    }
    let settings = TableSettings::load_from(path)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub async fn run_view(args: ViewArgs, settings: &TableSettings) -> Result<()> {
    let controller = open_table(&args.table, settings, args.query.page_size).await?;
    apply_query(&controller, &args.query).await?;

    let snapshot = controller.snapshot();
    if args.json {
        let output = serde_json::json!({
            "query": snapshot.query,
            "rows": snapshot.result.rows,
            "total_count": snapshot.result.total_count,
            "version": snapshot.version,
            "pagination": controller.pagination(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", render_snapshot(controller.columns(), &snapshot));
    }
    Ok(())
}

pub async fn run_add(args: AddArgs, settings: &TableSettings) -> Result<()> {
    let controller = open_table(&args.table, settings, None).await?;
    let row = parse_fields(controller.columns(), &args.fields)?;
    let stored = controller.add_row(row).await?;
    println!("Added {}", row_summary(&stored));
    println!("{}", render_snapshot(controller.columns(), &controller.snapshot()));
    Ok(())
}

pub async fn run_update(args: UpdateArgs, settings: &TableSettings) -> Result<()> {
    let controller = open_table(&args.table, settings, None).await?;
    let id = parse_id(&controller, &args.id)?;
    page_to_row(&controller, &id).await?;
    let patch = parse_fields(controller.columns(), &args.fields)?;
    let stored = controller.update_row(id, patch).await?;
    println!("Updated {}", row_summary(&stored));
    println!("{}", render_snapshot(controller.columns(), &controller.snapshot()));
    Ok(())
}

pub async fn run_delete(args: DeleteArgs, settings: &TableSettings) -> Result<()> {
    let controller = open_table(&args.table, settings, None).await?;
    let id = parse_id(&controller, &args.id)?;
    page_to_row(&controller, &id).await?;
    let removed = controller.delete_row(id).await?;
    println!("Deleted {}", row_summary(&removed));
    println!("{}", render_snapshot(controller.columns(), &controller.snapshot()));
    Ok(())
}

/// Build the controller for a table and load its first page
async fn open_table(
    args: &TableArgs,
    settings: &TableSettings,
    page_size: Option<usize>,
) -> Result<TableController> {
    let dataset = match &args.data {
        Some(path) => Dataset::load(path)?,
        None => Dataset::sample(args.sample_rows),
    };

    let mut config = settings.apply_to(dataset.config);
    if let Some(page_size) = page_size {
        config = config.with_page_size(page_size);
    }

    let controller = if args.server {
        config.mode = TableMode::Server;
        let source = InMemorySource::new(&config, dataset.rows)
            .with_latency(Duration::from_millis(args.latency_ms));
        tracing::debug!(
            rows = source.row_count(),
            latency_ms = args.latency_ms,
            "Serving table from in-memory data source"
        );
        TableController::new(config, DataBacking::Server(Arc::new(source)))?
    } else {
        config.mode = TableMode::Client;
        TableController::new(config, DataBacking::Client(dataset.rows))?
    };

    if controller.mode() == TableMode::Server {
        controller.subscribe(|snapshot| {
            tracing::debug!(version = snapshot.version, "{}", status_line(snapshot));
        });
        expect_committed(controller.load().await)?;
    }
    Ok(controller)
}

async fn apply_query(controller: &TableController, query: &QueryArgs) -> Result<()> {
    if let Some(sort) = &query.sort {
        let (column, direction) = parse_sort(sort);
        ensure_column(controller.config(), column)?;
        expect_committed(controller.set_sort(column, direction).await)?;
    }
    for filter in &query.filters {
        let (column, value) = parse_filter(controller.columns(), filter)?;
        expect_committed(controller.set_filter(&column, value).await)?;
    }
    if let Some(search) = &query.search {
        expect_committed(controller.set_search(search).await)?;
    }
    if query.page > 1 {
        expect_committed(controller.set_page(query.page).await)?;
    }
    Ok(())
}

/// Server-mode edits act on the cached page, so page forward until the row
/// is on it. Stops at the last page and leaves the NotFound to the edit.
async fn page_to_row(controller: &TableController, id: &Value) -> Result<()> {
    if controller.mode() != TableMode::Server {
        return Ok(());
    }
    let id_field = &controller.config().id_field;
    let key = RowKey::from_value(id);
    loop {
        let on_page = controller
            .result()
            .rows
            .iter()
            .any(|row| key.is_some() && row.key(id_field) == key);
        if on_page || !controller.pagination().can_go_next() {
            return Ok(());
        }
        expect_committed(controller.next_page().await)?;
    }
}

fn expect_committed(outcome: ResolutionOutcome) -> Result<()> {
    match outcome.error() {
        Some(error) => Err(anyhow!("{}", error)).context("Failed to resolve table page"),
        None => Ok(()),
    }
}

fn ensure_column<'a>(config: &'a TableConfig, key: &str) -> Result<&'a ColumnDescriptor> {
    config
        .column(key)
        .ok_or_else(|| anyhow!("Unknown column '{}'", key))
}

fn parse_id(controller: &TableController, text: &str) -> Result<Value> {
    let kind = controller
        .config()
        .column(&controller.config().id_field)
        .map(|c| c.kind)
        .unwrap_or_default();
    Ok(parse_value(kind, text))
}

/// `name` sorts ascending, `-name` descending
pub fn parse_sort(text: &str) -> (&str, SortDirection) {
    match text.strip_prefix('-') {
        Some(column) => (column, SortDirection::Descending),
        None => (text.strip_prefix('+').unwrap_or(text), SortDirection::Ascending),
    }
}

/// Parse `COLUMN=EXPR` into a typed filter for that column
pub fn parse_filter(columns: &[ColumnDescriptor], text: &str) -> Result<(String, FilterValue)> {
    let (key, expr) = text
        .split_once('=')
        .with_context(|| format!("Filter '{}' is not COLUMN=EXPR", text))?;
    let column = columns
        .iter()
        .find(|c| c.key == key)
        .ok_or_else(|| anyhow!("Unknown column '{}'", key))?;

    let value = if let Some((min, max)) = expr.split_once("..") {
        FilterValue::Range {
            min: (!min.is_empty()).then(|| parse_value(column.kind, min)),
            max: (!max.is_empty()).then(|| parse_value(column.kind, max)),
        }
    } else if expr.contains('|') {
        FilterValue::OneOf(expr.split('|').map(|v| parse_value(column.kind, v)).collect())
    } else {
        match column.kind {
            ValueKind::Enum | ValueKind::Boolean => FilterValue::Equals(parse_value(column.kind, expr)),
            _ => FilterValue::Text(expr.to_string()),
        }
    };
    Ok((key.to_string(), value))
}

/// Parse `FIELD=VALUE` pairs into a row, typing values by column
pub fn parse_fields(columns: &[ColumnDescriptor], fields: &[String]) -> Result<Row> {
    let mut row = Row::new();
    for field in fields {
        let Some((key, text)) = field.split_once('=') else {
            bail!("Field '{}' is not FIELD=VALUE", field);
        };
        let kind = columns
            .iter()
            .find(|c| c.key == key)
            .map(|c| c.kind)
            .unwrap_or_default();
        row.set(key, parse_value(kind, text));
    }
    Ok(row)
}

/// Parse a command-line value for a column kind; unparseable input stays text
pub fn parse_value(kind: ValueKind, text: &str) -> Value {
    let text = text.trim();
    if text.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    match kind {
        ValueKind::Number => text
            .parse::<i64>()
            .map(Value::Int64)
            .or_else(|_| text.parse::<f64>().map(Value::Float64))
            .unwrap_or_else(|_| Value::from(text)),
        ValueKind::Boolean => Value::from(text).as_bool().map(Value::Bool).unwrap_or_else(|| Value::from(text)),
        _ => Value::from(text),
    }
}

fn row_summary(row: &Row) -> String {
    row.fields()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(", ")
}
