//! Table definitions the CLI can open
//!
//! A data file is a JSON object with the table configuration and its rows:
//!
//! ```json
//! {
//!   "config": { "columns": [{ "key": "id", "type": "number", "sortable": true }] },
//!   "rows": [{ "id": 1 }]
//! }
//! ```
//!
//! Without a data file the built-in employee sample is used.

use anyhow::{Context, Result};
use jtable_core::{ColumnDescriptor, Row, Value};
use jtable_services::TableConfig;
use serde::Deserialize;
use std::path::Path;

const DEPARTMENTS: [&str; 4] = ["Engineering", "Sales", "Support", "Finance"];
const FIRST_NAMES: [&str; 8] = ["Ada", "Grace", "Linus", "Barbara", "Ken", "Margaret", "Dennis", "Frances"];
const LAST_NAMES: [&str; 6] = ["Lovelace", "Hopper", "Torvalds", "Liskov", "Thompson", "Hamilton"];

/// Configuration and rows loaded from disk or generated
#[derive(Debug, Deserialize)]
pub struct Dataset {
    pub config: TableConfig,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Dataset {
    /// Load a data file; predicates and accessors cannot be expressed in JSON
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file {:?}", path))?;
        let dataset: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse data file {:?}", path))?;
        tracing::debug!(
            columns = dataset.config.columns.len(),
            rows = dataset.rows.len(),
            "Loaded data file {:?}",
            path
        );
        Ok(dataset)
    }

    /// Generated employee table with `count` rows
    pub fn sample(count: usize) -> Self {
        Self {
            config: TableConfig::client(sample_columns()),
            rows: (1..=count as i64).map(sample_row).collect(),
        }
    }
}

pub fn sample_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::number("id", "ID").sortable(),
        ColumnDescriptor::text("name", "Name")
            .sortable()
            .filterable()
            .searchable()
            .editable()
            .required(),
        ColumnDescriptor::enumeration("department", "Department", DEPARTMENTS)
            .sortable()
            .filterable()
            .searchable()
            .editable(),
        ColumnDescriptor::number("salary", "Salary")
            .sortable()
            .filterable()
            .editable()
            .with_validator(|value| match value.as_f64() {
                Some(salary) if salary < 0.0 => Err("must not be negative".to_string()),
                _ => Ok(()),
            }),
        ColumnDescriptor::date("hired", "Hired").sortable().filterable(),
        ColumnDescriptor::new("remote", "Remote", jtable_core::ValueKind::Boolean)
            .filterable()
            .editable(),
    ]
}

fn sample_row(id: i64) -> Row {
    let index = id as usize;
    let name = format!(
        "{} {}",
        FIRST_NAMES[index % FIRST_NAMES.len()],
        LAST_NAMES[(index / FIRST_NAMES.len()) % LAST_NAMES.len()]
    );
    // Every seventh employee has no recorded salary
    let salary = if id % 7 == 0 {
        Value::Null
    } else {
        Value::from(40_000 + (id * 3_517) % 60_000)
    };
    Row::new()
        .with("id", id)
        .with("name", name)
        .with("department", DEPARTMENTS[index % DEPARTMENTS.len()])
        .with("salary", salary)
        .with("hired", format!("20{:02}-{:02}-{:02}", 15 + id % 10, 1 + id % 12, 1 + id % 28))
        .with("remote", id % 3 == 0)
}
