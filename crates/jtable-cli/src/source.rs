//! In-process data source for exercising server mode from the CLI

use async_trait::async_trait;
use jtable_core::{
    ColumnDescriptor, DataSource, DataSourceError, MutationKind, PageRequest, PageResponse, QueryState,
    Result, Row, Value,
};
use jtable_services::{FilterEvaluator, TableConfig, sort_rows};
use parking_lot::RwLock;
use std::time::Duration;

/// Holds rows in memory and answers page requests the way a backend would
pub struct InMemorySource {
    columns: Vec<ColumnDescriptor>,
    id_field: String,
    evaluator: FilterEvaluator,
    rows: RwLock<Vec<Row>>,
    latency: Duration,
}

impl InMemorySource {
    pub fn new(config: &TableConfig, rows: Vec<Row>) -> Self {
        Self {
            columns: config.columns.clone(),
            id_field: config.id_field.clone(),
            evaluator: FilterEvaluator::from_config(config),
            rows: RwLock::new(rows),
            latency: Duration::ZERO,
        }
    }

    /// Delay every call, to make loading states visible
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn page(&self, request: &PageRequest) -> PageResponse {
        let query = QueryState {
            page: request.page,
            page_size: request.page_size,
            sort_field: request.sort_field.clone(),
            sort_direction: request.sort_direction,
            filters: request.filters.clone(),
            search_text: request.search_text.clone(),
        };

        let rows = self.rows.read();
        let mut selected = self.evaluator.select(rows.iter(), &query, &self.columns);
        let sort_column = request
            .sort_field
            .as_deref()
            .and_then(|key| self.columns.iter().find(|c| c.key == key && c.sortable));
        if let Some(column) = sort_column {
            sort_rows(&mut selected, column, request.sort_direction);
        }

        PageResponse {
            total_count: selected.len() as u64,
            rows: selected
                .into_iter()
                .skip(request.offset())
                .take(request.page_size)
                .cloned()
                .collect(),
        }
    }

    fn next_id(rows: &[Row], id_field: &str) -> i64 {
        rows.iter()
            .filter_map(|r| r.get(id_field).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }

    fn position(&self, rows: &[Row], payload: &Row) -> Result<usize> {
        let key = payload
            .key(&self.id_field)
            .ok_or_else(|| DataSourceError::Rejected(format!("payload has no '{}'", self.id_field)))?;
        rows.iter()
            .position(|r| r.key(&self.id_field).as_ref() == Some(&key))
            .ok_or_else(|| DataSourceError::NotFound(key.to_string()))
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse> {
        self.simulate_latency().await;
        Ok(self.page(&request))
    }

    async fn mutate(&self, kind: MutationKind, payload: Row) -> Result<Row> {
        self.simulate_latency().await;
        let mut rows = self.rows.write();
        match kind {
            MutationKind::Add => {
                let mut row = payload;
                if row.key(&self.id_field).is_none() {
                    row.set(self.id_field.clone(), Self::next_id(&rows, &self.id_field));
                } else if self.position(&rows, &row).is_ok() {
                    return Err(DataSourceError::Rejected("duplicate identifier".into()));
                }
                rows.push(row.clone());
                Ok(row)
            }
            MutationKind::Update => {
                let index = self.position(&rows, &payload)?;
                rows[index].merge(&payload);
                Ok(rows[index].clone())
            }
            MutationKind::Delete => {
                let index = self.position(&rows, &payload)?;
                Ok(rows.remove(index))
            }
        }
    }
}
