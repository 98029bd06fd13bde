//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::oneshot;
use jtable_core::{
    ColumnDescriptor, DataSource, DataSourceError, FilterValue, MutationKind, PageRequest,
    PageResponse, Result, Row, RowKey, SortDirection, Value,
};
use jtable_services::{
    DataBacking, MutationPolicy, TableConfig, TableController, compare_values,
};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::{Arc, Once};

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer tracing subscriber once per test binary
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("jtable_services=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Columns shared by most tests: id, name, age, city, joined
pub fn people_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::number("id", "ID").sortable(),
        ColumnDescriptor::text("name", "Name")
            .sortable()
            .filterable()
            .searchable()
            .editable()
            .required(),
        ColumnDescriptor::number("age", "Age").sortable().filterable().editable(),
        ColumnDescriptor::enumeration("city", "City", ["Oslo", "Lima", "Kyoto"])
            .sortable()
            .filterable()
            .searchable()
            .editable(),
        ColumnDescriptor::date("joined", "Joined").sortable().filterable(),
    ]
}

/// `count` people with ids 1..=count and deterministic attributes
pub fn people(count: i64) -> Vec<Row> {
    const CITIES: [&str; 3] = ["Oslo", "Lima", "Kyoto"];
    (1..=count)
        .map(|i| {
            Row::new()
                .with("id", i)
                .with("name", format!("Person {:03}", i))
                .with("age", 20 + (i * 7) % 50)
                .with("city", CITIES[(i % 3) as usize])
                .with("joined", format!("2024-{:02}-{:02}", 1 + (i % 12), 1 + (i % 28)))
        })
        .collect()
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .filter_map(|r| r.get("id").and_then(Value::as_i64))
        .collect()
}

pub fn client_controller(rows: Vec<Row>) -> TableController {
    init_logging();
    TableController::new(TableConfig::client(people_columns()), DataBacking::Client(rows))
        .expect("valid client table")
}

pub fn server_controller(source: Arc<MockDataSource>) -> TableController {
    server_controller_with(source, MutationPolicy::Optimistic)
}

pub fn server_controller_with(source: Arc<MockDataSource>, policy: MutationPolicy) -> TableController {
    init_logging();
    let config = TableConfig::server(people_columns()).with_mutation_policy(policy);
    TableController::new(config, DataBacking::Server(source)).expect("valid server table")
}

/// In-memory data source for exercising server-mode behavior.
///
/// Pages, sorts, filters and searches its own row set roughly the way a
/// backend would. Fetches and mutations can be made to fail, answered with
/// canned responses, or held until the test releases them.
pub struct MockDataSource {
    pub name: String,
    rows: Mutex<Vec<Row>>,
    responses: Mutex<VecDeque<PageResponse>>,
    fetch_failures: Mutex<VecDeque<DataSourceError>>,
    mutation_failures: Mutex<VecDeque<DataSourceError>>,
    fetch_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    mutation_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    /// Every page request received, in order
    pub fetch_log: Mutex<Vec<PageRequest>>,
    /// Every mutation received, in order
    pub mutation_log: Mutex<Vec<(MutationKind, Row)>>,
}

impl MockDataSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            name: "mock".to_string(),
            rows: Mutex::new(rows),
            responses: Mutex::new(VecDeque::new()),
            fetch_failures: Mutex::new(VecDeque::new()),
            mutation_failures: Mutex::new(VecDeque::new()),
            fetch_gates: Mutex::new(VecDeque::new()),
            mutation_gates: Mutex::new(VecDeque::new()),
            fetch_log: Mutex::new(Vec::new()),
            mutation_log: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self::new(rows))
    }

    /// Answer the next fetch with this response instead of computing one
    pub fn respond_with(&self, response: PageResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn fail_next_fetch(&self) {
        self.fetch_failures
            .lock()
            .push_back(DataSourceError::Transport("connection refused".into()));
    }

    pub fn fail_next_mutation(&self) {
        self.mutation_failures
            .lock()
            .push_back(DataSourceError::Rejected("constraint violation".into()));
    }

    /// Hold the next fetch until the returned sender fires (or is dropped)
    pub fn hold_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.fetch_gates.lock().push_back(rx);
        tx
    }

    /// Hold the next mutation until the returned sender fires (or is dropped)
    pub fn hold_next_mutation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.mutation_gates.lock().push_back(rx);
        tx
    }

    pub fn replace_rows(&self, rows: Vec<Row>) {
        *self.rows.lock() = rows;
    }

    pub fn stored_row(&self, id: i64) -> Option<Row> {
        self.rows
            .lock()
            .iter()
            .find(|r| r.get("id").and_then(Value::as_i64) == Some(id))
            .cloned()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_log.lock().len()
    }

    pub fn fetch_log(&self) -> Vec<PageRequest> {
        self.fetch_log.lock().clone()
    }

    pub fn mutation_log(&self) -> Vec<(MutationKind, Row)> {
        self.mutation_log.lock().clone()
    }

    fn matches(row: &Row, request: &PageRequest) -> bool {
        let search = request.search_text.to_lowercase();
        let searched = search.is_empty()
            || ["name", "city"].iter().any(|field| {
                row.get(field)
                    .is_some_and(|v| v.display_text().to_lowercase().contains(&search))
            });
        let filtered = request.filters.iter().all(|(field, filter)| {
            let value = row.get(field).cloned().unwrap_or_default();
            match filter {
                FilterValue::Text(text) => value
                    .display_text()
                    .to_lowercase()
                    .contains(&text.to_lowercase()),
                FilterValue::Equals(expected) => value.display_text() == expected.display_text(),
                FilterValue::OneOf(options) => options
                    .iter()
                    .any(|o| o.display_text() == value.display_text()),
                FilterValue::Range { min, max } => {
                    let number = value.as_f64();
                    min.as_ref()
                        .and_then(Value::as_f64)
                        .is_none_or(|m| number.is_some_and(|n| n >= m))
                        && max
                            .as_ref()
                            .and_then(Value::as_f64)
                            .is_none_or(|m| number.is_some_and(|n| n <= m))
                }
            }
        });
        searched && filtered
    }

    fn compute_page(&self, request: &PageRequest) -> PageResponse {
        let rows = self.rows.lock();
        let mut matching: Vec<Row> = rows
            .iter()
            .filter(|row| Self::matches(row, request))
            .cloned()
            .collect();

        if let Some(field) = &request.sort_field {
            let kind = people_columns()
                .into_iter()
                .find(|c| &c.key == field)
                .map(|c| c.kind)
                .unwrap_or_default();
            matching.sort_by(|a, b| {
                let a = a.get(field).cloned().unwrap_or_default();
                let b = b.get(field).cloned().unwrap_or_default();
                let ordering = compare_values(kind, &a, &b);
                match request.sort_direction {
                    SortDirection::Descending => ordering.reverse(),
                    _ => ordering,
                }
            });
        }

        let total_count = matching.len() as u64;
        let rows = matching
            .into_iter()
            .skip(request.offset())
            .take(request.page_size)
            .collect();
        PageResponse { rows, total_count }
    }

    fn key_of(row: &Row) -> Option<RowKey> {
        row.key("id")
    }

    fn apply_mutation(&self, kind: MutationKind, payload: Row) -> Result<Row> {
        let mut rows = self.rows.lock();
        match kind {
            MutationKind::Add => {
                let mut row = payload;
                if Self::key_of(&row).is_none() {
                    let next = rows
                        .iter()
                        .filter_map(|r| r.get("id").and_then(Value::as_i64))
                        .max()
                        .unwrap_or(0)
                        + 1;
                    row.set("id", next);
                }
                rows.push(row.clone());
                Ok(row)
            }
            MutationKind::Update => {
                let key = Self::key_of(&payload);
                let row = rows
                    .iter_mut()
                    .find(|r| Self::key_of(r) == key)
                    .ok_or_else(|| DataSourceError::NotFound(format!("{:?}", key)))?;
                row.merge(&payload);
                Ok(row.clone())
            }
            MutationKind::Delete => {
                let key = Self::key_of(&payload);
                let index = rows
                    .iter()
                    .position(|r| Self::key_of(r) == key)
                    .ok_or_else(|| DataSourceError::NotFound(format!("{:?}", key)))?;
                Ok(rows.remove(index))
            }
        }
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse> {
        self.fetch_log.lock().push(request.clone());
        let failure = self.fetch_failures.lock().pop_front();
        let gate = self.fetch_gates.lock().pop_front();

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = failure {
            return Err(error);
        }
        let canned = self.responses.lock().pop_front();
        if let Some(response) = canned {
            return Ok(response);
        }
        Ok(self.compute_page(&request))
    }

    async fn mutate(&self, kind: MutationKind, payload: Row) -> Result<Row> {
        self.mutation_log.lock().push((kind, payload.clone()));
        let failure = self.mutation_failures.lock().pop_front();
        let gate = self.mutation_gates.lock().pop_front();

        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = failure {
            return Err(error);
        }
        self.apply_mutation(kind, payload)
    }
}

/// Ordering helper for asserting sorted output
pub fn is_sorted_by<T>(items: &[T], cmp: impl Fn(&T, &T) -> Ordering) -> bool {
    items.windows(2).all(|w| cmp(&w[0], &w[1]) != Ordering::Greater)
}
