//! Table controller
//!
//! The single writer of a table's query state and result set. Setters apply a
//! transition synchronously and return a [`Resolution`] future:
//!
//! - Client mode resolves before the setter returns; the future is already
//!   complete.
//! - Server mode publishes a loading state before the setter returns; the
//!   future performs the fetch and commits the page if its version is still
//!   the latest.
//!
//! Resolutions are lazy. In server mode the returned future must be awaited
//! or spawned; dropping it leaves the table in the loading state until the
//! next setter or [`refresh`](TableController::refresh).
//!
//! Internal state sits behind a `parking_lot::Mutex` that is never held
//! across an await, so several futures from one controller can be driven
//! concurrently.

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use jtable_core::{
    ColumnDescriptor, DataSource, FilterValue, MutationKind, QueryState, Row, RowKey, SortDirection,
    Value,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{MutationPolicy, TableConfig, TableMode};
use crate::error::{ConfigurationError, MutationError, ResolutionError, StaleResultDiscarded};
use crate::mutation::{MutationCoordinator, Undo, mutation_failure};
use crate::pagination::Pagination;
use crate::query_state::{QueryStateMachine, TableStatus, Transition};
use crate::resolution::{DataBacking, ResolutionEngine, ResolutionOutcome, ResolvedPage, ResultSet};

/// Follow-up fetches allowed when a server reports the requested page is
/// past the end
const MAX_PAGE_FOLLOW_UPS: usize = 2;

/// Pending resolution scheduled by a setter
///
/// Must be awaited or spawned for a server-mode fetch to run.
pub type Resolution<'a> = BoxFuture<'a, ResolutionOutcome>;

/// Callback invoked after every committed change
pub type Observer = Arc<dyn Fn(&TableSnapshot) + Send + Sync>;

/// Handle returned by [`TableController::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Everything a renderer needs to draw the table
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub query: QueryState,
    pub result: Arc<ResultSet>,
    pub status: TableStatus,
    /// Latest issued query version
    pub version: u64,
}

struct ControllerState {
    machine: QueryStateMachine,
    result: Arc<ResultSet>,
    /// Full row set; only used in client mode
    rows: Vec<Row>,
}

impl ControllerState {
    fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            query: self.machine.query().clone(),
            result: Arc::clone(&self.result),
            status: self.machine.status(),
            version: self.machine.version(),
        }
    }
}

/// Optimistic change to the cached page, reverted on drop unless confirmed
struct StagedChange<'a> {
    controller: &'a TableController,
    undo: Option<Undo>,
}

impl StagedChange<'_> {
    fn confirm(mut self) {
        self.undo = None;
    }
}

impl Drop for StagedChange<'_> {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            self.controller.rollback(undo);
        }
    }
}

enum Step {
    Done(ResolutionOutcome, Option<TableSnapshot>),
    Refetch(u64, QueryState),
}

/// Controller for one table
pub struct TableController {
    config: TableConfig,
    engine: ResolutionEngine,
    source: Option<Arc<dyn DataSource>>,
    mutations: MutationCoordinator,
    state: Mutex<ControllerState>,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_subscription: AtomicU64,
}

impl TableController {
    /// Validate the configuration and data, and build the controller
    ///
    /// A client-mode table is resolved immediately. A server-mode table starts
    /// empty until [`load`](Self::load) is awaited.
    pub fn new(config: TableConfig, backing: DataBacking) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let (rows, source) = match (config.mode, backing) {
            (TableMode::Client, DataBacking::Client(rows)) => {
                config.validate_rows(&rows)?;
                (rows, None)
            }
            (TableMode::Server, DataBacking::Server(source)) => (Vec::new(), Some(source)),
            (configured, DataBacking::Client(_)) => {
                return Err(ConfigurationError::ModeMismatch {
                    configured,
                    supplied: TableMode::Client,
                });
            }
            (configured, DataBacking::Server(_)) => {
                return Err(ConfigurationError::ModeMismatch {
                    configured,
                    supplied: TableMode::Server,
                });
            }
        };

        let engine = ResolutionEngine::new(&config);
        let mut machine = QueryStateMachine::new(config.page_size, config.default_sort.as_ref());
        let result = match &source {
            None => {
                let page = engine.resolve_client(&rows, machine.query());
                machine.finish_ok(machine.version(), page.total_count);
                ResultSet::resolved(page, machine.version())
            }
            Some(_) => ResultSet::default(),
        };

        tracing::info!(
            mode = ?config.mode,
            columns = config.columns.len(),
            rows = rows.len(),
            page_size = config.page_size,
            "Table controller created"
        );

        Ok(Self {
            mutations: MutationCoordinator::new(&config),
            engine,
            source,
            state: Mutex::new(ControllerState {
                machine,
                result: Arc::new(result),
                rows,
            }),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            config,
        })
    }

    pub fn mode(&self) -> TableMode {
        self.config.mode
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.config.columns
    }

    pub fn query(&self) -> QueryState {
        self.state.lock().machine.query().clone()
    }

    /// The committed result set
    pub fn result(&self) -> Arc<ResultSet> {
        Arc::clone(&self.state.lock().result)
    }

    pub fn status(&self) -> TableStatus {
        self.state.lock().machine.status()
    }

    /// Latest issued query version
    pub fn version(&self) -> u64 {
        self.state.lock().machine.version()
    }

    pub fn snapshot(&self) -> TableSnapshot {
        self.state.lock().snapshot()
    }

    pub fn pagination(&self) -> Pagination {
        let state = self.state.lock();
        let query = state.machine.query();
        Pagination::new(
            query.page,
            query.page_size,
            state.result.total_count,
            state.result.rows.len(),
        )
    }

    /// Whether a mutation on this row id is still in flight
    pub fn is_mutation_pending(&self, id: impl Into<Value>) -> bool {
        RowKey::from_value(&id.into()).is_some_and(|key| self.mutations.pending().is_pending(&key))
    }

    /// Register a callback for committed changes
    pub fn subscribe(&self, observer: impl Fn(&TableSnapshot) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn notify(&self, snapshot: &TableSnapshot) {
        let observers: Vec<Observer> = self
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(snapshot);
        }
    }

    pub fn set_page(&self, page: usize) -> Resolution<'_> {
        self.apply(|machine| machine.set_page(page))
    }

    pub fn next_page(&self) -> Resolution<'_> {
        self.apply(QueryStateMachine::next_page)
    }

    pub fn prev_page(&self) -> Resolution<'_> {
        self.apply(QueryStateMachine::prev_page)
    }

    pub fn first_page(&self) -> Resolution<'_> {
        self.apply(QueryStateMachine::first_page)
    }

    pub fn last_page(&self) -> Resolution<'_> {
        self.apply(QueryStateMachine::last_page)
    }

    pub fn set_page_size(&self, page_size: usize) -> Resolution<'_> {
        self.apply(|machine| machine.set_page_size(page_size))
    }

    pub fn set_sort(&self, column_key: &str, direction: SortDirection) -> Resolution<'_> {
        self.apply(|machine| machine.set_sort(&self.config.columns, column_key, direction))
    }

    /// Cycle a column through ascending, descending and unsorted
    pub fn toggle_sort(&self, column_key: &str) -> Resolution<'_> {
        self.apply(|machine| machine.toggle_sort(&self.config.columns, column_key))
    }

    pub fn set_filter(&self, column_key: &str, value: FilterValue) -> Resolution<'_> {
        self.apply(|machine| machine.set_filter(&self.config.columns, column_key, value))
    }

    pub fn clear_filter(&self, column_key: &str) -> Resolution<'_> {
        self.apply(|machine| machine.clear_filter(column_key))
    }

    pub fn clear_filters(&self) -> Resolution<'_> {
        self.apply(QueryStateMachine::clear_filters)
    }

    pub fn set_search(&self, text: &str) -> Resolution<'_> {
        self.apply(|machine| machine.set_search(text))
    }

    /// Re-resolve the current query
    pub fn refresh(&self) -> Resolution<'_> {
        self.apply(QueryStateMachine::refresh)
    }

    /// Re-issue the current query after a failed resolution
    pub fn retry(&self) -> Resolution<'_> {
        if self.status() != TableStatus::Error {
            tracing::debug!("Retry requested while not in error; refreshing");
        }
        self.refresh()
    }

    /// Fetch the first page of a server-mode table
    pub fn load(&self) -> Resolution<'_> {
        tracing::debug!(mode = ?self.config.mode, "Loading table");
        self.refresh()
    }

    fn apply(&self, transition: impl FnOnce(&mut QueryStateMachine) -> Transition) -> Resolution<'_> {
        let (transition, query) = {
            let mut state = self.state.lock();
            let transition = transition(&mut state.machine);
            (transition, state.machine.query().clone())
        };
        match transition {
            Transition::Unchanged => future::ready(ResolutionOutcome::Unchanged(self.result())).boxed(),
            Transition::Changed(version) => match &self.source {
                None => future::ready(self.resolve_local(version)).boxed(),
                Some(source) => {
                    self.publish_loading(version);
                    self.resolve_remote(Arc::clone(source), version, query).boxed()
                }
            },
        }
    }

    fn resolve_local(&self, version: u64) -> ResolutionOutcome {
        let (result, snapshot) = {
            let mut state = self.state.lock();
            let page = self.engine.resolve_client(&state.rows, state.machine.query());
            if let Some(clamped) = state.machine.clamp_page(page.total_count) {
                tracing::debug!(page = clamped, "Page clamped to filtered total");
            }
            state.machine.finish_ok(version, page.total_count);
            let result = Arc::new(ResultSet::resolved(page, version));
            state.result = Arc::clone(&result);
            (result, state.snapshot())
        };
        self.notify(&snapshot);
        ResolutionOutcome::Committed(result)
    }

    fn publish_loading(&self, version: u64) {
        let snapshot = {
            let mut state = self.state.lock();
            if !state.machine.is_latest(version) {
                return;
            }
            state.result = Arc::new(state.result.to_loading());
            state.snapshot()
        };
        self.notify(&snapshot);
    }

    async fn resolve_remote(
        &self,
        source: Arc<dyn DataSource>,
        mut version: u64,
        mut query: QueryState,
    ) -> ResolutionOutcome {
        let mut follow_ups = 0;
        loop {
            let fetched = self.engine.resolve_server(source.as_ref(), &query).await;
            match self.commit_remote(version, fetched, follow_ups < MAX_PAGE_FOLLOW_UPS) {
                Step::Done(outcome, snapshot) => {
                    if let Some(snapshot) = snapshot {
                        self.notify(&snapshot);
                    }
                    return outcome;
                }
                Step::Refetch(next_version, next_query) => {
                    follow_ups += 1;
                    version = next_version;
                    query = next_query;
                }
            }
        }
    }

    fn commit_remote(
        &self,
        version: u64,
        fetched: Result<ResolvedPage, ResolutionError>,
        may_refetch: bool,
    ) -> Step {
        let mut state = self.state.lock();
        let latest = state.machine.version();
        if !state.machine.is_latest(version) {
            tracing::warn!(version, latest, "Discarding stale resolution result");
            return Step::Done(
                ResolutionOutcome::Discarded(StaleResultDiscarded { version, latest }),
                None,
            );
        }

        match fetched {
            Ok(page) => {
                let clamped = if may_refetch {
                    state.machine.clamp_page(page.total_count)
                } else {
                    None
                };
                if let Some(clamped) = clamped {
                    state.machine.refresh();
                    tracing::debug!(
                        requested = page.page,
                        page = clamped,
                        total_count = page.total_count,
                        "Requested page is out of range; fetching the last page"
                    );
                    return Step::Refetch(state.machine.version(), state.machine.query().clone());
                }
                state.machine.finish_ok(version, page.total_count);
                let result = Arc::new(ResultSet::resolved(page, version));
                state.result = Arc::clone(&result);
                Step::Done(ResolutionOutcome::Committed(result), Some(state.snapshot()))
            }
            Err(error) => {
                tracing::warn!(version, error = %error, "Resolution failed; keeping previous rows");
                state.machine.fail(version);
                state.result = Arc::new(state.result.to_failed(error.clone()));
                Step::Done(ResolutionOutcome::Failed(error), Some(state.snapshot()))
            }
        }
    }

    /// Apply a change to the cached page and publish it
    fn patch_cached<T>(&self, change: impl FnOnce(&mut Vec<Row>, &mut u64) -> T) -> T {
        let (output, snapshot) = {
            let mut state = self.state.lock();
            let mut result = ResultSet::clone(&state.result);
            let output = change(&mut result.rows, &mut result.total_count);
            state.result = Arc::new(result);
            (output, state.snapshot())
        };
        self.notify(&snapshot);
        output
    }

    fn rollback(&self, undo: Undo) {
        tracing::warn!(?undo, "Rolling back optimistic change");
        let id_field = self.mutations.id_field();
        self.patch_cached(|rows, total_count| undo.revert(rows, total_count, id_field));
    }

    fn cached_row(&self, key: &RowKey) -> Option<Row> {
        let state = self.state.lock();
        self.mutations.find(&state.result.rows, key).cloned()
    }

    fn optimistic(&self) -> bool {
        self.config.mutation_policy == MutationPolicy::Optimistic
    }

    fn mutate_local(
        &self,
        change: impl FnOnce(&MutationCoordinator, &mut Vec<Row>) -> Result<Row, MutationError>,
    ) -> Result<Row, MutationError> {
        let stored = {
            let mut state = self.state.lock();
            change(&self.mutations, &mut state.rows)?
        };
        let transition = self.state.lock().machine.refresh();
        if let Transition::Changed(version) = transition {
            self.resolve_local(version);
        }
        Ok(stored)
    }

    /// Stage an optimistic change when the policy allows one
    fn stage(&self, change: impl FnOnce(&mut Vec<Row>, &mut u64) -> Option<Undo>) -> StagedChange<'_> {
        let undo = if self.optimistic() {
            self.patch_cached(change)
        } else {
            None
        };
        StagedChange { controller: self, undo }
    }

    /// Forward a mutation to the data source
    ///
    /// The staged change is rolled back if the data source fails or the
    /// future is dropped before it answers.
    async fn mutate_remote(
        &self,
        source: Arc<dyn DataSource>,
        kind: MutationKind,
        key: Option<&RowKey>,
        payload: Row,
        staged: StagedChange<'_>,
    ) -> Result<Row, MutationError> {
        match source.mutate(kind, payload).await {
            Ok(stored) => {
                staged.confirm();
                tracing::info!(kind = kind.label(), key = ?key, source = source.name(), "Mutation confirmed");
                Ok(stored)
            }
            Err(error) => {
                tracing::warn!(kind = kind.label(), key = ?key, error = %error, "Mutation failed");
                drop(staged);
                Err(mutation_failure(key, error))
            }
        }
    }

    /// Cached row for a server-mode update or delete
    fn row_on_page(&self, key: &RowKey) -> Result<Row, MutationError> {
        self.cached_row(key).ok_or_else(|| {
            tracing::debug!(%key, "Mutation target is not on the current page");
            MutationError::NotFound(key.clone())
        })
    }

    /// Add a row, returning the stored row
    #[tracing::instrument(skip(self, row), fields(mode = ?self.config.mode))]
    pub async fn add_row(&self, row: Row) -> Result<Row, MutationError> {
        let Some(source) = self.source.clone() else {
            return self.mutate_local(|coordinator, rows| coordinator.add_local(rows, row));
        };

        let key = self.mutations.validate_new_row(&row, false)?;
        let row = self.mutations.complete_row(row);
        let guard = key
            .clone()
            .map(|key| self.mutations.pending().acquire(key))
            .transpose()?;
        let staged = self.stage(|rows, total| Some(self.mutations.stage_add(rows, total, &row)));

        let stored = self
            .mutate_remote(source, MutationKind::Add, key.as_ref(), row, staged)
            .await?;
        drop(guard);
        self.refresh().await;
        Ok(stored)
    }

    /// Patch a row by id, returning the stored row
    #[tracing::instrument(skip(self, id, patch), fields(mode = ?self.config.mode))]
    pub async fn update_row(&self, id: impl Into<Value>, patch: Row) -> Result<Row, MutationError> {
        let id = id.into();
        let key = self.mutations.key_of(&id)?;
        let Some(source) = self.source.clone() else {
            return self.mutate_local(|coordinator, rows| coordinator.update_local(rows, &key, &patch));
        };

        self.mutations.validate_patch(&key, &patch)?;
        let guard = self.mutations.pending().acquire(key.clone())?;

        let mut payload = self.row_on_page(&key)?;
        payload.merge(&patch);
        let staged = self.stage(|rows, _| self.mutations.stage_update(rows, &key, &patch));

        let stored = self
            .mutate_remote(source, MutationKind::Update, Some(&key), payload, staged)
            .await?;
        drop(guard);
        self.refresh().await;
        Ok(stored)
    }

    /// Delete a row by id, returning the removed row
    #[tracing::instrument(skip(self, id), fields(mode = ?self.config.mode))]
    pub async fn delete_row(&self, id: impl Into<Value>) -> Result<Row, MutationError> {
        let id = id.into();
        let key = self.mutations.key_of(&id)?;
        let Some(source) = self.source.clone() else {
            return self.mutate_local(|coordinator, rows| coordinator.delete_local(rows, &key));
        };

        let guard = self.mutations.pending().acquire(key.clone())?;
        let removed = self.row_on_page(&key)?;
        let staged = self.stage(|rows, total| self.mutations.stage_delete(rows, total, &key));

        self.mutate_remote(source, MutationKind::Delete, Some(&key), removed.clone(), staged)
            .await?;
        drop(guard);
        self.refresh().await;
        Ok(removed)
    }
}

impl fmt::Debug for TableController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableController")
            .field("mode", &self.config.mode)
            .field("source", &self.source.as_ref().map(|s| s.name().to_string()))
            .field("version", &self.version())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::number("id", "ID").sortable(),
            ColumnDescriptor::text("name", "Name").sortable().filterable().searchable().editable(),
        ]
    }

    fn rows(count: i64) -> Vec<Row> {
        (1..=count)
            .map(|i| Row::new().with("id", i).with("name", format!("Row {}", i)))
            .collect()
    }

    fn client(count: i64) -> TableController {
        TableController::new(TableConfig::client(columns()), DataBacking::Client(rows(count))).unwrap()
    }

    #[test]
    fn test_client_table_resolves_on_construction() {
        let controller = client(25);
        let result = controller.result();
        assert_eq!(result.total_count, 25);
        assert_eq!(result.rows.len(), 10);
        assert!(!result.loading);
        assert_eq!(controller.status(), TableStatus::Idle);
        assert_eq!(controller.pagination().total_pages(), 3);
    }

    #[test]
    fn test_mode_mismatch() {
        let err = TableController::new(TableConfig::server(columns()), DataBacking::Client(rows(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::ModeMismatch {
                configured: TableMode::Server,
                supplied: TableMode::Client
            }
        ));
    }

    #[test]
    fn test_invalid_rows_rejected() {
        let mut data = rows(3);
        data.push(Row::new().with("id", 2).with("name", "Dup"));
        assert!(matches!(
            TableController::new(TableConfig::client(columns()), DataBacking::Client(data)),
            Err(ConfigurationError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn test_client_setters_commit_synchronously() {
        let controller = client(25);
        let resolution = controller.set_page(3);
        // Already committed before the future is awaited
        assert_eq!(controller.query().page, 3);
        assert_eq!(controller.result().rows.len(), 5);

        let outcome = resolution.await;
        assert!(outcome.is_committed());
        assert!(matches!(controller.set_page(3).await, ResolutionOutcome::Unchanged(_)));
    }

    #[tokio::test]
    async fn test_observers_see_commits() {
        let controller = client(25);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let id = controller.subscribe(move |snapshot| {
            assert_eq!(snapshot.status, TableStatus::Idle);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        controller.set_search("Row 1").await;
        controller.set_search("Row 1").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(controller.unsubscribe(id));
        controller.clear_filters().await;
        controller.set_search("").await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!controller.unsubscribe(id));
    }

    #[tokio::test]
    async fn test_client_mutations_reresolve() {
        let controller = client(3);
        let version = controller.version();

        controller
            .add_row(Row::new().with("id", 4).with("name", "Row 4"))
            .await
            .unwrap();
        assert_eq!(controller.result().total_count, 4);
        assert!(controller.version() > version);

        controller
            .update_row(4, Row::new().with("name", "Renamed"))
            .await
            .unwrap();
        assert!(controller
            .result()
            .rows
            .iter()
            .any(|r| r.get("name") == Some(&Value::from("Renamed"))));

        let removed = controller.delete_row(1).await.unwrap();
        assert_eq!(removed.get("name"), Some(&Value::from("Row 1")));
        assert_eq!(controller.result().total_count, 3);
        assert!(matches!(controller.delete_row(1).await, Err(MutationError::NotFound(_))));
    }
}
