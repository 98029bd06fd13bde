//! Data resolution: turning a query into a page of rows
//!
//! Client mode filters, searches, sorts and slices in memory. Server mode
//! hands the query to a [`DataSource`] and trusts it to do all of that.

use jtable_core::{ColumnDescriptor, DataSource, PageRequest, QueryState, Row};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::config::TableConfig;
use crate::error::{ResolutionError, StaleResultDiscarded};
use crate::filtering::FilterEvaluator;
use crate::sorting::sort_rows;

/// Where a table's rows come from
pub enum DataBacking {
    /// The full row set, held in memory
    Client(Vec<Row>),
    /// A data source queried page by page
    Server(Arc<dyn DataSource>),
}

impl fmt::Debug for DataBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(rows) => f.debug_tuple("Client").field(&rows.len()).finish(),
            Self::Server(source) => f.debug_tuple("Server").field(&source.name()).finish(),
        }
    }
}

/// The visible page of a table
///
/// Replaced as a whole on every commit, never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    /// Rows matching the query across all pages
    pub total_count: u64,
    /// A resolution is in flight
    pub loading: bool,
    /// Why the latest resolution failed, if it did
    pub error: Option<ResolutionError>,
    /// Query version this result was resolved for
    pub version: u64,
}

impl ResultSet {
    pub fn resolved(page: ResolvedPage, version: u64) -> Self {
        Self {
            rows: page.rows,
            total_count: page.total_count,
            loading: false,
            error: None,
            version,
        }
    }

    /// Same rows, marked as loading
    pub fn to_loading(&self) -> Self {
        Self {
            loading: true,
            ..self.clone()
        }
    }

    /// Same rows, carrying a failure
    pub fn to_failed(&self, error: ResolutionError) -> Self {
        Self {
            loading: false,
            error: Some(error),
            ..self.clone()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// How a scheduled resolution ended
#[derive(Debug, Clone)]
pub enum ResolutionOutcome {
    /// A new result set was committed
    Committed(Arc<ResultSet>),
    /// Nothing changed so nothing was resolved
    Unchanged(Arc<ResultSet>),
    /// The latest resolution failed; previous rows are kept
    Failed(ResolutionError),
    /// A newer query was issued before this one completed
    Discarded(StaleResultDiscarded),
}

impl ResolutionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded(_))
    }

    /// The committed (or unchanged) result, if any
    pub fn result(&self) -> Option<&Arc<ResultSet>> {
        match self {
            Self::Committed(result) | Self::Unchanged(result) => Some(result),
            Self::Failed(_) | Self::Discarded(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ResolutionError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Rows of one page plus the page they were resolved for
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPage {
    pub rows: Vec<Row>,
    pub total_count: u64,
    /// Page actually shown (after clamping, in client mode)
    pub page: usize,
}

/// Computes pages from queries
pub struct ResolutionEngine {
    columns: Vec<ColumnDescriptor>,
    id_field: String,
    evaluator: FilterEvaluator,
}

impl ResolutionEngine {
    pub fn new(config: &TableConfig) -> Self {
        Self {
            columns: config.columns.clone(),
            id_field: config.id_field.clone(),
            evaluator: FilterEvaluator::from_config(config),
        }
    }

    pub fn evaluator(&self) -> &FilterEvaluator {
        &self.evaluator
    }

    /// Filter, search, sort and slice an in-memory row set
    ///
    /// The page is clamped to the filtered total before slicing. Resolving
    /// the same rows with the same query always yields the same page.
    pub fn resolve_client(&self, rows: &[Row], query: &QueryState) -> ResolvedPage {
        let mut selected = self.evaluator.select(rows, query, &self.columns);

        let sort_column = query
            .sort_field
            .as_deref()
            .filter(|_| query.is_sorted())
            .and_then(|key| self.columns.iter().find(|c| c.key == key));
        if let Some(column) = sort_column {
            sort_rows(&mut selected, column, query.sort_direction);
        }

        let total_count = selected.len() as u64;
        let page = query.page.clamp(1, query.last_page(total_count));
        let offset = (page - 1).saturating_mul(query.page_size);
        let rows = selected
            .into_iter()
            .skip(offset)
            .take(query.page_size)
            .cloned()
            .collect();

        ResolvedPage {
            rows,
            total_count,
            page,
        }
    }

    /// Fetch one page from a data source
    ///
    /// The response is checked for internal consistency but otherwise taken
    /// as-is: the data source owns filtering, sorting and paging.
    #[tracing::instrument(skip(self, source, query), fields(source = source.name(), page = query.page))]
    pub async fn resolve_server(
        &self,
        source: &dyn DataSource,
        query: &QueryState,
    ) -> Result<ResolvedPage, ResolutionError> {
        let request = PageRequest::from(query);
        tracing::debug!(
            page_size = request.page_size,
            sort_field = ?request.sort_field,
            filters = request.filters.len(),
            search = %request.search_text,
            "Fetching page"
        );

        let response = source.fetch_page(request).await.map_err(ResolutionError::fetch)?;

        if response.rows.len() > query.page_size {
            return Err(ResolutionError::InvalidResponse(format!(
                "{} rows returned for a page size of {}",
                response.rows.len(),
                query.page_size
            )));
        }
        if response.total_count < response.rows.len() as u64 {
            return Err(ResolutionError::InvalidResponse(format!(
                "total count {} is less than the {} rows returned",
                response.total_count,
                response.rows.len()
            )));
        }
        let mut seen = HashSet::with_capacity(response.rows.len());
        for key in response.rows.iter().filter_map(|row| row.key(&self.id_field)) {
            if !seen.insert(key.clone()) {
                return Err(ResolutionError::InvalidResponse(format!(
                    "duplicate row identifier {}",
                    key
                )));
            }
        }

        tracing::info!(
            rows = response.rows.len(),
            total_count = response.total_count,
            "Page fetched"
        );

        Ok(ResolvedPage {
            rows: response.rows,
            total_count: response.total_count,
            page: query.page,
        })
    }
}

impl fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionEngine")
            .field("columns", &self.columns.len())
            .field("id_field", &self.id_field)
            .field("evaluator", &self.evaluator)
            .finish()
    }
}
