//! Query state transitions and resolution versioning
//!
//! Every transition that actually changes the query bumps a monotonic
//! version. A resolution is tagged with the version it was issued under and
//! is only committed if no newer version has been issued since.

use jtable_core::{ColumnDescriptor, FilterValue, QueryState, SortDirection};
use serde::Serialize;

use crate::config::SortSpec;

/// Lifecycle of the table's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// The committed result matches the latest query
    #[default]
    Idle,
    /// A resolution for the latest query is in flight
    Resolving,
    /// The latest resolution failed; the previous rows are still shown
    Error,
}

/// Result of applying a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The query changed and was issued under this version
    Changed(u64),
    /// Nothing changed; no resolution is needed
    Unchanged,
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Owns the query state, its version counter and the table status
#[derive(Debug, Clone)]
pub struct QueryStateMachine {
    query: QueryState,
    version: u64,
    status: TableStatus,
    /// Total of the last committed result; `None` until the first commit
    known_total: Option<u64>,
}

impl QueryStateMachine {
    pub fn new(page_size: usize, default_sort: Option<&SortSpec>) -> Self {
        let mut query = QueryState::new(page_size);
        if let Some(sort) = default_sort.filter(|s| !s.direction.is_none()) {
            query.sort_field = Some(sort.field.clone());
            query.sort_direction = sort.direction;
        }
        Self {
            query,
            version: 0,
            status: TableStatus::Idle,
            known_total: None,
        }
    }

    pub fn query(&self) -> &QueryState {
        &self.query
    }

    /// Latest issued version
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> TableStatus {
        self.status
    }

    pub fn is_latest(&self, version: u64) -> bool {
        version == self.version
    }

    fn issue(&mut self) -> Transition {
        self.version += 1;
        self.status = TableStatus::Resolving;
        Transition::Changed(self.version)
    }

    /// Go to a page, clamped to `[1, last page]` of the last known total
    pub fn set_page(&mut self, page: usize) -> Transition {
        let page = match self.known_total {
            Some(total) => page.clamp(1, self.query.last_page(total)),
            None => page.max(1),
        };
        if page == self.query.page {
            return Transition::Unchanged;
        }
        self.query.page = page;
        self.issue()
    }

    pub fn next_page(&mut self) -> Transition {
        self.set_page(self.query.page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> Transition {
        self.set_page(self.query.page.saturating_sub(1))
    }

    pub fn first_page(&mut self) -> Transition {
        self.set_page(1)
    }

    /// Go to the last page of the last known total
    pub fn last_page(&mut self) -> Transition {
        let last = self.query.last_page(self.known_total.unwrap_or(0));
        self.set_page(last)
    }

    /// Change the page size (minimum 1) and return to the first page
    pub fn set_page_size(&mut self, page_size: usize) -> Transition {
        let page_size = page_size.max(1);
        if page_size == self.query.page_size {
            return Transition::Unchanged;
        }
        self.query.page_size = page_size;
        self.query.page = 1;
        self.issue()
    }

    /// Sort by a column; `SortDirection::None` clears the sort
    pub fn set_sort(
        &mut self,
        columns: &[ColumnDescriptor],
        key: &str,
        direction: SortDirection,
    ) -> Transition {
        match columns.iter().find(|c| c.key == key) {
            None => {
                tracing::warn!(column = %key, "Ignoring sort on unknown column");
                return Transition::Unchanged;
            }
            Some(column) if !column.sortable => {
                tracing::warn!(column = %key, "Ignoring sort on column that is not sortable");
                return Transition::Unchanged;
            }
            Some(_) => {}
        }

        let field = (!direction.is_none()).then(|| key.to_string());
        if field == self.query.sort_field && direction == self.query.sort_direction {
            return Transition::Unchanged;
        }
        self.query.sort_field = field;
        self.query.sort_direction = direction;
        self.issue()
    }

    /// Cycle a column's sort: ascending, descending, unsorted
    pub fn toggle_sort(&mut self, columns: &[ColumnDescriptor], key: &str) -> Transition {
        let current = if self.query.sort_field.as_deref() == Some(key) {
            self.query.sort_direction
        } else {
            SortDirection::None
        };
        self.set_sort(columns, key, current.cycle())
    }

    /// Set a column filter and return to the first page
    ///
    /// An empty filter value removes the column's filter.
    pub fn set_filter(
        &mut self,
        columns: &[ColumnDescriptor],
        key: &str,
        value: FilterValue,
    ) -> Transition {
        match columns.iter().find(|c| c.key == key) {
            None => {
                tracing::warn!(column = %key, "Ignoring filter on unknown column");
                return Transition::Unchanged;
            }
            Some(column) if !column.filterable => {
                tracing::warn!(column = %key, "Ignoring filter on column that is not filterable");
                return Transition::Unchanged;
            }
            Some(_) => {}
        }

        if value.is_empty() {
            return self.clear_filter(key);
        }
        if self.query.filters.get(key) == Some(&value) {
            return Transition::Unchanged;
        }
        self.query.filters.insert(key.to_string(), value);
        self.query.page = 1;
        self.issue()
    }

    pub fn clear_filter(&mut self, key: &str) -> Transition {
        if self.query.filters.remove(key).is_none() {
            return Transition::Unchanged;
        }
        self.query.page = 1;
        self.issue()
    }

    pub fn clear_filters(&mut self) -> Transition {
        if self.query.filters.is_empty() {
            return Transition::Unchanged;
        }
        self.query.filters.clear();
        self.query.page = 1;
        self.issue()
    }

    /// Set the free-text search and return to the first page
    pub fn set_search(&mut self, text: &str) -> Transition {
        if self.query.search_text == text {
            return Transition::Unchanged;
        }
        self.query.search_text = text.to_string();
        self.query.page = 1;
        self.issue()
    }

    /// Re-issue the current query; always produces a new version
    pub fn refresh(&mut self) -> Transition {
        self.issue()
    }

    /// Clamp the current page against a resolved total
    ///
    /// Returns the new page when it moved. Does not issue a new version.
    pub fn clamp_page(&mut self, total_count: u64) -> Option<usize> {
        let last = self.query.last_page(total_count);
        if self.query.page > last {
            self.query.page = last;
            Some(last)
        } else {
            None
        }
    }

    /// Commit a successful resolution if it is still the latest
    pub fn finish_ok(&mut self, version: u64, total_count: u64) -> bool {
        if !self.is_latest(version) {
            return false;
        }
        self.status = TableStatus::Idle;
        self.known_total = Some(total_count);
        true
    }

    /// Record a failed resolution if it is still the latest
    pub fn fail(&mut self, version: u64) -> bool {
        if !self.is_latest(version) {
            return false;
        }
        self.status = TableStatus::Error;
        true
    }
}
