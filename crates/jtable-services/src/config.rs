//! Validated table configuration

use jtable_core::{ColumnDescriptor, FilterValue, Row, SortDirection, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::filtering::default_predicate;

/// Per-column filter predicate: `(cell value, filter value) -> passes`
pub type FilterPredicate = Arc<dyn Fn(&Value, &FilterValue) -> bool + Send + Sync>;

/// Where rows are resolved; fixed for the lifetime of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TableMode {
    /// All rows are held in memory and resolved locally
    #[default]
    Client,
    /// Paging, sorting and filtering are delegated to a data source
    Server,
}

/// What to do with a filter on a column that has no usable predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingPredicatePolicy {
    /// Skip the filter; every row passes it
    #[default]
    FailOpen,
    /// No row passes the filter
    FailClosed,
}

/// How server-mode mutations touch the cached rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MutationPolicy {
    /// Patch the cached rows immediately and roll back on failure
    #[default]
    Optimistic,
    /// Leave the cached rows alone until the data source confirms
    Pessimistic,
}

/// Initial sort applied when the table is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

fn default_page_size() -> usize {
    10
}

fn default_id_field() -> String {
    "id".to_string()
}

/// Declarative table configuration, validated by `TableController::new`
#[derive(Clone, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub mode: TableMode,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Columns in display order
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub default_sort: Option<SortSpec>,
    /// Predicates overriding the built-in ones, keyed by column
    #[serde(skip)]
    pub filter_predicates: HashMap<String, FilterPredicate>,
    #[serde(default)]
    pub missing_predicate_policy: MissingPredicatePolicy,
    #[serde(default)]
    pub mutation_policy: MutationPolicy,
}

impl TableConfig {
    pub fn new(mode: TableMode, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            mode,
            page_size: default_page_size(),
            columns,
            id_field: default_id_field(),
            default_sort: None,
            filter_predicates: HashMap::new(),
            missing_predicate_policy: MissingPredicatePolicy::default(),
            mutation_policy: MutationPolicy::default(),
        }
    }

    pub fn client(columns: Vec<ColumnDescriptor>) -> Self {
        Self::new(TableMode::Client, columns)
    }

    pub fn server(columns: Vec<ColumnDescriptor>) -> Self {
        Self::new(TableMode::Server, columns)
    }

    /// Parse a configuration from JSON; predicates are attached afterwards
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_default_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.default_sort = Some(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn with_filter_predicate(
        mut self,
        column: impl Into<String>,
        predicate: impl Fn(&Value, &FilterValue) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter_predicates.insert(column.into(), Arc::new(predicate));
        self
    }

    pub fn with_missing_predicate_policy(mut self, policy: MissingPredicatePolicy) -> Self {
        self.missing_predicate_policy = policy;
        self
    }

    pub fn with_mutation_policy(mut self, policy: MutationPolicy) -> Self {
        self.mutation_policy = policy;
        self
    }

    pub fn column(&self, key: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Check the configuration itself; rows are checked separately
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.columns.is_empty() {
            return Err(ConfigurationError::NoColumns);
        }
        if self.page_size == 0 {
            return Err(ConfigurationError::InvalidPageSize(self.page_size));
        }
        if self.id_field.trim().is_empty() {
            return Err(ConfigurationError::EmptyIdField);
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if column.key.trim().is_empty() {
                return Err(ConfigurationError::EmptyColumnKey);
            }
            if !seen.insert(column.key.as_str()) {
                return Err(ConfigurationError::DuplicateColumn(column.key.clone()));
            }
        }

        if let Some(sort) = &self.default_sort {
            let column = self.column(&sort.field).ok_or_else(|| ConfigurationError::UnknownColumn {
                key: sort.field.clone(),
                context: "default sort",
            })?;
            if !column.sortable {
                return Err(ConfigurationError::NotSortable(sort.field.clone()));
            }
        }

        for key in self.filter_predicates.keys() {
            if self.column(key).is_none() {
                return Err(ConfigurationError::UnknownColumn {
                    key: key.clone(),
                    context: "filter predicate",
                });
            }
        }

        for column in self.columns.iter().filter(|c| c.filterable) {
            if !self.filter_predicates.contains_key(&column.key)
                && default_predicate(column.kind).is_none()
            {
                tracing::warn!(
                    column = %column.key,
                    kind = column.kind.label(),
                    policy = ?self.missing_predicate_policy,
                    "Filterable column has no predicate; filters on it will not be evaluated"
                );
            }
        }

        if !self.columns.iter().any(|c| c.searchable) {
            tracing::debug!("No searchable columns configured; search text will match nothing");
        }

        Ok(())
    }

    /// Check client-mode rows: identifiers present and unique, and every
    /// stored column present on every row.
    pub fn validate_rows(&self, rows: &[Row]) -> Result<(), ConfigurationError> {
        let mut ids = HashSet::with_capacity(rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let key = row.key(&self.id_field).ok_or_else(|| ConfigurationError::MissingId {
                row_index,
                id_field: self.id_field.clone(),
            })?;
            if !ids.insert(key.clone()) {
                return Err(ConfigurationError::DuplicateId(key));
            }
            if let Some(column) = self
                .columns
                .iter()
                .find(|c| !c.is_computed() && !row.contains(&c.key))
            {
                return Err(ConfigurationError::MissingField {
                    row_index,
                    field: column.key.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for TableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut predicates: Vec<&String> = self.filter_predicates.keys().collect();
        predicates.sort();
        f.debug_struct("TableConfig")
            .field("mode", &self.mode)
            .field("page_size", &self.page_size)
            .field("columns", &self.columns)
            .field("id_field", &self.id_field)
            .field("default_sort", &self.default_sort)
            .field("filter_predicates", &predicates)
            .field("missing_predicate_policy", &self.missing_predicate_policy)
            .field("mutation_policy", &self.mutation_policy)
            .finish()
    }
}
