//! Query state and the request/response shapes exchanged with data sources

use crate::{Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sort direction for the active sort column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
    #[default]
    None,
}

impl SortDirection {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
            Self::None => "",
        }
    }

    /// Next direction when a header is clicked repeatedly
    pub fn cycle(&self) -> Self {
        match self {
            Self::None => Self::Ascending,
            Self::Ascending => Self::Descending,
            Self::Descending => Self::None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// A typed per-column filter input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    /// Substring match (text) or parsed equality (numbers, booleans)
    Text(String),
    /// Inclusive range; either bound may be open
    Range {
        min: Option<Value>,
        max: Option<Value>,
    },
    Equals(Value),
    OneOf(Vec<Value>),
}

impl FilterValue {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn range(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        let min = min.into();
        let max = max.into();
        Self::Range {
            min: (!min.is_null()).then_some(min),
            max: (!max.is_null()).then_some(max),
        }
    }

    pub fn equals(value: impl Into<Value>) -> Self {
        Self::Equals(value.into())
    }

    pub fn one_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// An empty filter value places no constraint on the column
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Range { min, max } => {
                min.as_ref().is_none_or(is_blank) && max.as_ref().is_none_or(is_blank)
            }
            Self::Equals(value) => is_blank(value),
            Self::OneOf(values) => values.is_empty(),
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Current view parameters of a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryState {
    /// Current page (1-indexed)
    pub page: usize,
    pub page_size: usize,
    pub sort_field: Option<String>,
    pub sort_direction: SortDirection,
    /// Active filters keyed by column
    pub filters: BTreeMap<String, FilterValue>,
    pub search_text: String,
}

impl QueryState {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            sort_field: None,
            sort_direction: SortDirection::None,
            filters: BTreeMap::new(),
            search_text: String::new(),
        }
    }

    /// Number of pages needed for `total_count` rows; zero rows need zero pages
    pub fn page_count(total_count: u64, page_size: usize) -> usize {
        let page_size = page_size.max(1) as u64;
        // Use saturating_add to prevent overflow when total is very large
        let pages = total_count.saturating_add(page_size - 1) / page_size;
        pages.min(usize::MAX as u64) as usize
    }

    /// Highest valid page for `total_count` rows (at least 1)
    pub fn last_page(&self, total_count: u64) -> usize {
        Self::page_count(total_count, self.page_size).max(1)
    }

    /// Row offset of the first row on the current page
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.page_size)
    }

    /// Whether a sort column and a direction are both set
    pub fn is_sorted(&self) -> bool {
        self.sort_field.is_some() && !self.sort_direction.is_none()
    }

    /// Filters that actually constrain rows
    pub fn active_filters(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.filters
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn has_search(&self) -> bool {
        !self.search_text.is_empty()
    }
}

impl Default for QueryState {
    fn default() -> Self {
        Self::new(10)
    }
}

/// Serialized query sent to a server-mode data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
    pub sort_field: Option<String>,
    pub sort_direction: SortDirection,
    pub filters: BTreeMap<String, FilterValue>,
    pub search_text: String,
}

impl PageRequest {
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1).saturating_mul(self.page_size)
    }
}

impl From<&QueryState> for PageRequest {
    fn from(query: &QueryState) -> Self {
        let sorted = query.is_sorted();
        Self {
            page: query.page,
            page_size: query.page_size,
            sort_field: if sorted { query.sort_field.clone() } else { None },
            sort_direction: if sorted {
                query.sort_direction
            } else {
                SortDirection::None
            },
            filters: query
                .active_filters()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
            search_text: query.search_text.clone(),
        }
    }
}

/// One page of rows returned by a data source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub rows: Vec<Row>,
    /// Rows matching the query across all pages
    pub total_count: u64,
}

/// Kind of row mutation forwarded to a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Add,
    Update,
    Delete,
}

impl MutationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}
