//! Column descriptors

use crate::{Row, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Declared value type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    #[default]
    Text,
    Number,
    Date,
    Enum,
    Boolean,
    /// Opaque values (JSON, binary, ...) with no built-in filter predicate
    Other,
}

impl ValueKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Enum => "enum",
            Self::Boolean => "boolean",
            Self::Other => "other",
        }
    }
}

/// Computes a cell value from the whole row
pub type Accessor = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// Custom search match: `(cell value, search text) -> matched`
pub type SearchFn = Arc<dyn Fn(&Value, &str) -> bool + Send + Sync>;

/// Column-level constraint checked before a mutation is submitted
pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// A declared table column
///
/// The function-valued fields cannot be deserialized and are attached in code
/// with the `with_*` builders.
#[derive(Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Field key on the row
    pub key: String,
    /// Header text (falls back to the key)
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "type")]
    pub kind: ValueKind,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub editable: bool,
    /// Whether the value must be present on added/updated rows
    #[serde(default)]
    pub required: bool,
    /// Allowed values for enum columns
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(skip)]
    pub accessor: Option<Accessor>,
    #[serde(skip)]
    pub search_fn: Option<SearchFn>,
    #[serde(skip)]
    pub validator: Option<Validator>,
}

impl ColumnDescriptor {
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            kind,
            sortable: false,
            filterable: false,
            searchable: false,
            editable: false,
            required: false,
            options: None,
            accessor: None,
            search_fn: None,
            validator: None,
        }
    }

    pub fn text(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(key, label, ValueKind::Text)
    }

    pub fn number(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(key, label, ValueKind::Number)
    }

    pub fn date(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(key, label, ValueKind::Date)
    }

    pub fn enumeration<I, S>(key: impl Into<String>, label: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut column = Self::new(key, label, ValueKind::Enum);
        column.options = Some(options.into_iter().map(Into::into).collect());
        column
    }

    pub fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_accessor(mut self, accessor: impl Fn(&Row) -> Value + Send + Sync + 'static) -> Self {
        self.accessor = Some(Arc::new(accessor));
        self
    }

    pub fn with_search_fn(mut self, search: impl Fn(&Value, &str) -> bool + Send + Sync + 'static) -> Self {
        self.search_fn = Some(Arc::new(search));
        self
    }

    pub fn with_validator(
        mut self,
        validator: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Header text shown by renderers
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.key
        } else {
            &self.label
        }
    }

    /// Whether the value is computed rather than stored on the row
    pub fn is_computed(&self) -> bool {
        self.accessor.is_some()
    }

    /// Cell value of this column for a row (NULL when absent)
    pub fn value_of(&self, row: &Row) -> Value {
        match &self.accessor {
            Some(accessor) => accessor(row),
            None => row.get(&self.key).cloned().unwrap_or(Value::Null),
        }
    }

    /// Whether a non-null value is acceptable for this column's type
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self.kind {
            ValueKind::Number => value.as_f64().is_some(),
            ValueKind::Date => value.as_timestamp_millis().is_some(),
            ValueKind::Boolean => value.as_bool().is_some(),
            ValueKind::Enum => match &self.options {
                Some(options) => {
                    let text = value.display_text();
                    options.iter().any(|o| o == &text)
                }
                None => true,
            },
            ValueKind::Text | ValueKind::Other => true,
        }
    }
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("sortable", &self.sortable)
            .field("filterable", &self.filterable)
            .field("searchable", &self.searchable)
            .field("editable", &self.editable)
            .field("required", &self.required)
            .field("options", &self.options)
            .field("accessor", &self.accessor.is_some())
            .field("search_fn", &self.search_fn.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
