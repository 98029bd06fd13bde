//! Core value and row types

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A cell value that can represent any column type
///
/// Serialized untagged so rows travel as plain JSON objects. Deserialization is
/// structural: dates and UUIDs arrive as strings and are coerced on demand by
/// [`Value::as_timestamp_millis`] and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// NULL / missing value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// UTF-8 string
    String(String),
    /// UUID
    Uuid(Uuid),
    /// Date (year, month, day)
    Date(NaiveDate),
    /// DateTime without timezone
    DateTime(NaiveDateTime),
    /// DateTime with timezone (UTC)
    DateTimeUtc(DateTime<Utc>),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// Arbitrary JSON (arrays, objects)
    Json(serde_json::Value),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::Float64(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Try to get as bool
    ///
    /// Strings use the same spellings the edit path accepts
    /// (`true/t/1/yes` and `false/f/0/no`).
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int64(0) => Some(false),
            Value::Int64(1) => Some(true),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Some(true),
                "false" | "f" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Calendar date of a date-like value
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::DateTime(dt) => Some(dt.date()),
            Value::DateTimeUtc(dt) => Some(dt.date_naive()),
            Value::String(s) => parse_datetime(s)
                .map(|dt| dt.date())
                .or_else(|| parse_date(s)),
            _ => None,
        }
    }

    /// Whether this value carries a date but no time of day
    pub fn is_date_only(&self) -> bool {
        match self {
            Value::Date(_) => true,
            Value::String(s) => parse_datetime(s).is_none() && parse_date(s).is_some(),
            _ => false,
        }
    }

    /// Milliseconds since the Unix epoch for date-like values
    ///
    /// Naive values are interpreted as UTC. Integers are taken to already be
    /// epoch milliseconds.
    pub fn as_timestamp_millis(&self) -> Option<i64> {
        match self {
            Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp_millis()),
            Value::DateTime(dt) => Some(dt.and_utc().timestamp_millis()),
            Value::DateTimeUtc(dt) => Some(dt.timestamp_millis()),
            Value::Int64(ms) => Some(*ms),
            Value::String(s) => parse_datetime(s)
                .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
                .map(|dt| dt.and_utc().timestamp_millis()),
            _ => None,
        }
    }

    /// Text used for searching and text filters; NULL renders as empty
    pub fn display_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v.to_rfc3339()),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int64(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Canonical identity of a row, derived from its identifier value
///
/// Numeric ids compare by value (`5` and `5.0` are the same row), everything
/// else by its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(String);

impl RowKey {
    /// Build a key from an id value; NULL has no identity
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(Self(s.clone())),
            other => match other.as_i64() {
                Some(i) => Some(Self(i.to_string())),
                None => Some(Self(other.to_string())),
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque record: ordered field name to value mapping
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: IndexMap<String, Value>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Get a value by field name
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, returning the previous value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    /// Remove a field, preserving the order of the others
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Field names in insertion order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Identity of this row under the given id field
    pub fn key(&self, id_field: &str) -> Option<RowKey> {
        self.get(id_field).and_then(RowKey::from_value)
    }

    /// Overlay every field of `patch` onto this row
    pub fn merge(&mut self, patch: &Row) {
        for (field, value) in &patch.fields {
            self.fields.insert(field.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_numeric_coercions() {
        assert_eq!(Value::Int64(7).as_f64(), Some(7.0));
        assert_eq!(Value::String(" 12.5 ".into()).as_f64(), Some(12.5));
        assert_eq!(Value::Decimal("3.10".into()).as_f64(), Some(3.1));
        assert_eq!(Value::Float64(4.0).as_i64(), Some(4));
        assert_eq!(Value::Float64(4.5).as_i64(), None);
        assert_eq!(Value::String("abc".into()).as_f64(), None);
    }

    #[test]
    fn test_bool_spellings() {
        assert_eq!(Value::from("Yes").as_bool(), Some(true));
        assert_eq!(Value::from("f").as_bool(), Some(false));
        assert_eq!(Value::Int64(1).as_bool(), Some(true));
        assert_eq!(Value::from("maybe").as_bool(), None);
    }

    #[test]
    fn test_timestamps_from_strings_and_dates() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let from_date = Value::Date(day).as_timestamp_millis().unwrap();
        let from_string = Value::from("2024-03-01").as_timestamp_millis().unwrap();
        assert_eq!(from_date, from_string);

        let later = Value::from("2024-03-01T10:30:00Z").as_timestamp_millis().unwrap();
        assert_eq!(later - from_date, (10 * 60 + 30) * 60 * 1000);

        assert!(Value::from("2024-03-01").is_date_only());
        assert!(!Value::from("2024-03-01 08:00:00").is_date_only());
        assert_eq!(Value::from("2024-03-01 08:00:00").as_date(), Some(day));
    }

    #[test]
    fn test_display_text_blanks_null() {
        assert_eq!(Value::Null.display_text(), "");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Float64(2.5).display_text(), "2.5");
    }

    #[test]
    fn test_row_key_normalizes_numbers() {
        assert_eq!(
            RowKey::from_value(&Value::Int64(5)),
            RowKey::from_value(&Value::Float64(5.0))
        );
        assert_eq!(RowKey::from_value(&Value::Null), None);
        assert_eq!(
            RowKey::from_value(&Value::from("abc")).map(|k| k.to_string()),
            Some("abc".to_string())
        );
    }

    #[test]
    fn test_row_merge_and_order() {
        let mut row = Row::new().with("id", 1).with("name", "Alice").with("age", 30);
        row.merge(&Row::new().with("age", 31).with("city", "Oslo"));

        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name", "age", "city"]);
        assert_eq!(row.get("age"), Some(&Value::Int64(31)));
        assert_eq!(row.key("id").map(|k| k.to_string()), Some("1".to_string()));
    }

    #[test]
    fn test_row_json_shape() {
        let row = Row::new().with("id", 1).with("name", "Alice").with("score", Value::Null);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"Alice","score":null}"#);

        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
