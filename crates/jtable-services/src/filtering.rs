//! Column filters and free-text search
//!
//! Filters combine with AND: a row passes when every active filter's
//! predicate accepts the row's cell value. Search passes when any searchable
//! column contains the search text (case-insensitive) or its custom search
//! function accepts it.

use jtable_core::{ColumnDescriptor, FilterValue, QueryState, Row, Value, ValueKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::{FilterPredicate, MissingPredicatePolicy, TableConfig};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Built-in predicate for a column kind; `Other` has none
pub fn default_predicate(kind: ValueKind) -> Option<fn(&Value, &FilterValue) -> bool> {
    match kind {
        ValueKind::Text => Some(text_predicate),
        ValueKind::Number => Some(number_predicate),
        ValueKind::Date => Some(date_predicate),
        ValueKind::Enum => Some(enum_predicate),
        ValueKind::Boolean => Some(boolean_predicate),
        ValueKind::Other => None,
    }
}

fn fold(value: &Value) -> String {
    value.display_text().to_lowercase()
}

/// Case-insensitive substring, equality and membership; ranges compare text
pub fn text_predicate(value: &Value, filter: &FilterValue) -> bool {
    let text = fold(value);
    match filter {
        FilterValue::Text(needle) => text.contains(&needle.to_lowercase()),
        FilterValue::Equals(expected) => text == fold(expected),
        FilterValue::OneOf(options) => options.iter().any(|o| text == fold(o)),
        FilterValue::Range { min, max } => {
            if value.is_null() {
                return false;
            }
            min.as_ref().is_none_or(|m| text >= fold(m))
                && max.as_ref().is_none_or(|m| text <= fold(m))
        }
    }
}

/// Numeric range, equality and membership
///
/// A text filter that parses as a number means equality; anything else falls
/// back to a substring match on the rendered number.
pub fn number_predicate(value: &Value, filter: &FilterValue) -> bool {
    let Some(number) = value.as_f64() else {
        return false;
    };
    match filter {
        FilterValue::Text(text) => match text.trim().parse::<f64>() {
            Ok(expected) => number == expected,
            Err(_) => value.display_text().contains(text.trim()),
        },
        FilterValue::Equals(expected) => expected.as_f64() == Some(number),
        FilterValue::OneOf(options) => options.iter().any(|o| o.as_f64() == Some(number)),
        FilterValue::Range { min, max } => {
            // Bounds that are not numbers place no constraint
            min.as_ref().and_then(Value::as_f64).is_none_or(|m| number >= m)
                && max.as_ref().and_then(Value::as_f64).is_none_or(|m| number <= m)
        }
    }
}

/// Timestamp range and same-day equality
///
/// A date-only upper bound covers that whole day.
pub fn date_predicate(value: &Value, filter: &FilterValue) -> bool {
    let Some(millis) = value.as_timestamp_millis() else {
        return false;
    };
    match filter {
        FilterValue::Text(text) => {
            let expected = Value::from(text.as_str());
            if expected.as_date().is_some() {
                same_moment(value, millis, &expected)
            } else {
                value.display_text().contains(text.trim())
            }
        }
        FilterValue::Equals(expected) => same_moment(value, millis, expected),
        FilterValue::OneOf(options) => options.iter().any(|o| same_moment(value, millis, o)),
        FilterValue::Range { min, max } => {
            let above_min = min
                .as_ref()
                .and_then(Value::as_timestamp_millis)
                .is_none_or(|m| millis >= m);
            let below_max = max.as_ref().is_none_or(|m| match m.as_timestamp_millis() {
                Some(end) if m.is_date_only() => millis < end + DAY_MILLIS,
                Some(end) => millis <= end,
                None => true,
            });
            above_min && below_max
        }
    }
}

fn same_moment(value: &Value, millis: i64, expected: &Value) -> bool {
    if expected.is_date_only() || value.is_date_only() {
        value.as_date().is_some() && value.as_date() == expected.as_date()
    } else {
        expected.as_timestamp_millis() == Some(millis)
    }
}

/// Case-insensitive equality and membership
pub fn enum_predicate(value: &Value, filter: &FilterValue) -> bool {
    let text = fold(value);
    match filter {
        FilterValue::Text(expected) => text == expected.to_lowercase(),
        FilterValue::Equals(expected) => text == fold(expected),
        FilterValue::OneOf(options) => options.iter().any(|o| text == fold(o)),
        FilterValue::Range { .. } => text_predicate(value, filter),
    }
}

/// Boolean equality; ranges order `false` before `true`
pub fn boolean_predicate(value: &Value, filter: &FilterValue) -> bool {
    let Some(flag) = value.as_bool() else {
        return false;
    };
    match filter {
        FilterValue::Text(text) => Value::from(text.as_str()).as_bool() == Some(flag),
        FilterValue::Equals(expected) => expected.as_bool() == Some(flag),
        FilterValue::OneOf(options) => options.iter().any(|o| o.as_bool() == Some(flag)),
        FilterValue::Range { min, max } => {
            min.as_ref().and_then(Value::as_bool).is_none_or(|m| flag >= m)
                && max.as_ref().and_then(Value::as_bool).is_none_or(|m| flag <= m)
        }
    }
}

/// Evaluates filters and search over client-mode rows
#[derive(Clone, Default)]
pub struct FilterEvaluator {
    predicates: HashMap<String, FilterPredicate>,
    policy: MissingPredicatePolicy,
}

impl FilterEvaluator {
    pub fn new(predicates: HashMap<String, FilterPredicate>, policy: MissingPredicatePolicy) -> Self {
        Self { predicates, policy }
    }

    pub fn from_config(config: &TableConfig) -> Self {
        Self::new(config.filter_predicates.clone(), config.missing_predicate_policy)
    }

    pub fn policy(&self) -> MissingPredicatePolicy {
        self.policy
    }

    fn evaluate(&self, column: &ColumnDescriptor, value: &Value, filter: &FilterValue) -> bool {
        if let Some(predicate) = self.predicates.get(&column.key) {
            return predicate(value, filter);
        }
        match default_predicate(column.kind) {
            Some(predicate) => predicate(value, filter),
            None => match self.policy {
                MissingPredicatePolicy::FailOpen => true,
                MissingPredicatePolicy::FailClosed => false,
            },
        }
    }

    /// Whether a row passes every active filter
    ///
    /// Filters on columns that are unknown or not filterable are ignored.
    pub fn matches_filters(
        &self,
        row: &Row,
        filters: &BTreeMap<String, FilterValue>,
        columns: &[ColumnDescriptor],
    ) -> bool {
        filters
            .iter()
            .filter(|(_, filter)| !filter.is_empty())
            .all(|(key, filter)| {
                match columns.iter().find(|c| &c.key == key && c.filterable) {
                    Some(column) => self.evaluate(column, &column.value_of(row), filter),
                    None => true,
                }
            })
    }

    /// Whether a row matches the search text in any searchable column
    pub fn matches_search(&self, row: &Row, search_text: &str, columns: &[ColumnDescriptor]) -> bool {
        if search_text.is_empty() {
            return true;
        }
        let needle = search_text.to_lowercase();
        columns.iter().filter(|c| c.searchable).any(|column| {
            let value = column.value_of(row);
            match &column.search_fn {
                Some(search) => search(&value, search_text),
                None => value.display_text().to_lowercase().contains(&needle),
            }
        })
    }

    pub fn apply_filters<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a Row>,
        filters: &BTreeMap<String, FilterValue>,
        columns: &[ColumnDescriptor],
    ) -> Vec<&'a Row> {
        rows.into_iter()
            .filter(|row| self.matches_filters(row, filters, columns))
            .collect()
    }

    pub fn apply_search<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a Row>,
        search_text: &str,
        columns: &[ColumnDescriptor],
    ) -> Vec<&'a Row> {
        rows.into_iter()
            .filter(|row| self.matches_search(row, search_text, columns))
            .collect()
    }

    /// Rows that pass both the filters and the search of a query
    pub fn select<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a Row>,
        query: &QueryState,
        columns: &[ColumnDescriptor],
    ) -> Vec<&'a Row> {
        rows.into_iter()
            .filter(|row| {
                self.matches_filters(row, &query.filters, columns)
                    && self.matches_search(row, &query.search_text, columns)
            })
            .collect()
    }

    /// Number of rows a query would match across all pages
    pub fn count_matches(&self, rows: &[Row], query: &QueryState, columns: &[ColumnDescriptor]) -> usize {
        self.select(rows, query, columns).len()
    }
}

impl std::fmt::Debug for FilterEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterEvaluator")
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Wrap a plain function as a shareable predicate
pub fn predicate(f: impl Fn(&Value, &FilterValue) -> bool + Send + Sync + 'static) -> FilterPredicate {
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::number("id", "ID"),
            ColumnDescriptor::text("name", "Name").filterable().searchable(),
            ColumnDescriptor::number("age", "Age").filterable(),
            ColumnDescriptor::date("joined", "Joined").filterable(),
            ColumnDescriptor::enumeration("status", "Status", ["active", "inactive"]).filterable(),
            ColumnDescriptor::new("meta", "Meta", ValueKind::Other).filterable(),
        ]
    }

    fn rows() -> Vec<Row> {
        vec![
            Row::new()
                .with("id", 1)
                .with("name", "Alice")
                .with("age", 31)
                .with("joined", "2024-01-15")
                .with("status", "active")
                .with("meta", Value::Json(serde_json::json!({"tier": 1}))),
            Row::new()
                .with("id", 2)
                .with("name", "Bob")
                .with("age", 45)
                .with("joined", "2024-02-01T09:30:00")
                .with("status", "inactive")
                .with("meta", Value::Null),
            Row::new()
                .with("id", 3)
                .with("name", "Malin")
                .with("age", Value::Null)
                .with("joined", "2023-12-31")
                .with("status", "Active")
                .with("meta", Value::Null),
        ]
    }

    fn ids(rows: &[&Row]) -> Vec<i64> {
        rows.iter()
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .collect()
    }

    fn filters(entries: &[(&str, FilterValue)]) -> BTreeMap<String, FilterValue> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_text_filter_is_case_insensitive_substring() {
        let evaluator = FilterEvaluator::default();
        let rows = rows();
        let result = evaluator.apply_filters(&rows, &filters(&[("name", FilterValue::text("LI"))]), &columns());
        assert_eq!(ids(&result), vec![1, 3]);
    }

    #[test]
    fn test_number_filters() {
        assert!(number_predicate(&Value::Int64(31), &FilterValue::range(30, 40)));
        assert!(!number_predicate(&Value::Int64(45), &FilterValue::range(30, 40)));
        assert!(number_predicate(&Value::Int64(45), &FilterValue::range(Value::Null, 45)));
        assert!(number_predicate(&Value::from("7.5"), &FilterValue::text("7.5")));
        assert!(!number_predicate(&Value::Int64(1234), &FilterValue::text("23x")));
        assert!(number_predicate(&Value::Int64(12), &FilterValue::one_of([10, 12])));
        assert!(!number_predicate(&Value::Null, &FilterValue::range(0, 100)));
    }

    #[test]
    fn test_date_filters() {
        let jan = FilterValue::range("2024-01-01", "2024-01-31");
        assert!(date_predicate(&Value::from("2024-01-15"), &jan));
        assert!(date_predicate(&Value::from("2024-01-31T23:59:00"), &jan));
        assert!(!date_predicate(&Value::from("2024-02-01T00:00:00"), &jan));

        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        assert!(date_predicate(&Value::from("2024-02-01T09:30:00"), &FilterValue::equals(day)));
        assert!(date_predicate(&Value::from("2024-02-01T09:30:00"), &FilterValue::text("2024-02-01")));
        assert!(!date_predicate(&Value::from("not a date"), &FilterValue::equals(day)));
    }

    #[test]
    fn test_enum_and_boolean_filters() {
        let rows = rows();
        let evaluator = FilterEvaluator::default();
        let active = evaluator.apply_filters(
            &rows,
            &filters(&[("status", FilterValue::equals("active"))]),
            &columns(),
        );
        assert_eq!(ids(&active), vec![1, 3]);

        assert!(boolean_predicate(&Value::Bool(true), &FilterValue::text("yes")));
        assert!(!boolean_predicate(&Value::Bool(false), &FilterValue::equals(true)));
        assert!(boolean_predicate(&Value::from("f"), &FilterValue::one_of([false])));
    }

    #[test]
    fn test_filters_combine_with_and() {
        let rows = rows();
        let evaluator = FilterEvaluator::default();
        let both = evaluator.apply_filters(
            &rows,
            &filters(&[
                ("name", FilterValue::text("a")),
                ("age", FilterValue::range(40, Value::Null)),
            ]),
            &columns(),
        );
        assert!(both.is_empty());

        let one = evaluator.apply_filters(
            &rows,
            &filters(&[
                ("name", FilterValue::text("a")),
                ("age", FilterValue::range(30, Value::Null)),
            ]),
            &columns(),
        );
        assert_eq!(ids(&one), vec![1]);
    }

    #[test]
    fn test_missing_predicate_policy() {
        let rows = rows();
        let meta_filter = filters(&[("meta", FilterValue::text("tier"))]);

        let open = FilterEvaluator::default();
        assert_eq!(open.apply_filters(&rows, &meta_filter, &columns()).len(), 3);

        let closed = FilterEvaluator::new(HashMap::new(), MissingPredicatePolicy::FailClosed);
        assert!(closed.apply_filters(&rows, &meta_filter, &columns()).is_empty());

        let mut custom = HashMap::new();
        custom.insert(
            "meta".to_string(),
            predicate(|value, _| matches!(value, Value::Json(_))),
        );
        let custom = FilterEvaluator::new(custom, MissingPredicatePolicy::FailClosed);
        assert_eq!(ids(&custom.apply_filters(&rows, &meta_filter, &columns())), vec![1]);
    }

    #[test]
    fn test_empty_and_unknown_filters_are_ignored() {
        let rows = rows();
        let evaluator = FilterEvaluator::default();
        let result = evaluator.apply_filters(
            &rows,
            &filters(&[
                ("name", FilterValue::text("")),
                ("nope", FilterValue::text("x")),
                ("id", FilterValue::equals(1)),
            ]),
            &columns(),
        );
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_search() {
        let rows = rows();
        let evaluator = FilterEvaluator::default();
        assert_eq!(ids(&evaluator.apply_search(&rows, "BO", &columns())), vec![2]);
        assert_eq!(evaluator.apply_search(&rows, "", &columns()).len(), 3);
        // Age is not searchable
        assert!(evaluator.apply_search(&rows, "45", &columns()).is_empty());

        let mut cols = columns();
        cols.push(
            ColumnDescriptor::number("age_search", "Age")
                .with_accessor(|row| row.get("age").cloned().unwrap_or_default())
                .searchable()
                .with_search_fn(|value, text| value.as_f64() == text.parse::<f64>().ok()),
        );
        assert_eq!(ids(&evaluator.apply_search(&rows, "45", &cols)), vec![2]);
    }

    #[test]
    fn test_search_without_searchable_columns_matches_nothing() {
        let rows = rows();
        let cols = vec![ColumnDescriptor::text("name", "Name")];
        let evaluator = FilterEvaluator::default();
        assert!(evaluator.apply_search(&rows, "a", &cols).is_empty());
    }

    #[test]
    fn test_count_matches() {
        let rows = rows();
        let mut query = QueryState::default();
        query.filters.insert("status".into(), FilterValue::equals("active"));
        query.search_text = "mal".into();
        assert_eq!(FilterEvaluator::default().count_matches(&rows, &query, &columns()), 1);
    }
}
