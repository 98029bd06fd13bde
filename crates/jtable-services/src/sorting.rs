//! Type-aware row sorting
//!
//! Numbers compare numerically, dates by timestamp, and text case-folded with
//! the raw string as a tiebreak. NULL values (and values that cannot be read
//! as the column's type, including NaN) always sort last, whichever the
//! direction.

use std::cmp::Ordering;

use jtable_core::{ColumnDescriptor, Row, SortDirection, Value, ValueKind};
use unicase::UniCase;

/// Whether a value has no usable sort key for the kind
fn is_missing(kind: ValueKind, value: &Value) -> bool {
    match kind {
        _ if value.is_null() => true,
        ValueKind::Number => value.as_f64().is_none_or(f64::is_nan),
        ValueKind::Date => value.as_timestamp_millis().is_none(),
        ValueKind::Boolean => value.as_bool().is_none(),
        ValueKind::Text | ValueKind::Enum | ValueKind::Other => false,
    }
}

/// Compare two cell values of the given kind, ascending, missing values last
pub fn compare_values(kind: ValueKind, a: &Value, b: &Value) -> Ordering {
    match (is_missing(kind, a), is_missing(kind, b)) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_present_values(kind, a, b),
    }
}

fn compare_present_values(kind: ValueKind, a: &Value, b: &Value) -> Ordering {
    match kind {
        ValueKind::Number => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
        ValueKind::Date => a.as_timestamp_millis().cmp(&b.as_timestamp_millis()),
        ValueKind::Boolean => a.as_bool().cmp(&b.as_bool()),
        ValueKind::Text | ValueKind::Enum | ValueKind::Other => compare_text(a, b),
    }
}

fn compare_text(a: &Value, b: &Value) -> Ordering {
    let a = a.display_text();
    let b = b.display_text();
    UniCase::new(a.as_str())
        .cmp(&UniCase::new(b.as_str()))
        .then_with(|| a.cmp(&b))
}

/// Stable in-place sort of rows by one column
///
/// `SortDirection::None` leaves the order untouched.
pub fn sort_rows(rows: &mut [&Row], column: &ColumnDescriptor, direction: SortDirection) {
    if direction.is_none() {
        return;
    }
    // Computed columns are evaluated once per row rather than per comparison
    let mut keyed: Vec<(Value, &Row)> = rows.iter().map(|row| (column.value_of(row), *row)).collect();
    keyed.sort_by(|(a, _), (b, _)| {
        match (is_missing(column.kind, a), is_missing(column.kind, b)) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = compare_present_values(column.kind, a, b);
                match direction {
                    SortDirection::Descending => ordering.reverse(),
                    _ => ordering,
                }
            }
        }
    });
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
}
