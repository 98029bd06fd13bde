//! Row mutations: validation, in-flight tracking and rollback
//!
//! Client-mode mutations are applied straight to the in-memory row set.
//! Server-mode mutations may patch the cached page first and keep an [`Undo`]
//! record so the affected row alone can be reverted if the data source fails.

use jtable_core::{ColumnDescriptor, DataSourceError, Row, RowKey, Value};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::config::TableConfig;
use crate::error::MutationError;

/// Row ids with a mutation in flight
#[derive(Debug, Clone, Default)]
pub struct PendingMutations {
    ids: Arc<Mutex<HashSet<RowKey>>>,
}

impl PendingMutations {
    /// Claim a row id, failing fast if it is already claimed
    pub fn acquire(&self, key: RowKey) -> Result<PendingGuard, MutationError> {
        if !self.ids.lock().insert(key.clone()) {
            return Err(MutationError::Conflict(key));
        }
        Ok(PendingGuard {
            key,
            ids: Arc::clone(&self.ids),
        })
    }

    pub fn is_pending(&self, key: &RowKey) -> bool {
        self.ids.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }
}

/// Releases its row id when dropped, including when the mutation future is
/// dropped before completing
pub struct PendingGuard {
    key: RowKey,
    ids: Arc<Mutex<HashSet<RowKey>>>,
}

impl PendingGuard {
    pub fn key(&self) -> &RowKey {
        &self.key
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.ids.lock().remove(&self.key);
    }
}

impl fmt::Debug for PendingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingGuard").field("key", &self.key).finish()
    }
}

/// How to put a cached page back after a failed optimistic mutation
#[derive(Debug, Clone)]
pub enum Undo {
    /// Remove the provisional row that was appended
    Added { key: Option<RowKey>, row: Row },
    /// Restore the row as it was before the patch
    Updated { key: RowKey, previous: Row },
    /// Put the removed row back where it was
    Deleted { index: usize, row: Row },
}

impl Undo {
    /// Revert this change on a page, leaving every other row untouched
    pub fn revert(self, rows: &mut Vec<Row>, total_count: &mut u64, id_field: &str) {
        match self {
            Undo::Added { key, row } => {
                let position = match &key {
                    Some(key) => rows.iter().position(|r| r.key(id_field).as_ref() == Some(key)),
                    None => rows.iter().rposition(|r| r == &row),
                };
                if let Some(position) = position {
                    rows.remove(position);
                    *total_count = total_count.saturating_sub(1);
                }
            }
            Undo::Updated { key, previous } => {
                if let Some(slot) = rows.iter_mut().find(|r| r.key(id_field).as_ref() == Some(&key)) {
                    *slot = previous;
                }
            }
            Undo::Deleted { index, row } => {
                let key = row.key(id_field);
                if key.is_some() && rows.iter().any(|r| r.key(id_field) == key) {
                    return;
                }
                rows.insert(index.min(rows.len()), row);
                *total_count = total_count.saturating_add(1);
            }
        }
    }
}

/// Validates mutations and applies them to row sets
pub struct MutationCoordinator {
    columns: Vec<ColumnDescriptor>,
    id_field: String,
    pending: PendingMutations,
}

impl MutationCoordinator {
    pub fn new(config: &TableConfig) -> Self {
        Self {
            columns: config.columns.clone(),
            id_field: config.id_field.clone(),
            pending: PendingMutations::default(),
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    pub fn pending(&self) -> &PendingMutations {
        &self.pending
    }

    /// Identity of an id value; NULL is rejected
    pub fn key_of(&self, id: &Value) -> Result<RowKey, MutationError> {
        RowKey::from_value(id)
            .ok_or_else(|| MutationError::validation(format!("missing value for '{}'", self.id_field)))
    }

    fn check_value(&self, column: &ColumnDescriptor, value: &Value) -> Result<(), MutationError> {
        if column.required && is_blank(value) {
            return Err(MutationError::validation(format!(
                "'{}' is required",
                column.display_label()
            )));
        }
        if !column.accepts(value) {
            return Err(MutationError::validation(format!(
                "'{}' is not a valid {} value for '{}'",
                value.display_text(),
                column.kind.label(),
                column.display_label()
            )));
        }
        if let Some(validator) = &column.validator {
            validator(value).map_err(|message| {
                MutationError::validation(format!("{}: {}", column.display_label(), message))
            })?;
        }
        Ok(())
    }

    /// Validate a new row
    ///
    /// With `require_id` the row must carry its own identifier (client mode);
    /// otherwise the data source may assign one.
    pub fn validate_new_row(&self, row: &Row, require_id: bool) -> Result<Option<RowKey>, MutationError> {
        let key = row.key(&self.id_field);
        if require_id && key.is_none() {
            return Err(MutationError::validation(format!(
                "missing value for '{}'",
                self.id_field
            )));
        }
        for column in self.columns.iter().filter(|c| !c.is_computed()) {
            let value = row.get(&column.key).cloned().unwrap_or(Value::Null);
            self.check_value(column, &value)?;
        }
        Ok(key)
    }

    /// Give a validated new row every stored column, NULL where absent
    ///
    /// A missing identifier is left for the data source to assign.
    pub fn complete_row(&self, mut row: Row) -> Row {
        for column in self.columns.iter().filter(|c| !c.is_computed()) {
            if column.key != self.id_field && !row.contains(&column.key) {
                row.set(column.key.clone(), Value::Null);
            }
        }
        row
    }

    /// Validate a patch against the columns it touches
    ///
    /// The identifier may appear in the patch only with its current value.
    pub fn validate_patch(&self, key: &RowKey, patch: &Row) -> Result<(), MutationError> {
        if patch.is_empty() {
            return Err(MutationError::validation("patch has no fields"));
        }
        for (field, value) in patch.fields() {
            if field == self.id_field {
                if RowKey::from_value(value).as_ref() != Some(key) {
                    return Err(MutationError::validation(format!(
                        "'{}' cannot be changed",
                        self.id_field
                    )));
                }
                continue;
            }
            let column = self
                .columns
                .iter()
                .find(|c| c.key == field)
                .ok_or_else(|| MutationError::validation(format!("unknown column '{}'", field)))?;
            if column.is_computed() {
                return Err(MutationError::validation(format!(
                    "'{}' is computed and cannot be edited",
                    column.display_label()
                )));
            }
            if !column.editable {
                return Err(MutationError::validation(format!(
                    "'{}' is not editable",
                    column.display_label()
                )));
            }
            self.check_value(column, value)?;
        }
        Ok(())
    }

    fn position(&self, rows: &[Row], key: &RowKey) -> Option<usize> {
        rows.iter().position(|r| r.key(&self.id_field).as_ref() == Some(key))
    }

    /// Append a validated row to a client-mode row set
    pub fn add_local(&self, rows: &mut Vec<Row>, row: Row) -> Result<Row, MutationError> {
        let key = self
            .validate_new_row(&row, true)?
            .ok_or_else(|| MutationError::validation(format!("missing value for '{}'", self.id_field)))?;
        if self.position(rows, &key).is_some() {
            return Err(MutationError::validation(format!("duplicate identifier {}", key)));
        }
        let row = self.complete_row(row);
        rows.push(row.clone());
        Ok(row)
    }

    /// Patch a row of a client-mode row set, returning the stored row
    pub fn update_local(&self, rows: &mut [Row], key: &RowKey, patch: &Row) -> Result<Row, MutationError> {
        self.validate_patch(key, patch)?;
        let index = self
            .position(rows, key)
            .ok_or_else(|| MutationError::NotFound(key.clone()))?;
        rows[index].merge(patch);
        Ok(rows[index].clone())
    }

    /// Remove a row from a client-mode row set, returning it
    pub fn delete_local(&self, rows: &mut Vec<Row>, key: &RowKey) -> Result<Row, MutationError> {
        let index = self
            .position(rows, key)
            .ok_or_else(|| MutationError::NotFound(key.clone()))?;
        Ok(rows.remove(index))
    }

    /// Optimistically append a row to a cached page
    pub fn stage_add(&self, rows: &mut Vec<Row>, total_count: &mut u64, row: &Row) -> Undo {
        rows.push(row.clone());
        *total_count = total_count.saturating_add(1);
        Undo::Added {
            key: row.key(&self.id_field),
            row: row.clone(),
        }
    }

    /// Optimistically patch a cached row; `None` when the row is not on the page
    pub fn stage_update(&self, rows: &mut [Row], key: &RowKey, patch: &Row) -> Option<Undo> {
        let index = self.position(rows, key)?;
        let previous = rows[index].clone();
        rows[index].merge(patch);
        Some(Undo::Updated {
            key: key.clone(),
            previous,
        })
    }

    /// Optimistically remove a cached row; `None` when the row is not on the page
    pub fn stage_delete(&self, rows: &mut Vec<Row>, total_count: &mut u64, key: &RowKey) -> Option<Undo> {
        let index = self.position(rows, key)?;
        let row = rows.remove(index);
        *total_count = total_count.saturating_sub(1);
        Some(Undo::Deleted { index, row })
    }

    /// Cached copy of a row, if it is on the page
    pub fn find<'a>(&self, rows: &'a [Row], key: &RowKey) -> Option<&'a Row> {
        self.position(rows, key).map(|index| &rows[index])
    }
}

impl fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("columns", &self.columns.len())
            .field("id_field", &self.id_field)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Map a data source failure on a row to the mutation error callers see
pub(crate) fn mutation_failure(key: Option<&RowKey>, error: DataSourceError) -> MutationError {
    match (error, key) {
        (DataSourceError::NotFound(_), Some(key)) => MutationError::NotFound(key.clone()),
        (error, _) => MutationError::Transport(error),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jtable_core::ValueKind;
    use pretty_assertions::assert_eq;

    fn coordinator() -> MutationCoordinator {
        let config = TableConfig::client(vec![
            ColumnDescriptor::number("id", "ID"),
            ColumnDescriptor::text("name", "Name").editable().required(),
            ColumnDescriptor::number("age", "Age").editable().with_validator(|value| {
                match value.as_i64() {
                    Some(age) if age < 0 => Err("must not be negative".to_string()),
                    _ => Ok(()),
                }
            }),
            ColumnDescriptor::text("email", "Email"),
            ColumnDescriptor::new("label", "Label", ValueKind::Text)
                .editable()
                .with_accessor(|row| row.get("name").cloned().unwrap_or_default()),
        ]);
        MutationCoordinator::new(&config)
    }

    fn rows() -> Vec<Row> {
        (1..=3)
            .map(|i| {
                Row::new()
                    .with("id", i)
                    .with("name", format!("User {}", i))
                    .with("age", 20 + i)
                    .with("email", format!("u{}@x.io", i))
            })
            .collect()
    }

    fn key(id: i64) -> RowKey {
        RowKey::from_value(&Value::Int64(id)).unwrap()
    }

    #[test]
    fn test_pending_guard_releases_on_drop() {
        let pending = PendingMutations::default();
        let guard = pending.acquire(key(5)).unwrap();
        assert!(pending.is_pending(&key(5)));
        assert!(matches!(pending.acquire(key(5)), Err(MutationError::Conflict(_))));
        assert!(pending.acquire(key(6)).is_ok());
        drop(guard);
        assert!(!pending.is_pending(&key(5)));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_new_row_validation() {
        let coordinator = coordinator();
        let ok = Row::new().with("id", 9).with("name", "Nine").with("age", 30);
        assert_eq!(coordinator.validate_new_row(&ok, true).unwrap(), Some(key(9)));

        let no_name = Row::new().with("id", 9).with("name", " ");
        assert!(matches!(
            coordinator.validate_new_row(&no_name, true),
            Err(MutationError::Validation(_))
        ));

        let bad_age = Row::new().with("id", 9).with("name", "Nine").with("age", "old");
        assert!(matches!(
            coordinator.validate_new_row(&bad_age, true),
            Err(MutationError::Validation(_))
        ));

        let negative = Row::new().with("id", 9).with("name", "Nine").with("age", -1);
        let Err(MutationError::Validation(message)) = coordinator.validate_new_row(&negative, true) else {
            panic!("negative age should be rejected");
        };
        assert_eq!(message, "Age: must not be negative");

        let no_id = Row::new().with("name", "Server assigned");
        assert!(coordinator.validate_new_row(&no_id, true).is_err());
        assert_eq!(coordinator.validate_new_row(&no_id, false).unwrap(), None);
    }

    #[test]
    fn test_added_rows_carry_every_stored_column() {
        let coordinator = coordinator();
        let mut rows = rows();
        let added = coordinator
            .add_local(&mut rows, Row::new().with("id", 4).with("name", "Four"))
            .unwrap();
        assert_eq!(added.get("age"), Some(&Value::Null));
        assert_eq!(added.get("email"), Some(&Value::Null));
        assert!(!added.contains("label"));

        let server_row = coordinator.complete_row(Row::new().with("name", "Assigned later"));
        assert!(!server_row.contains("id"));
        assert_eq!(server_row.get("age"), Some(&Value::Null));
    }

    #[test]
    fn test_patch_validation() {
        let coordinator = coordinator();
        let k = key(1);
        assert!(coordinator.validate_patch(&k, &Row::new().with("age", 40)).is_ok());
        assert!(coordinator.validate_patch(&k, &Row::new().with("id", 1).with("age", 40)).is_ok());

        for patch in [
            Row::new(),
            Row::new().with("id", 2),
            Row::new().with("email", "new@x.io"),
            Row::new().with("label", "x"),
            Row::new().with("nope", 1),
            Row::new().with("name", Value::Null),
        ] {
            assert!(
                matches!(coordinator.validate_patch(&k, &patch), Err(MutationError::Validation(_))),
                "patch should be rejected: {:?}",
                patch
            );
        }
    }

    #[test]
    fn test_local_mutations() {
        let coordinator = coordinator();
        let mut rows = rows();

        let added = coordinator
            .add_local(&mut rows, Row::new().with("id", 4).with("name", "Four"))
            .unwrap();
        assert_eq!(added.get("name"), Some(&Value::from("Four")));
        assert_eq!(rows.len(), 4);

        assert!(matches!(
            coordinator.add_local(&mut rows, Row::new().with("id", 4).with("name", "Again")),
            Err(MutationError::Validation(_))
        ));

        let updated = coordinator
            .update_local(&mut rows, &key(2), &Row::new().with("age", 99))
            .unwrap();
        assert_eq!(updated.get("age"), Some(&Value::Int64(99)));
        assert_eq!(updated.get("name"), Some(&Value::from("User 2")));

        let removed = coordinator.delete_local(&mut rows, &key(1)).unwrap();
        assert_eq!(removed.key("id"), Some(key(1)));
        assert_eq!(rows.len(), 3);

        assert!(matches!(
            coordinator.delete_local(&mut rows, &key(1)),
            Err(MutationError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.update_local(&mut rows, &key(42), &Row::new().with("age", 1)),
            Err(MutationError::NotFound(_))
        ));
    }

    #[test]
    fn test_undo_reverts_only_its_row() {
        let coordinator = coordinator();
        let original = rows();
        let mut page = original.clone();
        let mut total = 30;

        let update = coordinator
            .stage_update(&mut page, &key(2), &Row::new().with("age", 50))
            .unwrap();
        let delete = coordinator.stage_delete(&mut page, &mut total, &key(1)).unwrap();
        let add = coordinator.stage_add(&mut page, &mut total, &Row::new().with("name", "New"));
        assert_eq!(page.len(), 3);
        assert_eq!(total, 30);

        // A concurrent, successful edit of row 3 must survive the rollbacks
        page[1].set("age", 77);

        update.revert(&mut page, &mut total, "id");
        delete.revert(&mut page, &mut total, "id");
        add.revert(&mut page, &mut total, "id");

        assert_eq!(total, 30);
        assert_eq!(page[0], original[0]);
        assert_eq!(page[1], original[1]);
        assert_eq!(page[2].get("age"), Some(&Value::Int64(77)));
    }

    #[test]
    fn test_stage_missing_rows() {
        let coordinator = coordinator();
        let mut page = rows();
        let mut total = 3;
        assert!(coordinator.stage_update(&mut page, &key(9), &Row::new().with("age", 1)).is_none());
        assert!(coordinator.stage_delete(&mut page, &mut total, &key(9)).is_none());
        assert_eq!(total, 3);
    }

    #[test]
    fn test_mutation_failure_mapping() {
        assert!(matches!(
            mutation_failure(Some(&key(1)), DataSourceError::NotFound("gone".into())),
            MutationError::NotFound(_)
        ));
        assert!(matches!(
            mutation_failure(Some(&key(1)), DataSourceError::Rejected("no".into())),
            MutationError::Transport(_)
        ));
    }
}
