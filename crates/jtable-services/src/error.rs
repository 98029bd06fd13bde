//! Controller error taxonomy

use jtable_core::{DataSourceError, RowKey};
use std::sync::Arc;
use thiserror::Error;

use crate::config::TableMode;

/// Invalid table setup, detected when the controller is constructed
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Table has no columns")]
    NoColumns,

    #[error("Column key must not be empty")]
    EmptyColumnKey,

    #[error("Duplicate column key: {0}")]
    DuplicateColumn(String),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("Identifier field must not be empty")]
    EmptyIdField,

    #[error("Unknown column '{key}' referenced by {context}")]
    UnknownColumn { key: String, context: &'static str },

    #[error("Default sort column '{0}' is not sortable")]
    NotSortable(String),

    #[error("Table configured for {configured:?} mode but given {supplied:?} data")]
    ModeMismatch {
        configured: TableMode,
        supplied: TableMode,
    },

    #[error("Row {row_index} has no value for column '{field}' and the column has no accessor")]
    MissingField { row_index: usize, field: String },

    #[error("Row {row_index} has no identifier in field '{id_field}'")]
    MissingId { row_index: usize, id_field: String },

    #[error("Duplicate row identifier: {0}")]
    DuplicateId(RowKey),

    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A server-mode resolution failed; the table keeps its previous rows
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("Failed to load rows: {0}")]
    Fetch(#[source] Arc<DataSourceError>),

    #[error("Data source returned an invalid page: {0}")]
    InvalidResponse(String),
}

impl ResolutionError {
    pub fn fetch(error: DataSourceError) -> Self {
        Self::Fetch(Arc::new(error))
    }
}

/// A row mutation was refused or failed; the table itself stays usable
#[derive(Debug, Error)]
pub enum MutationError {
    /// The row failed column-level constraints and was never submitted
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Another mutation on the same row is still in flight
    #[error("Row {0} already has a mutation in flight")]
    Conflict(RowKey),

    /// The data source call failed; optimistic changes were rolled back
    #[error("Mutation request failed: {0}")]
    Transport(#[source] DataSourceError),

    #[error("Row {0} not found")]
    NotFound(RowKey),
}

impl MutationError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// A resolution finished after a newer one was issued and was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Resolution {version} superseded by {latest}")]
pub struct StaleResultDiscarded {
    pub version: u64,
    pub latest: u64,
}
