//! Error types reported by data sources

use thiserror::Error;

/// Failure reported by a server-mode data source
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for data source operations
pub type Result<T> = std::result::Result<T, DataSourceError>;
