//! JTable Core - shared abstractions for the tabular data controller
//!
//! This crate provides the fundamental types that the controller and its
//! collaborators (renderers, data sources) agree on:
//!
//! - `Value` / `Row` - dynamically typed cells and opaque records
//! - `ColumnDescriptor` - declared columns with capability flags
//! - `QueryState` / `PageRequest` - view parameters and their wire form
//! - `DataSource` - trait for server-side paging and mutations
//! - `DataSourceError` - what data sources report on failure

mod column;
mod data_source;
mod error;
mod query;
mod types;

pub use column::*;
pub use data_source::*;
pub use error::*;
pub use query::*;
pub use types::*;
