//! JTable Services - the tabular data controller
//!
//! This crate owns a table's query state (page, page size, sort, filters,
//! search), resolves it into the visible page of rows, and coordinates row
//! mutations. It performs no rendering; renderers subscribe to snapshots and
//! call the controller's setters.
//!
//! # Architecture
//!
//! ```text
//! Renderer (subscribe / setters)
//!     ↓
//! TableController ← This crate
//!     ├── QueryStateMachine   (transitions, versions, status)
//!     ├── ResolutionEngine    (client: filter/search/sort/slice; server: fetch)
//!     │       └── FilterEvaluator, sorting
//!     └── MutationCoordinator (validation, in-flight ids, rollback)
//!     ↓
//! DataSource (jtable-core, server mode only)
//! ```
//!
//! # Modes
//!
//! - **Client** - every row is held in memory and setters commit before they
//!   return.
//! - **Server** - the data source pages, sorts and filters; setters publish a
//!   loading state and return a future that commits the fetched page if no
//!   newer query was issued in the meantime.
//!
//! # Design Principles
//!
//! 1. **Single writer** - only the controller changes query state and results
//! 2. **Last issued wins** - superseded resolutions are discarded, never shown
//! 3. **Failures keep data** - a failed fetch keeps the previous rows visible
//! 4. **Typed errors** - configuration, resolution and mutation errors differ

mod config;
mod controller;
mod error;
mod filtering;
mod mutation;
mod pagination;
mod query_state;
mod resolution;
mod settings;
mod sorting;

pub use config::{FilterPredicate, MissingPredicatePolicy, MutationPolicy, SortSpec, TableConfig, TableMode};
pub use controller::{Observer, Resolution, SubscriptionId, TableController, TableSnapshot};
pub use error::{ConfigurationError, MutationError, ResolutionError, StaleResultDiscarded};
pub use filtering::{
    FilterEvaluator, boolean_predicate, date_predicate, default_predicate, enum_predicate,
    number_predicate, predicate, text_predicate,
};
pub use mutation::{MutationCoordinator, PendingGuard, PendingMutations, Undo};
pub use pagination::Pagination;
pub use query_state::{QueryStateMachine, TableStatus, Transition};
pub use resolution::{DataBacking, ResolutionEngine, ResolutionOutcome, ResolvedPage, ResultSet};
pub use settings::TableSettings;
pub use sorting::{compare_values, sort_rows};
