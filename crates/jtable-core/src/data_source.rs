//! Data source trait for server-mode tables

use crate::{MutationKind, PageRequest, PageResponse, Result, Row};
use async_trait::async_trait;

/// An external source of rows that pages, sorts, filters and persists on
/// behalf of the controller.
///
/// The controller never retries or times out calls into a data source. A
/// future that never completes keeps the table loading indefinitely; wrap
/// the implementation (e.g. with `tokio::time::timeout`) if a deadline is
/// needed.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Name used in log output
    fn name(&self) -> &str {
        "data-source"
    }

    /// Fetch one page of rows for the serialized query.
    ///
    /// Implementations are responsible for filtering, sorting and paging;
    /// `total_count` must cover every matching row, not just this page.
    async fn fetch_page(&self, request: PageRequest) -> Result<PageResponse>;

    /// Persist a row mutation and return the stored row.
    ///
    /// For `Delete` the payload is the row being removed and the returned row
    /// is ignored beyond success/failure.
    async fn mutate(&self, kind: MutationKind, payload: Row) -> Result<Row>;
}
