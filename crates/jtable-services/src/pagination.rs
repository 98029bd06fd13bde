//! Pagination view of a table
//!
//! Derived from the committed query and result set; renderers use it to draw
//! page controls. Navigation itself goes through the controller.

use jtable_core::QueryState;
use serde::Serialize;

/// Page position and counts for the committed result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub current_page: usize,
    pub page_size: usize,
    /// Rows matching the query across all pages
    pub total_count: u64,
    /// Rows on the current page
    pub rows_on_page: usize,
}

impl Pagination {
    pub fn new(current_page: usize, page_size: usize, total_count: u64, rows_on_page: usize) -> Self {
        Self {
            current_page: current_page.max(1),
            page_size: page_size.max(1),
            total_count,
            rows_on_page,
        }
    }

    /// Number of pages; zero when there are no rows
    pub fn total_pages(&self) -> usize {
        QueryState::page_count(self.total_count, self.page_size)
    }

    /// Highest reachable page (at least 1)
    pub fn last_page(&self) -> usize {
        self.total_pages().max(1)
    }

    /// Row offset of the first row on the current page
    pub fn offset(&self) -> usize {
        (self.current_page - 1).saturating_mul(self.page_size)
    }

    pub fn can_go_next(&self) -> bool {
        self.current_page < self.total_pages()
    }

    pub fn can_go_prev(&self) -> bool {
        self.current_page > 1
    }

    /// Clamp a requested page into `[1, last_page]`
    pub fn clamp(&self, page: usize) -> usize {
        page.clamp(1, self.last_page())
    }

    /// Human-readable range, e.g. "Showing 11-20 of 95"
    pub fn status_text(&self) -> String {
        if self.total_count == 0 || self.rows_on_page == 0 {
            return "No records".to_string();
        }
        let first = self.offset() + 1;
        let last = self.offset() + self.rows_on_page;
        format!(
            "Showing {}-{} of {} (page {} of {})",
            first,
            last,
            self.total_count,
            self.current_page,
            self.total_pages()
        )
    }
}
