//! # Pagination Module
//!
//! This module provides pagination for queries. It clamps page sizes, computes
//! offsets and, through [`Pagination::paginate`], returns a page of rows along
//! with the total count.

// ============================================================================
// External Crate Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Internal Crate Imports
// ============================================================================

use crate::{Error, query::Ql, row::Row};

// ============================================================================
// Pagination Structs
// ============================================================================

/// A page of results with metadata about the whole result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    /// The rows of the current page
    pub data: Vec<T>,
    /// The number of rows matching the query, ignoring pagination
    pub total: i64,
    /// The current page (1-based; 0 means the first page without offset)
    pub page: usize,
    /// Rows per page
    pub rows: usize,
    /// The number of pages available
    pub total_pages: i64,
}

/// Page settings.
///
/// `rows` is always within `1..=max_rows`. Page `0` and page `1` both address
/// the first page; later pages skip `(page - 1) * rows` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub rows: usize,
    pub max_rows: usize,
}

impl Pagination {
    pub fn new_with_limit(page: usize, rows: usize, max_rows: usize) -> Self {
        let max_rows = max_rows.max(1);
        Self { page, rows: rows.clamp(1, max_rows), max_rows }
    }

    /// Pagination with the default ceiling of 100 rows.
    pub fn new(page: usize, rows: usize) -> Self {
        Self::new_with_limit(page, rows, 100)
    }

    pub fn offset(&self) -> usize {
        if self.page == 0 { 0 } else { (self.page - 1) * self.rows }
    }

    /// `LIMIT n` or `LIMIT n OFFSET m`.
    pub fn to_sql(&self) -> String {
        match self.offset() {
            0 if self.page == 0 => format!("LIMIT {}", self.rows),
            offset => format!("LIMIT {} OFFSET {}", self.rows, offset),
        }
    }

    /// Runs a count of `query`, then fetches the requested page.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let page = Pagination::new(2, 20).paginate(db.from(&users, "A")).await?;
    /// println!("{} of {}", page.data.len(), page.total);
    /// ```
    pub async fn paginate(self, query: Ql) -> Result<Paginated<Row>, Error> {
        let total = query.clone().count().await?;
        let data = query.page(self.page).rows(self.rows).all().await?;

        let total_pages = (total as f64 / self.rows as f64).ceil() as i64;
        Ok(Paginated { data, total, page: self.page, rows: self.rows, total_pages })
    }
}
