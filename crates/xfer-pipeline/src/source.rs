//! Paginated source reading
//!
//! Rows are ranked with `ROW_NUMBER()` over the composite key
//! (customer key, routing code, account number) and fetched one window at a
//! time. The key must be unique across the source table: with ties the
//! ranking is not stable between page queries and rows can be read twice or
//! not at all.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

use crate::db::DbResult;
use crate::models::SourceRow;

/// Half-open rank window `(lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    lower: i64,
    upper: i64,
}

impl PageWindow {
    /// `(0, page_size]`
    pub fn first(page_size: u32) -> Self {
        Self {
            lower: 0,
            upper: i64::from(page_size),
        }
    }

    /// The window directly after this one, of the same size
    pub fn next(self) -> Self {
        let size = self.size();
        Self {
            lower: self.upper,
            upper: self.upper.saturating_add(size),
        }
    }

    pub fn lower(&self) -> i64 {
        self.lower
    }

    pub fn upper(&self) -> i64 {
        self.upper
    }

    pub fn size(&self) -> i64 {
        self.upper - self.lower
    }

    /// A short page means the source is exhausted
    pub fn is_last(&self, rows_returned: usize) -> bool {
        i64::try_from(rows_returned).map_or(false, |n| n < self.size())
    }

    /// Whether a 1-based rank falls inside this window
    pub fn contains(&self, rank: i64) -> bool {
        rank > self.lower && rank <= self.upper
    }
}

impl fmt::Display for PageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.lower, self.upper)
    }
}

/// Reads one ranked window of source rows
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Rows whose rank falls in `window`, in rank order
    async fn fetch_page(&self, window: PageWindow) -> DbResult<Vec<SourceRow>>;
}

/// [`SourceReader`] over the main PostgreSQL store
pub struct PgSourceReader {
    pool: PgPool,
    page_sql: String,
}

impl PgSourceReader {
    /// `page_sql` comes from [`crate::sql::page_query`]
    pub fn new(pool: PgPool, page_sql: impl Into<String>) -> Self {
        Self {
            pool,
            page_sql: page_sql.into(),
        }
    }
}

#[async_trait]
impl SourceReader for PgSourceReader {
    async fn fetch_page(&self, window: PageWindow) -> DbResult<Vec<SourceRow>> {
        let rows = sqlx::query(&self.page_sql)
            .bind(window.lower())
            .bind(window.upper())
            .fetch_all(&self.pool)
            .await?;

        let mut page = Vec::with_capacity(rows.len());
        for row in rows {
            page.push(SourceRow {
                customer_key: row.try_get(0)?,
                routing_code: row.try_get(1)?,
                account_no: row.try_get(2)?,
                discriminator: row.try_get(3)?,
                maint_date: row.try_get(4)?,
                note: row.try_get(5)?,
            });
        }

        tracing::debug!(window = %window, rows = page.len(), "Fetched source page");
        Ok(page)
    }
}
