//! Customer lookup against the second database

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::db::DbResult;
use crate::models::LookupResult;

/// Point lookup of the canonical customer id for a source customer key
///
/// `Ok(None)` is a normal outcome: the row is skipped, not failed. When more
/// than one row matches, the first one returned wins.
#[async_trait]
pub trait CustomerLookup: Send + Sync {
    async fn lookup(&self, customer_key: &str) -> DbResult<Option<LookupResult>>;
}

/// [`CustomerLookup`] over the lookup PostgreSQL store
pub struct PgCustomerLookup {
    pool: PgPool,
    lookup_sql: String,
}

impl PgCustomerLookup {
    /// `lookup_sql` comes from [`crate::sql::lookup_query`]
    pub fn new(pool: PgPool, lookup_sql: impl Into<String>) -> Self {
        Self {
            pool,
            lookup_sql: lookup_sql.into(),
        }
    }
}

#[async_trait]
impl CustomerLookup for PgCustomerLookup {
    async fn lookup(&self, customer_key: &str) -> DbResult<Option<LookupResult>> {
        let row = sqlx::query(&self.lookup_sql)
            .bind(customer_key)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let result = LookupResult::new(row.try_get(0)?, row.try_get(1)?);
        Ok(result.canonical_id().is_some().then_some(result))
    }
}
