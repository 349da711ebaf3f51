//! Cross-reference substitution of routing code and account number
//!
//! When a row's routing code equals the trigger code and the cross-reference
//! table maps its account number, the pair becomes
//! `(replacement code, mapped account)`. Otherwise the pair is kept as is.
//! There is exactly one level of indirection.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::db::DbResult;
use crate::models::{non_blank, ResolvedRouting};

/// Cross-reference table keyed by external account number
#[async_trait]
pub trait XrefStore: Send + Sync {
    /// Mapped account number, if any
    async fn mapped_account(&self, account_no: &str) -> DbResult<Option<String>>;
}

/// [`XrefStore`] over the main PostgreSQL store
pub struct PgXrefStore {
    pool: PgPool,
    xref_sql: String,
}

impl PgXrefStore {
    /// `xref_sql` comes from [`crate::sql::xref_query`]
    pub fn new(pool: PgPool, xref_sql: impl Into<String>) -> Self {
        Self {
            pool,
            xref_sql: xref_sql.into(),
        }
    }
}

#[async_trait]
impl XrefStore for PgXrefStore {
    async fn mapped_account(&self, account_no: &str) -> DbResult<Option<String>> {
        let row = sqlx::query(&self.xref_sql)
            .bind(account_no)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(row.try_get(0)?),
            None => Ok(None),
        }
    }
}

pub struct XrefResolver {
    store: Box<dyn XrefStore>,
    trigger_code: String,
    replacement_code: String,
}

impl XrefResolver {
    pub fn new(
        store: Box<dyn XrefStore>,
        trigger_code: impl Into<String>,
        replacement_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            trigger_code: trigger_code.into(),
            replacement_code: replacement_code.into(),
        }
    }

    /// Only rows carrying the trigger code and an account number hit the store
    pub async fn resolve(
        &self,
        routing_code: Option<&str>,
        account_no: Option<&str>,
    ) -> DbResult<ResolvedRouting> {
        let (Some(code), Some(account)) = (routing_code, account_no) else {
            return Ok(ResolvedRouting::unchanged(routing_code, account_no));
        };

        if code != self.trigger_code {
            return Ok(ResolvedRouting::unchanged(routing_code, account_no));
        }

        match non_blank(self.store.mapped_account(account).await?) {
            Some(mapped) => {
                tracing::trace!(account, mapped = %mapped, "Cross-reference substitution");
                Ok(ResolvedRouting {
                    routing_code: Some(self.replacement_code.clone()),
                    account_no: Some(mapped),
                    substituted: true,
                })
            }
            None => Ok(ResolvedRouting::unchanged(routing_code, account_no)),
        }
    }
}
