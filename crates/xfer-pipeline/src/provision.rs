//! Test-table provisioning
//!
//! Clones live tables in the main store into suffixed copies (structure plus a
//! bounded number of rows) so a run can be rehearsed without touching live
//! data. The result is a [`TableSubstitution`] that rewrites a configuration
//! to point at the copies.

use std::collections::BTreeMap;

use sqlx::PgPool;
use tracing::info;
use xfer_common::names::{strip_suffix, validate_identifier, validate_suffix, with_suffix};
use xfer_common::XferError;

use crate::config::{ProvisioningConfig, TransferConfig};
use crate::db::DbError;
use crate::error::{TransferError, TransferResult};

/// Live table name → test table name
///
/// Matching is case-insensitive and ignores an already-present suffix, so
/// applying a substitution twice gives the same configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSubstitution {
    suffix: String,
    tables: BTreeMap<String, String>,
}

impl TableSubstitution {
    pub fn new<I, S>(suffix: &str, live_tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tables = live_tables
            .into_iter()
            .map(|t| {
                let base = strip_suffix(t.as_ref(), suffix);
                (base.to_ascii_lowercase(), with_suffix(base, suffix))
            })
            .collect();

        Self {
            suffix: suffix.to_string(),
            tables,
        }
    }

    /// Test table name for `table`, or `table` unchanged if it was not provisioned
    pub fn substitute(&self, table: &str) -> String {
        let base = strip_suffix(table, &self.suffix);
        match self.tables.get(&base.to_ascii_lowercase()) {
            Some(_) => with_suffix(table, &self.suffix),
            None => table.to_string(),
        }
    }

    /// Provisioned test table names
    pub fn test_tables(&self) -> impl Iterator<Item = &str> {
        self.tables.values().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Rewrite source, cross-reference and target tables
    ///
    /// The lookup table lives in the other store and is never substituted.
    pub fn apply(&self, mut config: TransferConfig) -> TransferConfig {
        config.source.table = self.substitute(&config.source.table);
        config.xref.table = self.substitute(&config.xref.table);
        config.targets.zero.table = self.substitute(&config.targets.zero.table);
        config.targets.one.table = self.substitute(&config.targets.one.table);
        config
    }
}

pub struct TestTableProvisioner {
    pool: PgPool,
    config: ProvisioningConfig,
}

impl TestTableProvisioner {
    pub fn new(pool: PgPool, config: ProvisioningConfig) -> Self {
        Self { pool, config }
    }

    /// Drop, recreate and fill every configured test table
    ///
    /// Each table is cloned in its own transaction. Every name is validated
    /// before the first statement runs.
    pub async fn provision(&self) -> TransferResult<TableSubstitution> {
        let pairs = test_table_names(&self.config)?;

        for (live, test_table) in &pairs {
            self.clone_table(live, test_table)
                .await
                .map_err(|source| TransferError::Provisioning {
                    table: test_table.clone(),
                    source,
                })?;
        }

        Ok(TableSubstitution::new(self.config.suffix.trim(), &self.config.tables))
    }

    async fn clone_table(&self, live: &str, test_table: &str) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {test_table}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CREATE TABLE {test_table} (LIKE {live} INCLUDING ALL)"))
            .execute(&mut *tx)
            .await?;

        let copied = if self.config.data_copy_limit > 0 {
            sqlx::query(&format!(
                "INSERT INTO {test_table} SELECT * FROM {live} LIMIT {}",
                self.config.data_copy_limit
            ))
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            0
        };

        tx.commit().await?;

        info!(live, test_table, rows = copied, "Provisioned test table");
        Ok(())
    }
}

/// `(live, test)` table name pairs for `config`
///
/// Rejects a suffix with non-identifier characters, invalid table names and
/// live tables that already carry the suffix.
pub fn test_table_names(config: &ProvisioningConfig) -> TransferResult<Vec<(String, String)>> {
    let suffix = validate_suffix(config.suffix.trim())?;

    config
        .tables
        .iter()
        .map(|table| -> TransferResult<(String, String)> {
            validate_identifier(table)?;
            if strip_suffix(table, suffix) != table.as_str() {
                return Err(XferError::config(format!(
                    "provisioning table '{table}' already carries the suffix '{suffix}'"
                ))
                .into());
            }

            let test_table = with_suffix(table, suffix);
            validate_identifier(&test_table)?;
            Ok((table.clone(), test_table))
        })
        .collect()
}
