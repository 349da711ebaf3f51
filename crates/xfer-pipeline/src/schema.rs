//! Column types of the tables a run touches
//!
//! Values travel through the pipeline as text. Before a run, the column types
//! of every configured table are read from the PostgreSQL catalog so each bound
//! value can be cast to its column's type inside the statement. A table that
//! has not been described is treated as all-text.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::debug;
use xfer_common::names::validate_identifier;
use xfer_common::XferError;

use crate::config::TransferConfig;
use crate::db::DbResult;
use crate::error::{TransferError, TransferResult};

/// Column names and formatted types of one relation, in column order.
///
/// `to_regclass` resolves the name the same way an unquoted identifier in a
/// statement is resolved (search path, case folding).
const DESCRIBE_SQL: &str = "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
     FROM pg_catalog.pg_attribute a \
     WHERE a.attrelid = to_regclass($1) AND a.attnum > 0 AND NOT a.attisdropped \
     ORDER BY a.attnum";

/// Column name → SQL type for one table
///
/// Names compare case-insensitively, like unquoted identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnTypes {
    columns: HashMap<String, String>,
}

impl ColumnTypes {
    pub fn new<I, N, T>(columns: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: AsRef<str>,
        T: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, sql_type)| (name.as_ref().to_ascii_lowercase(), sql_type.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .get(&column.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Parameter `$n` as a value for `column` in an insert
    ///
    /// Text-like and unknown columns take the text value as is. Other types get
    /// an explicit cast; a blank value becomes null since no typed column can
    /// hold it.
    pub fn insert_param(&self, n: usize, column: &str) -> String {
        match self.typed(column) {
            Some(sql_type) => format!("CAST(NULLIF(${n}, '') AS {sql_type})"),
            None => format!("CAST(${n} AS TEXT)"),
        }
    }

    /// Parameter `$n` compared against `column`
    pub fn match_param(&self, n: usize, column: &str) -> String {
        match self.typed(column) {
            Some(sql_type) => format!("CAST(${n} AS {sql_type})"),
            None => format!("${n}"),
        }
    }

    /// The column's type, unless it is text-like or unknown
    fn typed(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|t| !is_text_type(t))
    }

    /// Fail unless every name in `columns` exists
    pub fn require(&self, table: &str, columns: &[&str]) -> Result<(), XferError> {
        match columns.iter().find(|c| self.get(c).is_none()) {
            Some(missing) => Err(XferError::config(format!(
                "column '{missing}' does not exist in table '{table}'"
            ))),
            None => Ok(()),
        }
    }
}

fn is_text_type(sql_type: &str) -> bool {
    let t = sql_type.to_ascii_lowercase();
    t == "text" || t == "name" || t == "citext" || t.starts_with("character") || t.starts_with("bpchar")
}

/// Column types for every table of a configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCatalog {
    tables: HashMap<String, ColumnTypes>,
}

impl SchemaCatalog {
    pub fn with_table(mut self, table: &str, columns: ColumnTypes) -> Self {
        self.tables.insert(table.to_ascii_lowercase(), columns);
        self
    }

    /// Described columns of `table`, if it was described
    pub fn table(&self, table: &str) -> Option<&ColumnTypes> {
        self.tables.get(&table.to_ascii_lowercase())
    }

    /// Column types of `table`; an undescribed table yields an empty set
    pub fn types(&self, table: &str) -> ColumnTypes {
        self.table(table).cloned().unwrap_or_default()
    }

    /// Describe source, cross-reference and target tables through `main` and
    /// the lookup table through `lookup`
    pub async fn load(config: &TransferConfig, main: &PgPool, lookup: &PgPool) -> TransferResult<Self> {
        let mut catalog = Self::default();

        let on_main = [
            &config.source.table,
            &config.xref.table,
            &config.targets.zero.table,
            &config.targets.one.table,
        ];
        for table in on_main {
            catalog = catalog.with_table(table, describe(main, table).await?);
        }
        catalog = catalog.with_table(&config.lookup.table, describe(lookup, &config.lookup.table).await?);

        Ok(catalog)
    }
}

async fn describe(pool: &PgPool, table: &str) -> TransferResult<ColumnTypes> {
    validate_identifier(table)?;

    let rows = fetch_columns(pool, table)
        .await
        .map_err(|source| TransferError::Schema {
            table: table.to_string(),
            source,
        })?;

    if rows.is_empty() {
        return Err(XferError::config(format!("table '{table}' does not exist")).into());
    }

    debug!(table, columns = rows.len(), "Described table");
    Ok(ColumnTypes::new(rows))
}

async fn fetch_columns(pool: &PgPool, table: &str) -> DbResult<Vec<(String, String)>> {
    Ok(sqlx::query_as::<_, (String, String)>(DESCRIBE_SQL).bind(table).fetch_all(pool).await?)
}
