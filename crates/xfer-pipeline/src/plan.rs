//! Validated, ready-to-run form of a [`TransferConfig`]
//!
//! Everything that can go wrong with a configuration goes wrong here: sizes,
//! identifiers, mapping tokens, key columns and, once the tables have been
//! described, missing columns. The orchestrator and the store adapters only
//! ever see a [`TransferPlan`].

use serde::Serialize;
use xfer_common::names::{parse_column_list, validate_identifier};
use xfer_common::XferError;

use crate::config::TransferConfig;
use crate::error::{TransferError, TransferResult};
use crate::mapping::BindingPlan;
use crate::models::TargetVariant;
use crate::schema::{ColumnTypes, SchemaCatalog};
use crate::sql;

/// Upper bound on records per variant batch
pub const MAX_BATCH_SIZE: usize = 100_000;

/// Per-variant target: table, binding plan and generated insert statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantPlan {
    pub variant: TargetVariant,
    pub table: String,
    pub binding: BindingPlan,
    /// Columns identifying an existing target row
    pub key_columns: Vec<String>,
    pub column_types: ColumnTypes,
    /// Single-record insert
    pub insert_sql: String,
}

impl VariantPlan {
    fn build(
        variant: TargetVariant,
        table: &str,
        columns: &str,
        mapping: &str,
        key_columns: &[String],
        catalog: &SchemaCatalog,
    ) -> TransferResult<Self> {
        validate_identifier(table)?;

        let binding = BindingPlan::parse(columns, mapping)
            .and_then(|plan| plan.require_columns(key_columns).map(|_| plan))
            .map_err(|e| TransferError::mapping(variant.as_str(), e))?;

        if let Some(described) = catalog.table(table) {
            let names: Vec<&str> = binding.columns().iter().map(String::as_str).collect();
            described.require(table, &names)?;
        }

        let column_types = catalog.types(table);
        let insert_sql = sql::build_insert_if_absent(table, binding.columns(), key_columns, &column_types, 1);

        Ok(Self {
            variant,
            table: table.to_string(),
            binding,
            key_columns: key_columns.to_vec(),
            column_types,
            insert_sql,
        })
    }

    /// Insert of `records` records in one statement
    pub fn insert_sql_for(&self, records: usize) -> String {
        if records <= 1 {
            return self.insert_sql.clone();
        }
        sql::build_insert_if_absent(
            &self.table,
            self.binding.columns(),
            &self.key_columns,
            &self.column_types,
            records,
        )
    }
}

/// SQL statements generated from the configuration, as shown by `xfer plan`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementSet {
    pub page: String,
    pub lookup: String,
    pub xref: String,
    pub insert_zero: String,
    pub insert_one: String,
    pub mark_processed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan {
    pub page_size: u32,
    pub batch_size: usize,
    pub trigger_code: String,
    pub replacement_code: String,
    pub source_table: String,
    pub page_sql: String,
    pub lookup_sql: String,
    pub xref_sql: String,
    pub mark_processed_sql: Option<String>,
    pub zero: VariantPlan,
    pub one: VariantPlan,
}

impl TransferPlan {
    /// Plan with every column treated as text
    pub fn from_config(config: &TransferConfig) -> TransferResult<Self> {
        Self::with_schema(config, &SchemaCatalog::default())
    }

    /// Plan whose statements cast values to the described column types
    ///
    /// Tables present in `catalog` must contain every configured column.
    pub fn with_schema(config: &TransferConfig, catalog: &SchemaCatalog) -> TransferResult<Self> {
        if config.page_size == 0 {
            return Err(XferError::config("page_size must be greater than 0").into());
        }
        if config.batch_size == 0 {
            return Err(XferError::config("batch_size must be greater than 0").into());
        }
        if config.batch_size > MAX_BATCH_SIZE {
            return Err(XferError::config(format!(
                "batch_size must be at most {MAX_BATCH_SIZE}, got {}",
                config.batch_size
            ))
            .into());
        }
        if config.database.main_url.trim().is_empty() {
            return Err(XferError::config("database.main_url cannot be empty").into());
        }
        if config.database.lookup_url.trim().is_empty() {
            return Err(XferError::config("database.lookup_url cannot be empty").into());
        }
        if config.xref.trigger_code.trim().is_empty() {
            return Err(XferError::config("xref.trigger_code cannot be empty").into());
        }

        let source = &config.source;
        for name in [
            &source.table,
            &source.customer_key_col,
            &source.routing_code_col,
            &source.account_no_col,
            &source.discriminator_col,
            &source.maint_date_col,
            &source.note_col,
            &config.lookup.table,
            &config.lookup.key_col,
            &config.lookup.customer_id_col,
            &config.lookup.customer_id_type_col,
            &config.xref.table,
            &config.xref.external_col,
            &config.xref.internal_col,
        ] {
            validate_identifier(name)?;
        }

        let read_columns = [
            (
                source.table.as_str(),
                vec![
                    source.customer_key_col.as_str(),
                    source.routing_code_col.as_str(),
                    source.account_no_col.as_str(),
                    source.discriminator_col.as_str(),
                    source.maint_date_col.as_str(),
                    source.note_col.as_str(),
                ],
            ),
            (
                config.lookup.table.as_str(),
                vec![
                    config.lookup.key_col.as_str(),
                    config.lookup.customer_id_col.as_str(),
                    config.lookup.customer_id_type_col.as_str(),
                ],
            ),
            (
                config.xref.table.as_str(),
                vec![config.xref.external_col.as_str(), config.xref.internal_col.as_str()],
            ),
        ];
        for (table, columns) in &read_columns {
            if let Some(types) = catalog.table(table) {
                types.require(table, columns)?;
            }
        }

        let source_types = catalog.types(&source.table);
        let mark_processed_sql = if config.mark_processed {
            validate_identifier(&source.processed_flag_col)?;
            if let Some(types) = catalog.table(&source.table) {
                types.require(&source.table, &[source.processed_flag_col.as_str()])?;
            }
            Some(sql::mark_processed_update(source, &source_types))
        } else {
            None
        };

        let key_columns = parse_column_list(&config.targets.key_columns)?;
        let zero = VariantPlan::build(
            TargetVariant::Zero,
            &config.targets.zero.table,
            &config.targets.zero.columns,
            &config.targets.zero.mapping,
            &key_columns,
            catalog,
        )?;
        let one = VariantPlan::build(
            TargetVariant::One,
            &config.targets.one.table,
            &config.targets.one.columns,
            &config.targets.one.mapping,
            &key_columns,
            catalog,
        )?;

        Ok(Self {
            page_size: config.page_size,
            batch_size: config.batch_size,
            trigger_code: config.xref.trigger_code.trim().to_string(),
            replacement_code: config.xref.replacement_code.trim().to_string(),
            source_table: source.table.clone(),
            page_sql: sql::page_query(source),
            lookup_sql: sql::lookup_query(&config.lookup, &catalog.types(&config.lookup.table)),
            xref_sql: sql::xref_query(&config.xref, &catalog.types(&config.xref.table)),
            mark_processed_sql,
            zero,
            one,
        })
    }

    pub fn variant(&self, variant: TargetVariant) -> &VariantPlan {
        match variant {
            TargetVariant::Zero => &self.zero,
            TargetVariant::One => &self.one,
        }
    }

    pub fn statements(&self) -> StatementSet {
        StatementSet {
            page: self.page_sql.clone(),
            lookup: self.lookup_sql.clone(),
            xref: self.xref_sql.clone(),
            insert_zero: self.zero.insert_sql.clone(),
            insert_one: self.one.insert_sql.clone(),
            mark_processed: self.mark_processed_sql.clone(),
        }
    }
}
