//! SQL text for every statement the pipeline runs
//!
//! All builders are pure. Table and column names must already have passed
//! [`xfer_common::names::validate_identifier`]; values are always bound as
//! positional parameters and never interpolated.

use crate::config::{LookupTableConfig, SourceTableConfig, XrefConfig};
use crate::schema::ColumnTypes;

/// Ranking column added by the page query
const RANK_COLUMN: &str = "xfer_rn";

/// Row ordinal carried through the VALUES list of a batch insert
const ORDINAL_COLUMN: &str = "xfer_ord";

/// Build an insert of `rows` records that skips every record whose key
/// already exists
///
/// One parameter per insert column per record, numbered record by record in
/// insert-column order. Keys match with `IS NOT DISTINCT FROM`, so null key
/// values match too. When several records in one statement share a key only
/// the first is inserted. An existing matching row is never updated.
pub fn build_insert_if_absent(
    table: &str,
    insert_columns: &[String],
    key_columns: &[String],
    types: &ColumnTypes,
    rows: usize,
) -> String {
    let column_list = insert_columns.join(", ");
    let qualified = |alias: &str, columns: &[String]| {
        columns
            .iter()
            .map(|c| format!("{alias}.{c}"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let width = insert_columns.len();
    let values = (0..rows.max(1))
        .map(|row| {
            let params = insert_columns
                .iter()
                .enumerate()
                .map(|(i, c)| types.insert_param(row * width + i + 1, c))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({}, {params})", row + 1)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let key_match = key_columns
        .iter()
        .map(|k| format!("tgt.{k} IS NOT DISTINCT FROM src.{k}"))
        .collect::<Vec<_>>()
        .join(" AND ");

    format!(
        "INSERT INTO {table} ({column_list}) \
         SELECT {src_columns} FROM (\
         SELECT DISTINCT ON ({v_keys}) {v_columns} \
         FROM (VALUES {values}) AS v({ORDINAL_COLUMN}, {column_list}) \
         ORDER BY {v_keys}, v.{ORDINAL_COLUMN}) src \
         WHERE NOT EXISTS (SELECT 1 FROM {table} tgt WHERE {key_match})",
        src_columns = qualified("src", insert_columns),
        v_keys = qualified("v", key_columns),
        v_columns = qualified("v", insert_columns),
    )
}

/// Page query over `ROW_NUMBER()` ranked by the composite source key
///
/// Parameters: `$1` exclusive lower bound, `$2` inclusive upper bound (BIGINT).
/// Columns: customer key, routing code, account number, discriminator,
/// maintenance date, note; all cast to text.
pub fn page_query(source: &SourceTableConfig) -> String {
    let columns = [
        &source.customer_key_col,
        &source.routing_code_col,
        &source.account_no_col,
        &source.discriminator_col,
        &source.maint_date_col,
        &source.note_col,
    ]
    .iter()
    .map(|c| format!("CAST(ranked.{c} AS TEXT)"))
    .collect::<Vec<_>>()
    .join(", ");

    format!(
        "SELECT {columns} FROM (\
         SELECT s.*, ROW_NUMBER() OVER (ORDER BY s.{key}, s.{routing}, s.{account}) AS {RANK_COLUMN} \
         FROM {table} s) ranked \
         WHERE ranked.{RANK_COLUMN} > $1 AND ranked.{RANK_COLUMN} <= $2 \
         ORDER BY ranked.{RANK_COLUMN}",
        table = source.table,
        key = source.customer_key_col,
        routing = source.routing_code_col,
        account = source.account_no_col,
    )
}

/// Point lookup of canonical customer id and id type by source customer key
pub fn lookup_query(lookup: &LookupTableConfig, types: &ColumnTypes) -> String {
    format!(
        "SELECT CAST({id} AS TEXT), CAST({id_type} AS TEXT) FROM {table} WHERE {key} = {param} LIMIT 1",
        id = lookup.customer_id_col,
        id_type = lookup.customer_id_type_col,
        table = lookup.table,
        key = lookup.key_col,
        param = types.match_param(1, &lookup.key_col),
    )
}

/// Mapped account number for an external account number
pub fn xref_query(xref: &XrefConfig, types: &ColumnTypes) -> String {
    format!(
        "SELECT CAST({internal} AS TEXT) FROM {table} WHERE {external} = {param} LIMIT 1",
        internal = xref.internal_col,
        table = xref.table,
        external = xref.external_col,
        param = types.match_param(1, &xref.external_col),
    )
}

/// Flag one source row as processed
///
/// Parameters: customer key, routing code, account number as read from the
/// source row. Null routing code or account number still match.
pub fn mark_processed_update(source: &SourceTableConfig, types: &ColumnTypes) -> String {
    format!(
        "UPDATE {table} SET {flag} = '{value}' \
         WHERE {key} = {p1} AND {routing} IS NOT DISTINCT FROM {p2} AND {account} IS NOT DISTINCT FROM {p3}",
        table = source.table,
        flag = source.processed_flag_col,
        value = source.processed_value.replace('\'', "''"),
        key = source.customer_key_col,
        routing = source.routing_code_col,
        account = source.account_no_col,
        p1 = types.match_param(1, &source.customer_key_col),
        p2 = types.match_param(2, &source.routing_code_col),
        p3 = types.match_param(3, &source.account_no_col),
    )
}
