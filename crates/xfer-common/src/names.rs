//! Table and column name helpers
//!
//! Every table and column name in the transfer configuration ends up
//! interpolated into SQL text, so names are checked against a conservative
//! identifier pattern before any statement is built.

use regex::Regex;

use crate::error::{Result, XferError};

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_$]*(\.[A-Za-z_][A-Za-z0-9_$]*)?$";

const SUFFIX_PATTERN: &str = r"^[A-Za-z0-9_$]+$";

/// Validate a (possibly schema-qualified) SQL identifier
pub fn validate_identifier(name: &str) -> Result<&str> {
    let pattern = Regex::new(IDENTIFIER_PATTERN)
        .map_err(|e| XferError::config(format!("identifier pattern failed to compile: {e}")))?;

    if pattern.is_match(name) {
        Ok(name)
    } else {
        Err(XferError::InvalidIdentifier(name.to_string()))
    }
}

/// Validate a table-name suffix: identifier characters only, no schema dot
pub fn validate_suffix(suffix: &str) -> Result<&str> {
    let pattern = Regex::new(SUFFIX_PATTERN)
        .map_err(|e| XferError::config(format!("suffix pattern failed to compile: {e}")))?;

    if pattern.is_match(suffix) {
        Ok(suffix)
    } else {
        Err(XferError::config(format!(
            "invalid table suffix '{suffix}': expected [A-Za-z0-9_$]+"
        )))
    }
}

/// Split a comma-separated list, trimming whitespace around every entry
///
/// Empty lists and empty entries (`"a,,b"`) are rejected.
pub fn parse_list(list: &str) -> Result<Vec<String>> {
    if list.trim().is_empty() {
        return Err(XferError::InvalidColumnList {
            list: list.to_string(),
            reason: "list is empty".to_string(),
        });
    }

    let entries: Vec<String> = list.split(',').map(|s| s.trim().to_string()).collect();

    if let Some(position) = entries.iter().position(|e| e.is_empty()) {
        return Err(XferError::InvalidColumnList {
            list: list.to_string(),
            reason: format!("entry {} is empty", position + 1),
        });
    }

    Ok(entries)
}

/// Parse a comma-separated column list and validate every column name
pub fn parse_column_list(list: &str) -> Result<Vec<String>> {
    let columns = parse_list(list)?;
    for column in &columns {
        validate_identifier(column)?;
    }
    Ok(columns)
}

/// Append `suffix` to `name` exactly once
///
/// Any trailing repetitions of the suffix are collapsed first (compared
/// case-insensitively), so `with_suffix("T_TEST_TEST", "_TEST")` and
/// `with_suffix("T", "_TEST")` both give `T_TEST`.
pub fn with_suffix(name: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return name.to_string();
    }
    format!("{}{}", strip_suffix(name, suffix), suffix)
}

/// Remove every trailing repetition of `suffix` from `name`
///
/// The name is never reduced to an empty string.
pub fn strip_suffix<'a>(name: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        return name;
    }

    let mut base = name;
    while base.len() > suffix.len() {
        let split = base.len() - suffix.len();
        match base.get(split..) {
            Some(tail) if tail.eq_ignore_ascii_case(suffix) => base = &base[..split],
            _ => break,
        }
    }
    base
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("transfer_note").is_ok());
        assert!(validate_identifier("public.TRANSFERACCOUNT").is_ok());
        assert!(validate_identifier("col$1").is_ok());
        assert!(validate_identifier("1col").is_err());
        assert!(validate_identifier("a; DROP TABLE x").is_err());
        assert!(validate_identifier("a.b.c").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_validate_suffix() {
        assert!(validate_suffix("_TEST").is_ok());
        assert!(validate_suffix("_v2$").is_ok());
        assert!(validate_suffix(", XREF").is_err());
        assert!(validate_suffix(".other").is_err());
        assert!(validate_suffix("_T; DROP TABLE x").is_err());
        assert!(validate_suffix("").is_err());
    }

    #[test]
    fn test_parse_column_list_trims() {
        let columns = parse_column_list(" userid ,brchid,  accountno").unwrap();
        assert_eq!(columns, vec!["userid", "brchid", "accountno"]);
    }

    #[test]
    fn test_parse_list_rejects_empty_entries() {
        assert!(parse_list("").is_err());
        assert!(parse_list("   ").is_err());
        let err = parse_list("a,,b").unwrap_err();
        assert!(err.to_string().contains("entry 2 is empty"));
    }

    #[test]
    fn test_parse_list_keeps_tokens_verbatim() {
        let tokens = parse_list("customer_id, CONST:RB ,NULL").unwrap();
        assert_eq!(tokens, vec!["customer_id", "CONST:RB", "NULL"]);
    }

    #[test]
    fn test_parse_column_list_rejects_bad_names() {
        assert!(parse_column_list("userid, user id").is_err());
    }

    #[test]
    fn test_with_suffix_is_idempotent() {
        assert_eq!(with_suffix("TRANSFERACCOUNT", "_TEST"), "TRANSFERACCOUNT_TEST");
        assert_eq!(with_suffix("TRANSFERACCOUNT_TEST", "_TEST"), "TRANSFERACCOUNT_TEST");
        assert_eq!(with_suffix("TRANSFERACCOUNT_TEST_TEST", "_TEST"), "TRANSFERACCOUNT_TEST");
        assert_eq!(with_suffix("transferaccount_test", "_TEST"), "transferaccount_TEST");

        let once = with_suffix("XREF", "_TEST");
        assert_eq!(with_suffix(&once, "_TEST"), once);
    }

    #[test]
    fn test_strip_suffix_never_empties_name() {
        assert_eq!(strip_suffix("_TEST", "_TEST"), "_TEST");
        assert_eq!(strip_suffix("_TEST_TEST", "_TEST"), "_TEST");
        assert_eq!(strip_suffix("XREF", ""), "XREF");
    }
}
