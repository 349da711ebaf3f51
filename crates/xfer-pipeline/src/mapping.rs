//! Field mapping: which enriched value goes into which insert column
//!
//! Each target variant is configured with an ordered list of insert columns
//! and a parallel list of mapping tokens. Tokens are parsed once at startup
//! into a [`BindingPlan`]; binding a row is then a plain walk over the plan.
//!
//! Token vocabulary (case-insensitive):
//!
//! | token | bound value |
//! |---|---|
//! | `customer_id` | canonical customer id from the lookup |
//! | `customer_id_type` | customer id type from the lookup |
//! | `routing_code` | routing code after cross-reference substitution |
//! | `account_no` | account number after cross-reference substitution |
//! | `maint_date` | last maintenance date of the source row |
//! | `note` | free-text note of the source row |
//! | `NULL` | SQL null |
//! | `CONST:<value>` | the literal `<value>` |

use std::str::FromStr;

use thiserror::Error;
use xfer_common::names::{parse_column_list, parse_list};
use xfer_common::XferError;

use crate::models::EnrichedRow;

const CONSTANT_PREFIX: &str = "CONST:";

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("{columns} insert columns but {tokens} mapping tokens")]
    CountMismatch { columns: usize, tokens: usize },

    #[error("Unknown mapping token '{token}' at position {position}")]
    UnknownToken { position: usize, token: String },

    #[error("Key column '{0}' is not among the insert columns")]
    MissingKeyColumn(String),

    #[error(transparent)]
    List(#[from] XferError),
}

/// Enriched values available to a binding plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichedField {
    CustomerId,
    CustomerIdType,
    RoutingCode,
    AccountNo,
    MaintDate,
    Note,
}

impl EnrichedField {
    pub const ALL: [EnrichedField; 6] = [
        EnrichedField::CustomerId,
        EnrichedField::CustomerIdType,
        EnrichedField::RoutingCode,
        EnrichedField::AccountNo,
        EnrichedField::MaintDate,
        EnrichedField::Note,
    ];

    pub fn token(self) -> &'static str {
        match self {
            EnrichedField::CustomerId => "customer_id",
            EnrichedField::CustomerIdType => "customer_id_type",
            EnrichedField::RoutingCode => "routing_code",
            EnrichedField::AccountNo => "account_no",
            EnrichedField::MaintDate => "maint_date",
            EnrichedField::Note => "note",
        }
    }

    fn value(self, row: &EnrichedRow) -> Option<&str> {
        match self {
            EnrichedField::CustomerId => Some(row.customer_id.as_str()),
            EnrichedField::CustomerIdType => row.customer_id_type.as_deref(),
            EnrichedField::RoutingCode => row.routing_code.as_deref(),
            EnrichedField::AccountNo => row.account_no.as_deref(),
            EnrichedField::MaintDate => row.maint_date.as_deref(),
            EnrichedField::Note => row.note.as_deref(),
        }
    }
}

/// How one statement parameter is filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldBinding {
    Field(EnrichedField),
    Constant(String),
    Null,
}

impl FromStr for FieldBinding {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();

        if let Some(prefix) = token.get(..CONSTANT_PREFIX.len()) {
            if prefix.eq_ignore_ascii_case(CONSTANT_PREFIX) {
                return Ok(FieldBinding::Constant(token[CONSTANT_PREFIX.len()..].to_string()));
            }
        }

        if token.eq_ignore_ascii_case("NULL") {
            return Ok(FieldBinding::Null);
        }

        EnrichedField::ALL
            .into_iter()
            .find(|field| field.token().eq_ignore_ascii_case(token))
            .map(FieldBinding::Field)
            .ok_or_else(|| token.to_string())
    }
}

/// Ordered column → binding plan for one target variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPlan {
    columns: Vec<String>,
    bindings: Vec<FieldBinding>,
}

impl BindingPlan {
    pub fn new(columns: Vec<String>, bindings: Vec<FieldBinding>) -> Result<Self, MappingError> {
        if columns.len() != bindings.len() {
            return Err(MappingError::CountMismatch {
                columns: columns.len(),
                tokens: bindings.len(),
            });
        }
        Ok(Self { columns, bindings })
    }

    /// Parse comma-separated column and token lists
    pub fn parse(columns: &str, tokens: &str) -> Result<Self, MappingError> {
        let columns = parse_column_list(columns)?;
        let bindings = parse_list(tokens)?
            .iter()
            .enumerate()
            .map(|(i, token)| {
                token.parse().map_err(|token| MappingError::UnknownToken {
                    position: i + 1,
                    token,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(columns, bindings)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }

    /// Every key column must be bound, otherwise the insert-if-absent match
    /// condition would compare against a value that is never supplied
    pub fn require_columns(&self, keys: &[String]) -> Result<(), MappingError> {
        match keys
            .iter()
            .find(|key| !self.columns.iter().any(|c| c.eq_ignore_ascii_case(key)))
        {
            Some(missing) => Err(MappingError::MissingKeyColumn(missing.clone())),
            None => Ok(()),
        }
    }

    /// Bind values for one row, in column order
    pub fn bind(&self, row: &EnrichedRow) -> Vec<Option<String>> {
        self.bindings
            .iter()
            .map(|binding| match binding {
                FieldBinding::Field(field) => field.value(row).map(str::to_string),
                FieldBinding::Constant(value) => Some(value.clone()),
                FieldBinding::Null => None,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn row() -> EnrichedRow {
        EnrichedRow {
            customer_id: "T1".to_string(),
            customer_id_type: Some("I1".to_string()),
            routing_code: Some("812".to_string()),
            account_no: Some("A9".to_string()),
            maint_date: Some("2024-01-01".to_string()),
            note: Some("x".to_string()),
        }
    }

    #[test]
    fn test_token_parsing() {
        assert_eq!(
            "CUSTOMER_ID".parse::<FieldBinding>().unwrap(),
            FieldBinding::Field(EnrichedField::CustomerId)
        );
        assert_eq!("null".parse::<FieldBinding>().unwrap(), FieldBinding::Null);
        assert_eq!(
            "CONST:RB".parse::<FieldBinding>().unwrap(),
            FieldBinding::Constant("RB".to_string())
        );
        assert_eq!(
            "const:".parse::<FieldBinding>().unwrap(),
            FieldBinding::Constant(String::new())
        );
        assert_eq!("ts_cust".parse::<FieldBinding>().unwrap_err(), "ts_cust");
    }

    #[test]
    fn test_bind_follows_column_order() {
        let plan = BindingPlan::parse(
            "memo, accountno, userid, email, synchancode",
            "note, account_no, customer_id, NULL, CONST:RB",
        )
        .unwrap();

        assert_eq!(plan.columns(), ["memo", "accountno", "userid", "email", "synchancode"]);
        assert_eq!(
            plan.bind(&row()),
            vec![
                Some("x".to_string()),
                Some("A9".to_string()),
                Some("T1".to_string()),
                None,
                Some("RB".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_optional_field_binds_null() {
        let mut enriched = row();
        enriched.customer_id_type = None;
        let plan = BindingPlan::parse("userid,useridtype", "customer_id,customer_id_type").unwrap();
        assert_eq!(plan.bind(&enriched), vec![Some("T1".to_string()), None]);
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let err = BindingPlan::parse("a,b,c", "customer_id,note").unwrap_err();
        assert!(matches!(err, MappingError::CountMismatch { columns: 3, tokens: 2 }));
    }

    #[test]
    fn test_unknown_token_is_rejected() {
        let err = BindingPlan::parse("a,b", "customer_id,bsb_used").unwrap_err();
        match err {
            MappingError::UnknownToken { position, token } => {
                assert_eq!(position, 2);
                assert_eq!(token, "bsb_used");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_column_name_is_rejected() {
        assert!(matches!(
            BindingPlan::parse("a,b c", "note,note").unwrap_err(),
            MappingError::List(_)
        ));
    }

    #[test]
    fn test_require_columns() {
        let plan = BindingPlan::parse("userid,brchid,accountno", "customer_id,routing_code,account_no")
            .unwrap();
        let keys = vec!["USERID".to_string(), "accountno".to_string()];
        assert!(plan.require_columns(&keys).is_ok());

        let keys = vec!["userid".to_string(), "memo".to_string()];
        assert!(matches!(
            plan.require_columns(&keys),
            Err(MappingError::MissingKeyColumn(col)) if col == "memo"
        ));
    }
}
