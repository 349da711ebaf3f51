//! Transfer configuration
//!
//! Built once, before anything connects, from four layers (later wins):
//!
//! 1. compiled defaults ([`TransferConfig::default`])
//! 2. a `.env` file in the working directory, if present
//! 3. an optional TOML file (`--config <path>` or `XFER_CONFIG`)
//! 4. `XFER_`-prefixed environment variables, nested with `__`
//!    (`XFER_BATCH_SIZE=200`, `XFER_TARGETS__ZERO__TABLE=TRANSFERACCOUNT_TEST`)
//!
//! The resulting snapshot is immutable. Test-table provisioning produces a new
//! snapshot by value (see [`crate::provision::TableSubstitution`]).

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};
use xfer_common::{Result, XferError};

use crate::db::DbConfig;
use crate::plan::TransferPlan;

/// Default rows per page window.
pub const DEFAULT_PAGE_SIZE: u32 = 10_000;

/// Default records per variant batch before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default routing code that triggers cross-reference substitution.
pub const DEFAULT_TRIGGER_CODE: &str = "103";

/// Default routing code written when substitution fires.
pub const DEFAULT_REPLACEMENT_CODE: &str = "812";

/// Default suffix for provisioned test tables.
pub const DEFAULT_TEST_SUFFIX: &str = "_TEST";

/// Default number of rows copied into each provisioned test table.
pub const DEFAULT_DATA_COPY_LIMIT: u64 = 500;

/// Environment variable naming the TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "XFER_CONFIG";

const ENV_PREFIX: &str = "XFER_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub database: DatabaseConfig,
    pub page_size: u32,
    pub batch_size: usize,
    /// Flag source rows as processed in the same transaction as their insert
    pub mark_processed: bool,
    pub source: SourceTableConfig,
    pub lookup: LookupTableConfig,
    pub xref: XrefConfig,
    pub targets: TargetsConfig,
    pub provisioning: ProvisioningConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            mark_processed: false,
            source: SourceTableConfig::default(),
            lookup: LookupTableConfig::default(),
            xref: XrefConfig::default(),
            targets: TargetsConfig::default(),
            provisioning: ProvisioningConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Store holding the source, cross-reference and target tables
    pub main_url: String,
    /// Store holding the customer lookup table
    pub lookup_url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            main_url: "postgresql://localhost/xfer".to_string(),
            lookup_url: "postgresql://localhost/xfer_lookup".to_string(),
            max_connections: 2,
            acquire_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn main(&self) -> DbConfig {
        DbConfig {
            name: "main",
            url: self.main_url.clone(),
            max_connections: self.max_connections,
            acquire_timeout_secs: self.acquire_timeout_secs,
        }
    }

    pub fn lookup(&self) -> DbConfig {
        DbConfig {
            name: "lookup",
            url: self.lookup_url.clone(),
            max_connections: self.max_connections,
            acquire_timeout_secs: self.acquire_timeout_secs,
        }
    }
}

/// Source table and its column names
///
/// `(customer_key_col, routing_code_col, account_no_col)` is the paging order
/// and must be unique across the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceTableConfig {
    pub table: String,
    pub customer_key_col: String,
    pub routing_code_col: String,
    pub account_no_col: String,
    pub discriminator_col: String,
    pub maint_date_col: String,
    pub note_col: String,
    pub processed_flag_col: String,
    #[serde(deserialize_with = "lenient_string")]
    pub processed_value: String,
}

impl Default for SourceTableConfig {
    fn default() -> Self {
        Self {
            table: "BANCS_MIN_CLNA".to_string(),
            customer_key_col: "clna_cust_id_no".to_string(),
            routing_code_col: "clna_bsb_no".to_string(),
            account_no_col: "clna_acct_no".to_string(),
            discriminator_col: "clna_nom_acct_type".to_string(),
            maint_date_col: "clna_last_maint_date".to_string(),
            note_col: "transfer_note".to_string(),
            processed_flag_col: "issync".to_string(),
            processed_value: "Y".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupTableConfig {
    pub table: String,
    pub key_col: String,
    pub customer_id_col: String,
    pub customer_id_type_col: String,
}

impl Default for LookupTableConfig {
    fn default() -> Self {
        Self {
            table: "BANCS_SK_CUST_INFO".to_string(),
            key_col: "sk_cust_id".to_string(),
            customer_id_col: "ts_cust_id".to_string(),
            customer_id_type_col: "cust_id_type".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XrefConfig {
    pub table: String,
    /// Column matched against the source account number
    pub external_col: String,
    /// Column holding the replacement account number
    pub internal_col: String,
    #[serde(deserialize_with = "lenient_string")]
    pub trigger_code: String,
    #[serde(deserialize_with = "lenient_string")]
    pub replacement_code: String,
}

impl Default for XrefConfig {
    fn default() -> Self {
        Self {
            table: "XREF".to_string(),
            external_col: "extn_ref_no".to_string(),
            internal_col: "intn_ref_no".to_string(),
            trigger_code: DEFAULT_TRIGGER_CODE.to_string(),
            replacement_code: DEFAULT_REPLACEMENT_CODE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    /// Comma-separated columns identifying an existing target row
    pub key_columns: String,
    pub zero: TargetTableConfig,
    pub one: TargetTableConfig,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            key_columns: "userid,brchid,accountno".to_string(),
            zero: TargetTableConfig {
                table: "TRANSFERACCOUNT".to_string(),
                columns: "userid,brchid,accountno,updatedate,memo,email,receivermemo,synchancode"
                    .to_string(),
                mapping: "customer_id,routing_code,account_no,maint_date,note,NULL,NULL,CONST:RB"
                    .to_string(),
            },
            one: TargetTableConfig {
                table: "CUSTSETTRANSACCT".to_string(),
                columns: "userid,useridtype,brchid,accountno,updatedate,memo,email,receivermemo"
                    .to_string(),
                mapping:
                    "customer_id,customer_id_type,routing_code,account_no,maint_date,note,NULL,NULL"
                        .to_string(),
            },
        }
    }
}

/// One target table: insert columns and the parallel mapping tokens
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetTableConfig {
    pub table: String,
    pub columns: String,
    pub mapping: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Provision test tables before every `run`
    pub enabled: bool,
    /// Live tables to clone in the main store
    pub tables: Vec<String>,
    pub suffix: String,
    /// Rows copied into each clone; 0 copies structure only
    pub data_copy_limit: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tables: vec![
                "BANCS_MIN_CLNA".to_string(),
                "XREF".to_string(),
                "TRANSFERACCOUNT".to_string(),
                "CUSTSETTRANSACCT".to_string(),
            ],
            suffix: DEFAULT_TEST_SUFFIX.to_string(),
            data_copy_limit: DEFAULT_DATA_COPY_LIMIT,
        }
    }
}

impl TransferConfig {
    /// Load the layered configuration
    ///
    /// `path` takes precedence over `XFER_CONFIG`. A path that was asked for
    /// but does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut figment = Figment::from(Serialized::defaults(TransferConfig::default()));

        if let Some(path) = path {
            if !path.is_file() {
                return Err(XferError::config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!(path = %path.display(), "Loading configuration file");
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| XferError::config(e.to_string()))
    }

    /// Check everything that can be checked without a connection
    ///
    /// This builds the full [`TransferPlan`] so mapping and identifier errors
    /// surface here, before any row is read.
    pub fn validate(&self) -> std::result::Result<(), crate::error::TransferError> {
        TransferPlan::from_config(self).map(|_| ())
    }
}

/// Accept numbers as well as strings, so `XFER_XREF__TRIGGER_CODE=103` works
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Signed(i64),
        Unsigned(u64),
        Float(f64),
        Flag(bool),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Signed(n) => n.to_string(),
        Raw::Unsigned(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Flag(b) => b.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with(ENV_PREFIX) {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.page_size, 10_000);
        assert_eq!(config.batch_size, 500);
        assert!(!config.mark_processed);
        assert_eq!(config.xref.trigger_code, "103");
        assert_eq!(config.xref.replacement_code, "812");
        assert_eq!(config.provisioning.suffix, "_TEST");
        assert_eq!(config.provisioning.data_copy_limit, 500);
        assert_eq!(config.database.max_connections, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_defaults_without_file() {
        clear_env();
        let config = TransferConfig::load(None).unwrap();
        assert_eq!(config, TransferConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_toml_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
page_size = 2
batch_size = 3
mark_processed = true

[xref]
trigger_code = "555"

[targets.zero]
table = "ZERO_T"
"#
        )
        .unwrap();

        let config = TransferConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.page_size, 2);
        assert_eq!(config.batch_size, 3);
        assert!(config.mark_processed);
        assert_eq!(config.xref.trigger_code, "555");
        assert_eq!(config.xref.replacement_code, "812");
        assert_eq!(config.targets.zero.table, "ZERO_T");
        assert_eq!(config.targets.one.table, "CUSTSETTRANSACCT");
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "batch_size = 3").unwrap();

        std::env::set_var("XFER_BATCH_SIZE", "7");
        std::env::set_var("XFER_XREF__TRIGGER_CODE", "104");
        std::env::set_var("XFER_TARGETS__ONE__TABLE", "ONE_T");
        let config = TransferConfig::load(Some(file.path()));
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.xref.trigger_code, "104");
        assert_eq!(config.targets.one.table, "ONE_T");
    }

    #[test]
    #[serial]
    fn test_missing_file_is_an_error() {
        clear_env();
        let err = TransferConfig::load(Some(Path::new("/nonexistent/xfer.toml"))).unwrap_err();
        assert!(err.to_string().contains("configuration file not found"));
    }

    #[test]
    #[serial]
    fn test_example_file_matches_defaults() {
        clear_env();
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../xfer.example.toml");
        let config = TransferConfig::load(Some(&path)).unwrap();
        assert!(config.validate().is_ok());

        let defaults = TransferConfig::default();
        assert_eq!(config.source, defaults.source);
        assert_eq!(config.lookup, defaults.lookup);
        assert_eq!(config.xref, defaults.xref);
        assert_eq!(config.targets, defaults.targets);
        assert_eq!(config.provisioning, defaults.provisioning);
    }

    #[test]
    fn test_pool_settings() {
        let config = DatabaseConfig::default();
        assert_eq!(config.main().name, "main");
        assert_eq!(config.lookup().url, "postgresql://localhost/xfer_lookup");
    }
}
