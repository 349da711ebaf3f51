//! Row and record types that flow through the transfer pipeline
//!
//! A [`SourceRow`] is read from the source table, combined with a
//! [`ResolvedRouting`] and a [`LookupResult`] into an [`EnrichedRow`], and
//! finally bound into a [`TargetRecord`] for one of the two [`TargetVariant`]s.
//! None of these outlive the processing of a single row except target records,
//! which wait in a batch until it is flushed.

use serde::{Deserialize, Serialize};

/// Trim a nullable text value read from a store
pub fn trim_opt(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string())
}

/// Trim a nullable text value, treating blank strings as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    trim_opt(value).filter(|s| !s.is_empty())
}

/// One row of the source table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    pub customer_key: Option<String>,
    pub routing_code: Option<String>,
    pub account_no: Option<String>,
    /// Single-character selector of the target shape ("0" or "1")
    pub discriminator: Option<String>,
    pub maint_date: Option<String>,
    pub note: Option<String>,
}

impl SourceRow {
    /// Trim every field
    pub fn trimmed(self) -> Self {
        Self {
            customer_key: trim_opt(self.customer_key),
            routing_code: trim_opt(self.routing_code),
            account_no: trim_opt(self.account_no),
            discriminator: trim_opt(self.discriminator),
            maint_date: trim_opt(self.maint_date),
            note: trim_opt(self.note),
        }
    }

    /// Customer key, if present and not blank
    pub fn customer_key(&self) -> Option<&str> {
        self.customer_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Result of the customer lookup against the second database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResult {
    pub customer_id: Option<String>,
    /// Only meaningful when `customer_id` is present
    pub customer_id_type: Option<String>,
}

impl LookupResult {
    pub fn new(customer_id: Option<String>, customer_id_type: Option<String>) -> Self {
        Self {
            customer_id: non_blank(customer_id),
            customer_id_type: trim_opt(customer_id_type),
        }
    }

    /// Canonical customer id; `None` means the row has no match
    pub fn canonical_id(&self) -> Option<&str> {
        self.customer_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Routing code and account number after optional cross-reference substitution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRouting {
    pub routing_code: Option<String>,
    pub account_no: Option<String>,
    /// True when the cross-reference rule fired
    pub substituted: bool,
}

impl ResolvedRouting {
    /// The row's own routing values
    pub fn unchanged(routing_code: Option<&str>, account_no: Option<&str>) -> Self {
        Self {
            routing_code: routing_code.map(str::to_string),
            account_no: account_no.map(str::to_string),
            substituted: false,
        }
    }
}

/// The two destination shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetVariant {
    Zero,
    One,
}

impl TargetVariant {
    pub const ALL: [TargetVariant; 2] = [TargetVariant::Zero, TargetVariant::One];

    /// `"0"` selects Zero, `"1"` selects One; anything else selects nothing
    pub fn from_discriminator(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            Some("0") => Some(TargetVariant::Zero),
            Some("1") => Some(TargetVariant::One),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetVariant::Zero => "zero",
            TargetVariant::One => "one",
        }
    }
}

impl std::fmt::Display for TargetVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed set of fields a binding plan can draw values from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichedRow {
    pub customer_id: String,
    pub customer_id_type: Option<String>,
    pub routing_code: Option<String>,
    pub account_no: Option<String>,
    pub maint_date: Option<String>,
    pub note: Option<String>,
}

impl EnrichedRow {
    pub fn new(
        row: &SourceRow,
        routing: ResolvedRouting,
        customer_id: &str,
        lookup: &LookupResult,
    ) -> Self {
        Self {
            customer_id: customer_id.to_string(),
            customer_id_type: lookup.customer_id_type.clone(),
            routing_code: routing.routing_code,
            account_no: routing.account_no,
            maint_date: row.maint_date.clone(),
            note: row.note.clone(),
        }
    }
}

/// Identity of a source row as it was read (before substitution)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceKey {
    pub customer_key: String,
    pub routing_code: Option<String>,
    pub account_no: Option<String>,
}

/// A record queued for one target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub variant: TargetVariant,
    /// One value per insert column, in column order
    pub binds: Vec<Option<String>>,
    pub source_key: SourceKey,
}
