//! Run summary reported at the end of a transfer

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::TargetVariant;
use crate::source::PageWindow;

/// Why a row was read but not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BlankCustomerKey,
    NoLookupMatch,
    UnknownDiscriminator,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            SkipReason::BlankCustomerKey => "blank_customer_key",
            SkipReason::NoLookupMatch => "no_lookup_match",
            SkipReason::UnknownDiscriminator => "unknown_discriminator",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub blank_customer_key: u64,
    pub no_lookup_match: u64,
    pub unknown_discriminator: u64,
}

impl SkipCounts {
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::BlankCustomerKey => self.blank_customer_key += 1,
            SkipReason::NoLookupMatch => self.no_lookup_match += 1,
            SkipReason::UnknownDiscriminator => self.unknown_discriminator += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.blank_customer_key + self.no_lookup_match + self.unknown_discriminator
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VariantCounts {
    pub zero: u64,
    pub one: u64,
}

impl VariantCounts {
    pub fn add(&mut self, variant: TargetVariant, n: u64) {
        match variant {
            TargetVariant::Zero => self.zero += n,
            TargetVariant::One => self.one += n,
        }
    }

    pub fn get(&self, variant: TargetVariant) -> u64 {
        match variant {
            TargetVariant::Zero => self.zero,
            TargetVariant::One => self.one,
        }
    }

    pub fn total(&self) -> u64 {
        self.zero + self.one
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_read: u64,
    /// Rows read from the source, skipped or not
    pub processed: u64,
    pub skipped: SkipCounts,
    /// Rows substituted through the cross-reference table
    pub substituted: u64,
    /// Records appended to a batch
    pub queued: VariantCounts,
    /// Records in batches that committed
    pub committed: VariantCounts,
    /// New target rows; re-runs over unchanged data leave this at zero
    pub inserted: VariantCounts,
    pub batches_committed: u64,
    pub marked_processed: u64,
    pub last_window: Option<PageWindow>,
}

impl TransferSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            pages_read: 0,
            processed: 0,
            skipped: SkipCounts::default(),
            substituted: 0,
            queued: VariantCounts::default(),
            committed: VariantCounts::default(),
            inserted: VariantCounts::default(),
            batches_committed: 0,
            marked_processed: 0,
            last_window: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_counts_per_reason() {
        let mut skips = SkipCounts::default();
        skips.record(SkipReason::BlankCustomerKey);
        skips.record(SkipReason::NoLookupMatch);
        skips.record(SkipReason::NoLookupMatch);
        assert_eq!(skips.no_lookup_match, 2);
        assert_eq!(skips.unknown_discriminator, 0);
        assert_eq!(skips.total(), 3);
    }

    #[test]
    fn test_summary_serializes() {
        let mut summary = TransferSummary::new(Uuid::new_v4());
        summary.inserted.add(TargetVariant::One, 3);
        summary.last_window = Some(PageWindow::first(10));
        summary.finish();

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["inserted"]["one"], 3);
        assert_eq!(json["skipped"]["blank_customer_key"], 0);
        assert_eq!(json["last_window"]["upper"], 10);
        assert!(summary.duration_ms().unwrap() >= 0);
    }
}
