//! Transfer orchestrator
//!
//! Drives one run: page through the source, enrich and route every row, and
//! flush per-variant batches as insert-if-absent writes.
//!
//! Per row, in order:
//! 1. trim all fields; a blank customer key skips the row
//! 2. resolve cross-reference substitution for routing code and account number
//! 3. look up the canonical customer id; no match skips the row
//! 4. route on the discriminator (`"0"` → Zero, `"1"` → One, else skip)
//! 5. bind the variant's columns and queue the record
//! 6. flush the variant's batch once it reaches the batch size
//!
//! Remaining records are flushed after the last page. Every flush is its own
//! transaction; a failing flush rolls back only its own batch and aborts the
//! run, leaving earlier commits in place.

use sqlx::PgPool;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;
use xfer_common::XferError;

use crate::batch::BatchAccumulator;
use crate::db::DbError;
use crate::error::{Stage, TransferError, TransferResult};
use crate::lookup::{CustomerLookup, PgCustomerLookup};
use crate::models::{EnrichedRow, SourceKey, SourceRow, TargetRecord, TargetVariant};
use crate::plan::TransferPlan;
use crate::sink::{PgTargetSink, TargetSink};
use crate::source::{PageWindow, PgSourceReader, SourceReader};
use crate::summary::{SkipReason, TransferSummary};
use crate::xref::{PgXrefStore, XrefResolver, XrefStore};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    PageLoaded,
    RowEnriched,
    RowRouted,
    BatchPending,
    Committed,
    Done,
    Failed,
}

/// The four stores a run talks to
pub struct TransferStores {
    pub source: Box<dyn SourceReader>,
    pub lookup: Box<dyn CustomerLookup>,
    pub xref: Box<dyn XrefStore>,
    pub sink: Box<dyn TargetSink>,
}

impl TransferStores {
    /// PostgreSQL adapters: source, cross-reference and targets on `main`,
    /// customer lookup on `lookup`
    pub fn postgres(plan: &TransferPlan, main: PgPool, lookup: PgPool) -> Self {
        Self {
            source: Box::new(PgSourceReader::new(main.clone(), plan.page_sql.clone())),
            lookup: Box::new(PgCustomerLookup::new(lookup, plan.lookup_sql.clone())),
            xref: Box::new(PgXrefStore::new(main.clone(), plan.xref_sql.clone())),
            sink: Box::new(PgTargetSink::new(main, plan)),
        }
    }
}

pub struct TransferOrchestrator {
    plan: TransferPlan,
    source: Box<dyn SourceReader>,
    lookup: Box<dyn CustomerLookup>,
    xref: XrefResolver,
    sink: Box<dyn TargetSink>,
    batches: BatchAccumulator,
    state: TransferState,
    window: PageWindow,
    summary: TransferSummary,
}

impl TransferOrchestrator {
    pub fn new(plan: TransferPlan, stores: TransferStores) -> Self {
        let xref = XrefResolver::new(
            stores.xref,
            plan.trigger_code.clone(),
            plan.replacement_code.clone(),
        );

        Self {
            batches: BatchAccumulator::new(plan.batch_size),
            window: PageWindow::first(plan.page_size),
            summary: TransferSummary::new(Uuid::new_v4()),
            state: TransferState::Idle,
            source: stores.source,
            lookup: stores.lookup,
            sink: stores.sink,
            xref,
            plan,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn summary(&self) -> &TransferSummary {
        &self.summary
    }

    pub fn run_id(&self) -> Uuid {
        self.summary.run_id
    }

    /// Run the transfer once
    ///
    /// An orchestrator runs a single time; build a new one for another run.
    pub async fn run(&mut self) -> TransferResult<TransferSummary> {
        if self.state != TransferState::Idle {
            return Err(XferError::config("transfer already ran; build a new orchestrator").into());
        }

        let span = info_span!("transfer", run_id = %self.summary.run_id);

        async move {
            info!(
                source_table = %self.plan.source_table,
                zero_table = %self.plan.zero.table,
                one_table = %self.plan.one.table,
                page_size = self.plan.page_size,
                batch_size = self.plan.batch_size,
                mark_processed = self.plan.mark_processed_sql.is_some(),
                "Starting transfer (paging requires a unique source ordering key)"
            );

            match self.run_pages().await {
                Ok(()) => {
                    self.transition(TransferState::Done);
                    self.summary.finish();
                    info!(
                        pages = self.summary.pages_read,
                        processed = self.summary.processed,
                        skipped = self.summary.skipped.total(),
                        inserted_zero = self.summary.inserted.zero,
                        inserted_one = self.summary.inserted.one,
                        batches = self.summary.batches_committed,
                        duration_ms = self.summary.duration_ms().unwrap_or_default(),
                        "Transfer complete"
                    );
                    Ok(self.summary.clone())
                }
                Err(e) => {
                    self.transition(TransferState::Failed);
                    self.summary.finish();
                    error!(error = %e, "Transfer failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_pages(&mut self) -> TransferResult<()> {
        let mut window = PageWindow::first(self.plan.page_size);

        loop {
            self.window = window;
            let rows = match self.source.fetch_page(window).await {
                Ok(rows) => rows,
                Err(e) => return Err(self.data_access(Stage::ReadingPage, e)),
            };

            self.summary.pages_read += 1;
            self.summary.last_window = Some(window);
            self.transition(TransferState::PageLoaded);
            debug!(window = %window, rows = rows.len(), "Page loaded");

            let last = window.is_last(rows.len());
            for row in rows {
                self.process_row(row).await?;
            }

            if last {
                break;
            }
            window = window.next();
        }

        for variant in TargetVariant::ALL {
            self.flush(variant).await?;
        }

        Ok(())
    }

    async fn process_row(&mut self, raw: SourceRow) -> TransferResult<()> {
        self.summary.processed += 1;

        let source_key = SourceKey {
            customer_key: raw.customer_key.clone().unwrap_or_default(),
            routing_code: raw.routing_code.clone(),
            account_no: raw.account_no.clone(),
        };
        let row = raw.trimmed();

        let Some(customer_key) = row.customer_key().map(str::to_string) else {
            self.skip(SkipReason::BlankCustomerKey, &row);
            return Ok(());
        };

        let routing = match self
            .xref
            .resolve(row.routing_code.as_deref(), row.account_no.as_deref())
            .await
        {
            Ok(routing) => routing,
            Err(e) => return Err(self.data_access(Stage::ResolvingXref, e)),
        };
        if routing.substituted {
            self.summary.substituted += 1;
        }

        let lookup = match self.lookup.lookup(&customer_key).await {
            Ok(lookup) => lookup,
            Err(e) => return Err(self.data_access(Stage::LookingUpCustomer, e)),
        };
        let Some((customer_id, lookup)) = lookup
            .and_then(|r| r.canonical_id().map(str::to_string).map(|id| (id, r)))
        else {
            self.skip(SkipReason::NoLookupMatch, &row);
            return Ok(());
        };
        self.transition(TransferState::RowEnriched);

        let Some(variant) = TargetVariant::from_discriminator(row.discriminator.as_deref()) else {
            self.skip(SkipReason::UnknownDiscriminator, &row);
            return Ok(());
        };

        let enriched = EnrichedRow::new(&row, routing, &customer_id, &lookup);
        let record = TargetRecord {
            variant,
            binds: self.plan.variant(variant).binding.bind(&enriched),
            source_key,
        };
        self.transition(TransferState::RowRouted);

        self.summary.queued.add(variant, 1);
        let full = self.batches.push(record);
        self.transition(TransferState::BatchPending);

        if full {
            self.flush(variant).await?;
        }

        Ok(())
    }

    /// Write and commit everything queued for `variant`
    ///
    /// The batch is taken out of the accumulator first: on failure it is gone
    /// from memory and rolled back in the store.
    async fn flush(&mut self, variant: TargetVariant) -> TransferResult<()> {
        let records = self.batches.take(variant);
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len() as u64;

        match self.sink.write_batch(variant, &records).await {
            Ok(outcome) => {
                self.summary.committed.add(variant, count);
                self.summary.inserted.add(variant, outcome.inserted);
                self.summary.marked_processed += outcome.marked;
                self.summary.batches_committed += 1;
                self.transition(TransferState::Committed);

                info!(
                    variant = %variant,
                    table = %self.plan.variant(variant).table,
                    records = count,
                    inserted = outcome.inserted,
                    marked = outcome.marked,
                    window = %self.window,
                    "Batch committed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    variant = %variant,
                    records = count,
                    window = %self.window,
                    "Batch rolled back"
                );
                Err(self.data_access(Stage::FlushingBatch, e))
            }
        }
    }

    fn skip(&mut self, reason: SkipReason, row: &SourceRow) {
        self.summary.skipped.record(reason);
        trace!(
            reason = reason.as_str(),
            customer_key = ?row.customer_key,
            discriminator = ?row.discriminator,
            "Row skipped"
        );
    }

    fn transition(&mut self, next: TransferState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "State transition");
            self.state = next;
        }
    }

    fn data_access(&self, stage: Stage, source: DbError) -> TransferError {
        TransferError::DataAccess {
            stage,
            window: self.window,
            processed: self.summary.processed,
            committed: self.summary.committed.total(),
            source,
        }
    }
}
