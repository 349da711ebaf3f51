//! Shared helpers for xfer-pipeline integration tests
//!
//! - In-memory stores implementing the pipeline's store traits, with
//!   failure injection and call recording
//! - A PostgreSQL container wrapper for end-to-end tests (requires Docker)

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{core::IntoContainerPort, runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::info;

use xfer_pipeline::config::TransferConfig;
use xfer_pipeline::db::{DbError, DbResult};
use xfer_pipeline::lookup::CustomerLookup;
use xfer_pipeline::models::{LookupResult, SourceKey, SourceRow, TargetRecord, TargetVariant};
use xfer_pipeline::sink::{BatchOutcome, TargetSink};
use xfer_pipeline::source::{PageWindow, SourceReader};
use xfer_pipeline::xref::XrefStore;
use xfer_pipeline::{TransferOrchestrator, TransferPlan, TransferStores};

pub fn init_test_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,xfer_pipeline=debug,sqlx=warn,testcontainers=info")
        }))
        .with_test_writer()
        .try_init();
}

/// Source row with every field set from a tuple
pub fn row(
    customer_key: Option<&str>,
    routing_code: &str,
    account_no: &str,
    discriminator: &str,
    maint_date: &str,
    note: &str,
) -> SourceRow {
    SourceRow {
        customer_key: customer_key.map(str::to_string),
        routing_code: Some(routing_code.to_string()),
        account_no: Some(account_no.to_string()),
        discriminator: Some(discriminator.to_string()),
        maint_date: Some(maint_date.to_string()),
        note: Some(note.to_string()),
    }
}

fn unavailable() -> DbError {
    DbError::from(sqlx::Error::PoolTimedOut)
}

// ============================================================================
// In-memory stores
// ============================================================================

/// Source table held in rank order; rank of `rows[i]` is `i + 1`
#[derive(Clone, Default)]
pub struct MemorySource {
    rows: Arc<Vec<SourceRow>>,
    windows: Arc<Mutex<Vec<PageWindow>>>,
    fail_on_page: Option<usize>,
}

impl MemorySource {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self {
            rows: Arc::new(rows),
            ..Default::default()
        }
    }

    /// Fail the n-th page query (1-based)
    pub fn failing_on_page(mut self, page: usize) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn windows(&self) -> Vec<PageWindow> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch_page(&self, window: PageWindow) -> DbResult<Vec<SourceRow>> {
        let page_number = {
            let mut windows = self.windows.lock().unwrap();
            windows.push(window);
            windows.len()
        };
        if self.fail_on_page == Some(page_number) {
            return Err(unavailable());
        }

        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| window.contains(*i as i64 + 1))
            .map(|(_, row)| row.clone())
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct MemoryLookup {
    entries: Arc<HashMap<String, LookupResult>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MemoryLookup {
    pub fn new(entries: &[(&str, &str, Option<&str>)]) -> Self {
        Self {
            entries: Arc::new(
                entries
                    .iter()
                    .map(|(key, id, id_type)| {
                        (
                            key.to_string(),
                            LookupResult::new(Some(id.to_string()), id_type.map(str::to_string)),
                        )
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CustomerLookup for MemoryLookup {
    async fn lookup(&self, customer_key: &str) -> DbResult<Option<LookupResult>> {
        self.calls.lock().unwrap().push(customer_key.to_string());
        Ok(self.entries.get(customer_key).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MemoryXref {
    entries: Arc<HashMap<String, String>>,
    calls: Arc<Mutex<usize>>,
}

impl MemoryXref {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            entries: Arc::new(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl XrefStore for MemoryXref {
    async fn mapped_account(&self, account_no: &str) -> DbResult<Option<String>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.entries.get(account_no).cloned())
    }
}

#[derive(Default)]
struct SinkState {
    zero: Vec<Vec<Option<String>>>,
    one: Vec<Vec<Option<String>>>,
    marked: Vec<SourceKey>,
    /// (variant, record count) of every committed batch
    batches: Vec<(TargetVariant, usize)>,
    calls: usize,
}

/// Two target tables with insert-if-absent semantics and atomic batches
#[derive(Clone)]
pub struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    zero_keys: Arc<Vec<usize>>,
    one_keys: Arc<Vec<usize>>,
    mark_processed: bool,
    fail_on_batch: Option<usize>,
}

impl MemorySink {
    pub fn for_plan(plan: &TransferPlan) -> Self {
        let key_positions = |variant: TargetVariant| {
            let target = plan.variant(variant);
            target
                .key_columns
                .iter()
                .map(|key| {
                    target
                        .binding
                        .columns()
                        .iter()
                        .position(|c| c.eq_ignore_ascii_case(key))
                        .unwrap()
                })
                .collect::<Vec<_>>()
        };

        Self {
            state: Arc::new(Mutex::new(SinkState::default())),
            zero_keys: Arc::new(key_positions(TargetVariant::Zero)),
            one_keys: Arc::new(key_positions(TargetVariant::One)),
            mark_processed: plan.mark_processed_sql.is_some(),
            fail_on_batch: None,
        }
    }

    /// Fail the n-th `write_batch` call (1-based); nothing from it is kept
    pub fn failing_on_batch(mut self, call: usize) -> Self {
        self.fail_on_batch = Some(call);
        self
    }

    /// Sink sharing this one's table contents but with no failure injected
    pub fn healthy(&self) -> Self {
        Self {
            fail_on_batch: None,
            ..self.clone()
        }
    }

    pub fn rows(&self, variant: TargetVariant) -> Vec<Vec<Option<String>>> {
        let state = self.state.lock().unwrap();
        match variant {
            TargetVariant::Zero => state.zero.clone(),
            TargetVariant::One => state.one.clone(),
        }
    }

    pub fn marked(&self) -> Vec<SourceKey> {
        self.state.lock().unwrap().marked.clone()
    }

    pub fn batches(&self) -> Vec<(TargetVariant, usize)> {
        self.state.lock().unwrap().batches.clone()
    }
}

#[async_trait]
impl TargetSink for MemorySink {
    async fn write_batch(
        &self,
        variant: TargetVariant,
        records: &[TargetRecord],
    ) -> DbResult<BatchOutcome> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        if self.fail_on_batch == Some(state.calls) {
            return Err(unavailable());
        }

        let keys = match variant {
            TargetVariant::Zero => self.zero_keys.clone(),
            TargetVariant::One => self.one_keys.clone(),
        };
        // Null key values match each other, like IS NOT DISTINCT FROM
        let key_of = |binds: &[Option<String>]| -> Vec<Option<String>> {
            keys.iter().map(|&i| binds[i].clone()).collect()
        };

        let mut outcome = BatchOutcome::default();
        for record in records {
            let table = match variant {
                TargetVariant::Zero => &mut state.zero,
                TargetVariant::One => &mut state.one,
            };
            let key = key_of(record.binds.as_slice());
            if !table.iter().any(|existing| key_of(existing.as_slice()) == key) {
                table.push(record.binds.clone());
                outcome.inserted += 1;
            }
        }

        if self.mark_processed {
            for record in records {
                state.marked.push(record.source_key.clone());
                outcome.marked += 1;
            }
        }

        state.batches.push((variant, records.len()));
        Ok(outcome)
    }
}

/// A complete in-memory store set
#[derive(Clone)]
pub struct MemoryStores {
    pub source: MemorySource,
    pub lookup: MemoryLookup,
    pub xref: MemoryXref,
    pub sink: MemorySink,
}

impl MemoryStores {
    pub fn new(plan: &TransferPlan, rows: Vec<SourceRow>) -> Self {
        Self {
            source: MemorySource::new(rows),
            lookup: MemoryLookup::default(),
            xref: MemoryXref::default(),
            sink: MemorySink::for_plan(plan),
        }
    }

    pub fn boxed(&self) -> TransferStores {
        TransferStores {
            source: Box::new(self.source.clone()),
            lookup: Box::new(self.lookup.clone()),
            xref: Box::new(self.xref.clone()),
            sink: Box::new(self.sink.clone()),
        }
    }

    pub fn orchestrator(&self, plan: &TransferPlan) -> TransferOrchestrator {
        TransferOrchestrator::new(plan.clone(), self.boxed())
    }
}

/// Default configuration with small page and batch sizes
pub fn small_config(page_size: u32, batch_size: usize) -> TransferConfig {
    TransferConfig {
        page_size,
        batch_size,
        ..Default::default()
    }
}

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL container with a connected pool
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
    connection_string: String,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432.tcp())
            .await
            .context("Failed to get container port")?;

        let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self {
            _container: container,
            pool,
            connection_string,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Run a batch of `;`-separated statements
    pub async fn execute_script(&self, script: &str) -> Result<()> {
        for statement in script.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to execute: {statement}"))?;
        }
        Ok(())
    }
}
