//! Target writes
//!
//! A batch is written in its own transaction. Records are inserted in chunks,
//! one multi-row insert-if-absent statement per chunk, then the optional
//! mark-processed update runs for the same rows. The whole batch commits or
//! rolls back together.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

use crate::db::DbResult;
use crate::models::{TargetRecord, TargetVariant};
use crate::plan::{TransferPlan, VariantPlan};

/// Records per insert statement
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 500;

/// Bind parameters PostgreSQL accepts in one statement
const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Result of one committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// New target rows; records matching an existing key add nothing
    pub inserted: u64,
    /// Source rows flagged as processed
    pub marked: u64,
}

#[async_trait]
pub trait TargetSink: Send + Sync {
    /// Write and commit one variant's batch; all-or-nothing
    async fn write_batch(
        &self,
        variant: TargetVariant,
        records: &[TargetRecord],
    ) -> DbResult<BatchOutcome>;
}

/// [`TargetSink`] over the main PostgreSQL store
pub struct PgTargetSink {
    pool: PgPool,
    zero: VariantPlan,
    one: VariantPlan,
    mark_processed: Option<String>,
}

impl PgTargetSink {
    pub fn new(pool: PgPool, plan: &TransferPlan) -> Self {
        Self {
            pool,
            zero: plan.zero.clone(),
            one: plan.one.clone(),
            mark_processed: plan.mark_processed_sql.clone(),
        }
    }

    fn variant(&self, variant: TargetVariant) -> &VariantPlan {
        match variant {
            TargetVariant::Zero => &self.zero,
            TargetVariant::One => &self.one,
        }
    }

    async fn execute_batch(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        variant: TargetVariant,
        records: &[TargetRecord],
    ) -> DbResult<BatchOutcome> {
        let target = self.variant(variant);
        let chunk_size = insert_chunk_size(DEFAULT_INSERT_CHUNK_SIZE, target.binding.columns().len());
        let mut outcome = BatchOutcome::default();

        for chunk in records.chunks(chunk_size) {
            let insert_sql = target.insert_sql_for(chunk.len());
            let mut query = sqlx::query(&insert_sql);
            for value in chunk.iter().flat_map(|record| &record.binds) {
                query = query.bind(value.as_deref());
            }
            outcome.inserted += query.execute(&mut **tx).await?.rows_affected();
        }

        if let Some(mark_sql) = &self.mark_processed {
            for record in records {
                let key = &record.source_key;
                outcome.marked += sqlx::query(mark_sql)
                    .bind(key.customer_key.as_str())
                    .bind(key.routing_code.as_deref())
                    .bind(key.account_no.as_deref())
                    .execute(&mut **tx)
                    .await?
                    .rows_affected();
            }
        }

        Ok(outcome)
    }
}

/// Records per statement, kept under the bind parameter limit
pub fn insert_chunk_size(configured: usize, columns: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / columns.max(1);
    configured.min(by_params).max(1)
}

#[async_trait]
impl TargetSink for PgTargetSink {
    async fn write_batch(
        &self,
        variant: TargetVariant,
        records: &[TargetRecord],
    ) -> DbResult<BatchOutcome> {
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut tx = self.pool.begin().await?;

        match self.execute_batch(&mut tx, variant, records).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        variant = %variant,
                        error = %rollback_err,
                        "Rollback after failed batch also failed"
                    );
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_size_respects_bind_limit() {
        assert_eq!(insert_chunk_size(500, 8), 500);
        assert_eq!(insert_chunk_size(100_000, 8), 8_191);
        assert_eq!(insert_chunk_size(500, 70_000), 1);
        assert_eq!(insert_chunk_size(0, 8), 1);
    }
}
