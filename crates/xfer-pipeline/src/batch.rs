//! Per-variant accumulation of target records between flushes

use crate::models::{TargetRecord, TargetVariant};

/// Most records reserved up front per variant; batches grow past it on demand
const MAX_PREALLOCATED: usize = 1_024;

#[derive(Debug)]
pub struct BatchAccumulator {
    threshold: usize,
    zero: Vec<TargetRecord>,
    one: Vec<TargetRecord>,
}

impl BatchAccumulator {
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            threshold,
            zero: Vec::with_capacity(threshold.min(MAX_PREALLOCATED)),
            one: Vec::with_capacity(threshold.min(MAX_PREALLOCATED)),
        }
    }

    /// Queue a record; returns true when its variant's batch is full
    pub fn push(&mut self, record: TargetRecord) -> bool {
        let threshold = self.threshold;
        let batch = self.batch_mut(record.variant);
        batch.push(record);
        batch.len() >= threshold
    }

    pub fn pending(&self, variant: TargetVariant) -> usize {
        match variant {
            TargetVariant::Zero => self.zero.len(),
            TargetVariant::One => self.one.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.zero.is_empty() && self.one.is_empty()
    }

    /// Remove and return everything queued for `variant`
    pub fn take(&mut self, variant: TargetVariant) -> Vec<TargetRecord> {
        let capacity = self.threshold.min(MAX_PREALLOCATED);
        std::mem::replace(self.batch_mut(variant), Vec::with_capacity(capacity))
    }

    fn batch_mut(&mut self, variant: TargetVariant) -> &mut Vec<TargetRecord> {
        match variant {
            TargetVariant::Zero => &mut self.zero,
            TargetVariant::One => &mut self.one,
        }
    }
}
