//! Pipeline errors
//!
//! Configuration problems fail before any connection is opened. Store errors
//! are never retried: they abort the run and carry the position reached.
//! Data-quality skips are not errors at all (see [`crate::summary::SkipReason`]).

use std::fmt;

use thiserror::Error;
use xfer_common::XferError;

use crate::db::DbError;
use crate::mapping::MappingError;
use crate::source::PageWindow;

pub type TransferResult<T> = Result<T, TransferError>;

/// What the pipeline was doing when a store call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadingPage,
    ResolvingXref,
    LookingUpCustomer,
    FlushingBatch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::ReadingPage => "reading page",
            Stage::ResolvingXref => "resolving cross-reference",
            Stage::LookingUpCustomer => "looking up customer",
            Stage::FlushingBatch => "flushing batch",
        })
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Config(#[from] XferError),

    #[error("Field mapping error for target '{variant}': {source}")]
    Mapping {
        variant: &'static str,
        #[source]
        source: MappingError,
    },

    #[error(
        "Data access failed while {stage} in window {window} \
         ({processed} rows processed, {committed} committed): {source}"
    )]
    DataAccess {
        stage: Stage,
        window: PageWindow,
        processed: u64,
        committed: u64,
        #[source]
        source: DbError,
    },

    #[error("Failed to read column types of '{table}': {source}")]
    Schema {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Failed to provision test table '{table}': {source}")]
    Provisioning {
        table: String,
        #[source]
        source: DbError,
    },
}

impl TransferError {
    pub fn mapping(variant: &'static str, source: MappingError) -> Self {
        Self::Mapping { variant, source }
    }

    /// True for errors raised before any store was touched
    pub fn is_config(&self) -> bool {
        matches!(self, TransferError::Config(_) | TransferError::Mapping { .. })
    }
}
