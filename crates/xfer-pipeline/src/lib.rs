//! XFER transfer pipeline
//!
//! Moves account rows from a source table into one of two target tables:
//! paged extraction, cross-reference substitution, customer lookup against a
//! second database, discriminator routing and batched insert-if-absent writes.
//!
//! # Example
//!
//! ```no_run
//! use xfer_pipeline::config::TransferConfig;
//! use xfer_pipeline::db::create_pool;
//! use xfer_pipeline::orchestrator::{TransferOrchestrator, TransferStores};
//! use xfer_pipeline::plan::TransferPlan;
//! use xfer_pipeline::schema::SchemaCatalog;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TransferConfig::load(None)?;
//!
//!     let main_pool = create_pool(&config.database.main()).await?;
//!     let lookup_pool = create_pool(&config.database.lookup()).await?;
//!
//!     let catalog = SchemaCatalog::load(&config, &main_pool, &lookup_pool).await?;
//!     let plan = TransferPlan::with_schema(&config, &catalog)?;
//!     let stores = TransferStores::postgres(&plan, main_pool, lookup_pool);
//!     let summary = TransferOrchestrator::new(plan, stores).run().await?;
//!     println!("inserted {} rows", summary.inserted.total());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod batch;
pub mod config;
pub mod db;
pub mod error;
pub mod lookup;
pub mod mapping;
pub mod models;
pub mod orchestrator;
pub mod plan;
pub mod provision;
pub mod schema;
pub mod sink;
pub mod source;
pub mod sql;
pub mod summary;
pub mod xref;

pub use config::TransferConfig;
pub use error::{TransferError, TransferResult};
pub use orchestrator::{TransferOrchestrator, TransferState, TransferStores};
pub use plan::TransferPlan;
pub use schema::SchemaCatalog;
pub use summary::TransferSummary;
