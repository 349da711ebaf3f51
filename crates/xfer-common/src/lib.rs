//! XFER Common Library
//!
//! Shared utilities and error handling for the account transfer workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`XferError`] and the [`Result`] alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Names**: identifier validation, column-list parsing and test-table
//!   suffix normalisation
//!
//! # Example
//!
//! ```no_run
//! use xfer_common::names::{parse_column_list, with_suffix};
//!
//! fn main() -> xfer_common::Result<()> {
//!     let columns = parse_column_list("userid, brchid, accountno")?;
//!     assert_eq!(columns.len(), 3);
//!     assert_eq!(with_suffix("TRANSFERACCOUNT_TEST", "_TEST"), "TRANSFERACCOUNT_TEST");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod names;

// Re-export commonly used types
pub use error::{Result, XferError};
