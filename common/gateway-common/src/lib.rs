//! Gateway Common - Shared utilities for query gateways
//!
//! This crate provides common functionality used across gateway crates:
//!
//! - **Initialization**: [`init_tracing`] for standardized logging to stderr
//! - **Results**: [`Envelope`] and helpers for the `{ok, ...}` response shape
//! - **Errors**: [`FailureKind`] for tagging failures with a stable category
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway_common::{failure, success, to_json_pretty};
//!
//! gateway_common::init_tracing("my_gateway")?;
//!
//! let response = match do_work() {
//!     Ok(data) => success(data),
//!     Err(e) => failure(&e),
//! };
//! println!("{}", to_json_pretty(&response));
//! ```

pub mod error;
pub mod init;
pub mod result;

// Re-export commonly used items at crate root
pub use error::FailureKind;
pub use init::{init_tracing, init_tracing_with_level, verbosity_level};
pub use result::{failure, success, to_json_pretty, Envelope};
