//! SQL Gateway Library
//!
//! Mediates between untrusted SQL (from a language model or any other
//! caller) and a relational database. Only read-only, row-bounded
//! statements ever reach a connection.
//!
//! - [`sanitizer`]: lexical validation into a [`SafeQuery`]
//! - [`normalizer`]: driver values to JSON scalars
//! - [`introspector`]: bounded schema summaries
//! - [`executor`]: pooled, deadline-aware execution
//! - [`gateway`]: async facade exposing the inbound operations
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use sql_gateway::{GatewayConfig, RunQueryRequest, SqlGateway};
//!
//! let gateway = SqlGateway::new(&GatewayConfig::load()?)?;
//! let schema = gateway.describe_schema().await?;
//! let response = gateway.run_safe_query(RunQueryRequest::new("SELECT * FROM users")).await;
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod introspector;
pub mod normalizer;
pub mod pool;
pub mod sanitizer;
pub mod sqlite;

// Re-export main gateway types
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult, ValidationError};
pub use gateway::{QueryResponse, QueryRows, RunQueryRequest, SqlGateway};

// Re-export building blocks for direct API usage
pub use executor::{QueryExecutor, QueryOptions, ResultRow, ResultSet};
pub use introspector::{describe_schema, SchemaSummary, TableColumns, TableDescriptor};
pub use normalizer::{normalize, NativeValue};
pub use sanitizer::{sanitize, sanitize_with_cap, SafeQuery};
