//! Gateway facade
//!
//! The two inbound operations, in their transport-neutral shape:
//!
//! - describe schema → plain-text summary, one line per table
//! - run safe query → `{ok: true, rows, row_count, ...}` or `{ok: false, error, kind}`
//!
//! Database work is blocking, so each call runs on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use gateway_common::{failure, success, Envelope, FailureKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::executor::{QueryExecutor, QueryOptions, ResultRow};
use crate::introspector::SchemaSummary;

/// Input of the run-safe-query operation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunQueryRequest {
    /// Candidate SQL. Only SELECT statements are accepted.
    pub sql: String,
    /// Row bound to apply when the query has no LIMIT of its own
    #[serde(default)]
    pub limit: Option<u32>,
    /// Named parameters (`{"name": "ada"}` binds `:name`)
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    /// Per-call deadline in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RunQueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    fn options(&self) -> QueryOptions {
        QueryOptions {
            limit: self.limit,
            params: self.params.clone(),
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Payload of a successful query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRows {
    pub rows: Vec<ResultRow>,
    pub row_count: usize,
    /// The statement that actually ran
    pub sql: String,
    /// Whether the gateway supplied the LIMIT
    pub limit_applied: bool,
}

pub type QueryResponse = Envelope<QueryRows>;

/// Safe query gateway over one connection pool
#[derive(Clone)]
pub struct SqlGateway {
    executor: Arc<QueryExecutor>,
}

impl SqlGateway {
    /// Create a gateway from validated configuration
    ///
    /// Connections are opened on first use, so this only fails on
    /// configuration problems.
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        config.validate()?;
        Ok(Self {
            executor: Arc::new(QueryExecutor::from_config(config)?),
        })
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    async fn blocking<T, F>(&self, work: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&QueryExecutor) -> GatewayResult<T> + Send + 'static,
    {
        let executor = Arc::clone(&self.executor);
        tokio::task::spawn_blocking(move || work(&executor))
            .await
            .map_err(|e| GatewayError::execution(format!("worker task failed: {}", e)))?
    }

    /// Structured schema summary
    pub async fn schema_summary(&self) -> GatewayResult<SchemaSummary> {
        self.blocking(|executor| executor.describe_schema()).await
    }

    /// Schema summary rendered as text for a prompting collaborator
    pub async fn describe_schema(&self) -> GatewayResult<String> {
        let summary = self.schema_summary().await?;
        tracing::info!("Described {} tables", summary.len());
        Ok(summary.to_string())
    }

    /// Validate, run and normalize one candidate query
    ///
    /// Never fails: every outcome is reported through the envelope.
    pub async fn run_safe_query(&self, request: RunQueryRequest) -> QueryResponse {
        let options = request.options();
        let sql = request.sql;
        let outcome = self
            .blocking(move |executor| executor.execute(&sql, &options))
            .await;

        match outcome {
            Ok(execution) => success(QueryRows {
                row_count: execution.result.row_count,
                rows: execution.result.rows,
                limit_applied: execution.query.default_limit_applied(),
                sql: execution.query.into_inner(),
            }),
            Err(e) => {
                if e.is_caller_error() {
                    tracing::debug!("Query rejected: {}", e);
                } else {
                    tracing::error!("Query failed: {}", e);
                }
                failure(&e)
            }
        }
    }

    /// Close the pool; later calls fail with an execution error
    pub fn shutdown(&self) {
        self.executor.pool().close();
    }
}
