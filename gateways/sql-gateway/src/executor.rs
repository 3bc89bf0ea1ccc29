//! Query executor
//!
//! Owns the connection pool and runs one sanitized statement per call:
//! acquire → sanitize → execute → normalize rows → release. The connection
//! guard is dropped on every exit path, including validation failures.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use rusqlite::types::{ToSql, Value as SqlValue};
use rusqlite::{Connection, ErrorCode};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{GatewayConfig, LimitsConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::introspector::{describe_schema, SchemaLimits, SchemaSummary};
use crate::normalizer::{normalize, NativeValue};
use crate::pool::Pooled;
use crate::sanitizer::{sanitize_with_cap, SafeQuery};
use crate::sqlite::{connect_pool, ConnectionPool};

/// SQLite VM instructions between deadline checks
const PROGRESS_OPS: i32 = 1000;

/// Column name → normalized scalar, in result column order
pub type ResultRow = IndexMap<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub rows: Vec<ResultRow>,
    pub row_count: usize,
}

/// Per-call knobs for [`QueryExecutor::execute`]
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Row bound to append instead of the configured default
    pub limit: Option<u32>,
    /// Named parameters, bound as `:name`
    pub params: Option<Map<String, Value>>,
    /// Caller deadline; never extends the configured statement timeout
    pub timeout: Option<Duration>,
}

/// A finished execution: the statement that ran and what it returned
#[derive(Debug, Clone)]
pub struct Execution {
    pub query: SafeQuery,
    pub result: ResultSet,
}

pub struct QueryExecutor {
    pool: Arc<ConnectionPool>,
    acquire_timeout: Duration,
    statement_timeout: Option<Duration>,
    limits: LimitsConfig,
}

impl QueryExecutor {
    pub fn new(pool: Arc<ConnectionPool>, config: &GatewayConfig) -> Self {
        let statement_timeout = config.database.statement_timeout();
        Self {
            pool,
            acquire_timeout: config.database.acquire_timeout(),
            statement_timeout: (!statement_timeout.is_zero()).then_some(statement_timeout),
            limits: config.limits.clone(),
        }
    }

    /// Build the pool described by `config` and an executor over it
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let pool = connect_pool(&config.database)?;
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    fn acquire(&self) -> GatewayResult<Pooled<Connection>> {
        Ok(self.pool.acquire(self.acquire_timeout)?)
    }

    /// Summarize the schema visible on a pooled connection
    pub fn describe_schema(&self) -> GatewayResult<SchemaSummary> {
        let conn = self.acquire()?;
        describe_schema(
            &*conn,
            SchemaLimits {
                max_tables: self.limits.max_tables,
                max_columns_per_table: self.limits.max_columns_per_table,
            },
        )
    }

    /// Sanitize and run `candidate`, returning its normalized rows
    pub fn execute(&self, candidate: &str, options: &QueryOptions) -> GatewayResult<Execution> {
        let conn = self.acquire()?;

        let cap = self.limits.row_cap();
        let default_limit = match (options.limit, cap) {
            (Some(limit), Some(cap)) => limit.clamp(1, cap),
            (Some(limit), None) => limit.max(1),
            (None, _) => self.limits.default_row_limit,
        };
        let query = sanitize_with_cap(candidate, default_limit, cap).map_err(|e| {
            tracing::warn!("Rejected query: {}", e);
            GatewayError::from(e)
        })?;

        let params = bind_params(options.params.as_ref())?;
        let deadline = match (options.timeout, self.statement_timeout) {
            (Some(caller), Some(configured)) => Some(caller.min(configured)),
            (caller, configured) => caller.or(configured),
        };

        let started = Instant::now();
        let result = run_statement(&conn, &query, &params, deadline)?;
        tracing::info!(
            rows = result.row_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Executed query"
        );

        Ok(Execution { query, result })
    }
}

fn bind_params(params: Option<&Map<String, Value>>) -> GatewayResult<Vec<(String, SqlValue)>> {
    let Some(params) = params else {
        return Ok(Vec::new());
    };
    params
        .iter()
        .map(|(name, value)| {
            let name = if name.starts_with([':', '@', '$']) {
                name.clone()
            } else {
                format!(":{}", name)
            };
            let value = match value {
                Value::Null => SqlValue::Null,
                Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => SqlValue::Integer(i),
                    None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
                },
                Value::String(s) => SqlValue::Text(s.clone()),
                Value::Array(_) | Value::Object(_) => {
                    return Err(GatewayError::execution(format!(
                        "unsupported parameter {}: only scalar values can be bound",
                        name
                    )))
                }
            };
            Ok((name, value))
        })
        .collect()
}

fn run_statement(
    conn: &Connection,
    query: &SafeQuery,
    params: &[(String, SqlValue)],
    deadline: Option<Duration>,
) -> GatewayResult<ResultSet> {
    if let Some(limit) = deadline {
        let expires = Instant::now() + limit;
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= expires));
    }

    let result = collect_rows(conn, query, params);

    if deadline.is_some() {
        conn.progress_handler(0, None::<fn() -> bool>);
    }

    result.map_err(|e| {
        let interrupted = matches!(
            &e,
            rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::OperationInterrupted
        );
        match deadline {
            Some(limit) if interrupted => GatewayError::execution(format!(
                "statement interrupted: deadline of {}ms exceeded",
                limit.as_millis()
            )),
            _ => GatewayError::from(e),
        }
    })
}

fn collect_rows(
    conn: &Connection,
    query: &SafeQuery,
    params: &[(String, SqlValue)],
) -> rusqlite::Result<ResultSet> {
    let mut stmt = conn.prepare(query.as_str())?;
    let (names, decl_types): (Vec<String>, Vec<Option<String>>) = stmt
        .columns()
        .iter()
        .map(|c| (c.name().to_string(), c.decl_type().map(str::to_string)))
        .unzip();
    let keys = unique_keys(names);

    let bound: Vec<(&str, &dyn ToSql)> = params
        .iter()
        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
        .collect();

    let row_bound = usize::try_from(query.row_bound()).unwrap_or(usize::MAX);
    let mut rows = stmt.query(bound.as_slice())?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= row_bound {
            tracing::warn!(row_bound, "Statement returned more rows than its bound; truncating");
            break;
        }
        let mut record = ResultRow::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let native = NativeValue::from_sqlite(row.get_ref(i)?, decl_types[i].as_deref());
            record.insert(key.clone(), normalize(native));
        }
        out.push(record);
    }

    Ok(ResultSet {
        row_count: out.len(),
        rows: out,
    })
}

/// Suffix repeated column names (`id`, `id_2`, ...) so row keys stay unique
fn unique_keys(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    names
        .into_iter()
        .map(|name| {
            let mut key = name.clone();
            let mut n = 2;
            while seen.contains(&key) {
                key = format!("{}_{}", name, n);
                n += 1;
            }
            seen.insert(key.clone());
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use serde_json::json;
    use std::path::Path;

    fn fixture(dir: &Path) -> GatewayConfig {
        let path = dir.join("app.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT, active BOOLEAN, balance DECIMAL(10,2));
             INSERT INTO users VALUES (1, 'ada', 1, '10.5');
             INSERT INTO users VALUES (2, 'brian', 0, '7.25');
             INSERT INTO users VALUES (3, 'cleo', 1, NULL);",
        )
        .unwrap();
        GatewayConfig::with_database(&path)
    }

    fn executor(config: &GatewayConfig) -> QueryExecutor {
        QueryExecutor::from_config(config).unwrap()
    }

    #[test]
    fn test_execute_normalizes_rows() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        let run = exec
            .execute("SELECT id, name, active, balance FROM users ORDER BY id", &QueryOptions::default())
            .unwrap();
        assert_eq!(run.query.as_str(), "SELECT id, name, active, balance FROM users ORDER BY id LIMIT 200");
        assert_eq!(run.result.row_count, 3);
        assert_eq!(
            serde_json::to_value(&run.result.rows[0]).unwrap(),
            json!({"id": 1, "name": "ada", "active": true, "balance": 10.5})
        );
        assert_eq!(run.result.rows[2]["balance"], Value::Null);
    }

    #[test]
    fn test_row_order_and_column_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        let run = exec
            .execute("SELECT name, id FROM users ORDER BY id DESC", &QueryOptions::default())
            .unwrap();
        let names: Vec<&Value> = run.result.rows.iter().map(|r| &r["name"]).collect();
        assert_eq!(names, vec![&json!("cleo"), &json!("brian"), &json!("ada")]);
        let keys: Vec<&String> = run.result.rows[0].keys().collect();
        assert_eq!(keys, vec!["name", "id"]);
    }

    #[test]
    fn test_limit_override_and_cap() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.limits.max_row_limit = 2;
        config.limits.default_row_limit = 2;
        let exec = executor(&config);

        let run = exec
            .execute(
                "SELECT id FROM users",
                &QueryOptions {
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(run.result.row_count, 1);
        assert!(run.query.default_limit_applied());

        let run = exec
            .execute("SELECT id FROM users LIMIT 500", &QueryOptions::default())
            .unwrap();
        assert_eq!(run.query.as_str(), "SELECT id FROM users LIMIT 2");
        assert_eq!(run.result.row_count, 2);
    }

    #[test]
    fn test_validation_failure_releases_connection() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        let err = exec
            .execute("DELETE FROM users", &QueryOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::NotASelect)
        ));
        assert_eq!(exec.pool().idle_count(), exec.pool().in_flight());
    }

    #[test]
    fn test_engine_errors_become_execution_errors() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        let err = exec
            .execute("SELECT * FROM missing_table", &QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, GatewayError::Execution { .. }));
        assert!(err.to_string().contains("missing_table"));

        let err = exec
            .execute("SELECT FROM users", &QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, GatewayError::Execution { .. }));
    }

    #[test]
    fn test_comments_cannot_lift_the_row_bound() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.limits.default_row_limit = 1;
        config.limits.max_row_limit = 2;
        let exec = executor(&config);

        for sql in ["SELECT id FROM users -- all rows", "SELECT id FROM users /* LIMIT 5 */"] {
            let err = exec.execute(sql, &QueryOptions::default()).unwrap_err();
            assert!(
                matches!(err, GatewayError::Validation(ValidationError::CommentNotAllowed)),
                "{}",
                sql
            );
        }
        assert_eq!(exec.pool().idle_count(), exec.pool().in_flight());
    }

    #[test]
    fn test_row_bound_enforced_while_reading() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        // The LIMIT sits in a literal, so the statement itself is unbounded.
        let run = exec
            .execute(
                "SELECT id FROM users WHERE name <> 'LIMIT 2' ORDER BY id",
                &QueryOptions::default(),
            )
            .unwrap();
        assert!(!run.query.default_limit_applied());
        assert_eq!(run.query.row_bound(), 2);
        assert_eq!(run.result.row_count, 2);
        assert_eq!(run.result.rows[1]["id"], json!(2));
    }

    #[test]
    fn test_named_params() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        let mut params = Map::new();
        params.insert("name".to_string(), json!("brian"));
        let run = exec
            .execute(
                "SELECT id FROM users WHERE name = :name",
                &QueryOptions {
                    params: Some(params),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(run.result.rows, vec![ResultRow::from([("id".to_string(), json!(2))])]);

        let mut params = Map::new();
        params.insert("ids".to_string(), json!([1, 2]));
        let err = exec
            .execute(
                "SELECT id FROM users WHERE id = :ids",
                &QueryOptions {
                    params: Some(params),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("unsupported parameter"));
    }

    #[test]
    fn test_duplicate_columns_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        let run = exec
            .execute(
                "SELECT a.id, b.id, a.id AS id_2 FROM users a JOIN users b ON a.id = b.id WHERE a.id = 1",
                &QueryOptions::default(),
            )
            .unwrap();
        let keys: Vec<&String> = run.result.rows[0].keys().collect();
        assert_eq!(keys, vec!["id", "id_2", "id_2_2"]);
    }

    #[test]
    fn test_deadline_interrupts_statement() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        {
            let conn = Connection::open(dir.path().join("app.db")).unwrap();
            conn.execute_batch(
                "CREATE TABLE big (n INTEGER);
                 WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 2000)
                 INSERT INTO big SELECT n FROM seq;",
            )
            .unwrap();
        }
        let exec = executor(&config);

        let err = exec
            .execute(
                "SELECT count(*) FROM big a, big b, big c",
                &QueryOptions {
                    timeout: Some(Duration::from_millis(20)),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("deadline"), "{}", err);

        // The connection went back to the pool and still works.
        let run = exec
            .execute("SELECT count(*) AS n FROM big", &QueryOptions::default())
            .unwrap();
        assert_eq!(run.result.rows[0]["n"], json!(2000));
    }

    #[test]
    fn test_describe_schema_through_pool() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(&fixture(dir.path()));

        let summary = exec.describe_schema().unwrap();
        assert_eq!(
            summary.to_string(),
            "- users (columns: id:INTEGER, name:TEXT, active:BOOLEAN, balance:DECIMAL(10,2))"
        );
    }

    #[test]
    fn test_unique_keys() {
        let keys = unique_keys(vec!["a".into(), "b".into(), "a".into(), "a".into()]);
        assert_eq!(keys, vec!["a", "b", "a_2", "a_3"]);
    }
}
