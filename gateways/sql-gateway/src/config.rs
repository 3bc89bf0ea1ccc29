//! Configuration for the SQL gateway
//!
//! Loaded once at startup. The database location is mandatory: a gateway
//! without a connection string refuses to start.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};

/// SQL gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// Database connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Result and schema size limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string (`sqlite://path`, `sqlite:path` or a bare path).
    /// Overridden by the `DATABASE_URL` environment variable.
    #[serde(default)]
    pub url: Option<String>,

    /// Maximum number of live connections
    /// Default: 4
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long a call waits for a free connection before failing
    /// Default: 5000
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Maximum statement execution time in seconds
    /// Default: 30
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,

    /// SQLite busy timeout for locked database files
    /// Default: 100
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Size limits applied to queries and schema summaries
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Row bound appended to queries without an explicit LIMIT
    #[serde(default = "default_row_limit")]
    pub default_row_limit: u32,

    /// Explicit LIMITs above this are clamped down (0 disables clamping)
    #[serde(default = "default_max_row_limit")]
    pub max_row_limit: u32,

    /// Maximum tables listed in a schema summary
    #[serde(default = "default_max_tables")]
    pub max_tables: usize,

    /// Maximum columns listed per table in a schema summary
    #[serde(default = "default_max_columns")]
    pub max_columns_per_table: usize,
}

fn default_pool_size() -> usize {
    4
}

fn default_acquire_timeout_ms() -> u64 {
    5000
}

fn default_statement_timeout() -> u64 {
    30
}

fn default_busy_timeout_ms() -> u64 {
    100
}

fn default_row_limit() -> u32 {
    200
}

fn default_max_row_limit() -> u32 {
    10_000
}

fn default_max_tables() -> usize {
    40
}

fn default_max_columns() -> usize {
    60
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            statement_timeout_secs: default_statement_timeout(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_row_limit: default_row_limit(),
            max_row_limit: default_max_row_limit(),
            max_tables: default_max_tables(),
            max_columns_per_table: default_max_columns(),
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Resolve the connection string to a database file path
    pub fn database_path(&self) -> GatewayResult<PathBuf> {
        let url = self.url.as_deref().ok_or_else(|| {
            GatewayError::config("DATABASE_URL is not set and no database.url is configured")
        })?;
        parse_database_url(url)
    }
}

impl LimitsConfig {
    /// Clamp ceiling for explicit LIMIT clauses, if enabled
    pub fn row_cap(&self) -> Option<u32> {
        (self.max_row_limit > 0).then_some(self.max_row_limit)
    }
}

/// Parse a connection string into the SQLite file it names
pub fn parse_database_url(url: &str) -> GatewayResult<PathBuf> {
    let url = url.trim();
    if url.is_empty() {
        return Err(GatewayError::config("Database URL is empty"));
    }

    let path = if let Some(rest) = url.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = url.strip_prefix("sqlite:") {
        rest
    } else if let Some((scheme, _)) = url.split_once("://") {
        return Err(GatewayError::config(format!(
            "Unsupported database scheme '{}' (only sqlite is supported)",
            scheme
        )));
    } else {
        url
    };

    if path.is_empty() {
        return Err(GatewayError::config(format!(
            "Database URL '{}' has no path",
            url
        )));
    }
    if path == ":memory:" || path.starts_with(":memory:?") {
        return Err(GatewayError::config(
            "In-memory databases cannot be shared through a read-only pool",
        ));
    }

    Ok(PathBuf::from(path))
}

impl GatewayConfig {
    /// Load configuration from file and environment
    ///
    /// Looks for config in:
    /// 1. `SQL_GATEWAY_CONFIG_PATH` environment variable
    /// 2. `~/.binks/sql-gateway.toml`
    ///
    /// `DATABASE_URL` overrides the configured url. A missing file falls back
    /// to defaults; a missing database url is fatal.
    pub fn load() -> GatewayResult<Self> {
        Self::load_from(
            Self::default_path().as_deref(),
            std::env::var("DATABASE_URL").ok(),
        )
    }

    /// Config file location when none is given explicitly
    pub fn default_path() -> Option<PathBuf> {
        std::env::var("SQL_GATEWAY_CONFIG_PATH")
            .map(PathBuf::from)
            .ok()
            .or_else(|| dirs::home_dir().map(|home| home.join(".binks").join("sql-gateway.toml")))
    }

    /// Load from an explicit file path and database url override
    pub fn load_from(path: Option<&Path>, database_url: Option<String>) -> GatewayResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from: {}", path.display());
                let content = std::fs::read_to_string(path).map_err(|e| {
                    GatewayError::config(format!("Failed to read config from {:?}: {}", path, e))
                })?;
                toml::from_str::<Self>(&content).map_err(|e| {
                    GatewayError::config(format!("Failed to parse config from {:?}: {}", path, e))
                })?
            }
            _ => {
                tracing::info!("Config file not found, using defaults");
                Self::default()
            }
        };

        // DATABASE_URL from environment (highest priority)
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            config.database.url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    /// Create a config pointing to a specific database file
    pub fn with_database(path: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.database.url = Some(format!("sqlite://{}", path.as_ref().display()));
        config
    }

    /// Check the settings that must hold before the gateway starts
    pub fn validate(&self) -> GatewayResult<()> {
        self.database.database_path()?;
        if self.database.pool_size == 0 {
            return Err(GatewayError::config("database.pool_size must be at least 1"));
        }
        if self.limits.default_row_limit == 0 {
            return Err(GatewayError::config("limits.default_row_limit must be at least 1"));
        }
        if let Some(cap) = self.limits.row_cap() {
            if self.limits.default_row_limit > cap {
                return Err(GatewayError::config(format!(
                    "limits.default_row_limit ({}) exceeds limits.max_row_limit ({})",
                    self.limits.default_row_limit, cap
                )));
            }
        }
        Ok(())
    }
}
