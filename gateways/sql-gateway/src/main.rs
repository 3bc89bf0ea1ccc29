//! SQL Gateway CLI
//!
//! One-shot access to the gateway operations.
//!
//! Usage:
//!   sql-gateway schema
//!   sql-gateway query "SELECT * FROM users" --limit 20
//!
//! The database comes from `--database-url`, `DATABASE_URL`, or the config
//! file (`SQL_GATEWAY_CONFIG_PATH`, default `~/.binks/sql-gateway.toml`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use sql_gateway::{GatewayConfig, RunQueryRequest, SqlGateway};

#[derive(Parser)]
#[command(name = "sql-gateway")]
#[command(about = "Run read-only, row-bounded SQL against a database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database connection string (sqlite://path or a file path)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Config file path
    #[arg(long, env = "SQL_GATEWAY_CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the schema summary (one line per table)
    Schema,
    /// Validate and run a SELECT query, printing the JSON response
    Query {
        /// Candidate SQL
        sql: String,
        /// Row bound applied when the query has no LIMIT
        #[arg(long)]
        limit: Option<u32>,
        /// Abort the statement after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Named parameters as a JSON object, e.g. '{"name": "ada"}'
        #[arg(long)]
        params: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    gateway_common::init_tracing_with_level(
        "sql_gateway",
        gateway_common::verbosity_level(cli.verbose),
    )?;

    let config_path = cli.config.clone().or_else(GatewayConfig::default_path);
    let config = GatewayConfig::load_from(config_path.as_deref(), cli.database_url.clone())
        .context("Failed to load gateway configuration")?;
    let gateway = SqlGateway::new(&config)?;

    let succeeded = match cli.command {
        Commands::Schema => {
            let summary = gateway.describe_schema().await?;
            println!("{}", summary);
            true
        }
        Commands::Query {
            sql,
            limit,
            timeout_ms,
            params,
        } => {
            let params = params
                .map(|raw| serde_json::from_str(&raw).context("--params must be a JSON object"))
                .transpose()?;
            let request = RunQueryRequest {
                sql,
                limit,
                params,
                timeout_ms,
            };
            let response = gateway.run_safe_query(request).await;
            println!("{}", gateway_common::to_json_pretty(&response));
            response.is_ok()
        }
    };

    gateway.shutdown();

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
