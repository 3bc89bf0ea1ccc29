//! Process initialization utilities
//!
//! Provides the standardized tracing setup shared by every gateway binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging for a gateway binary
///
/// Sets up logging to stderr (stdout carries command output) with:
/// - Formatted output without ANSI colors (for clean logs)
/// - Environment-based filtering via RUST_LOG
/// - Default log level of `info` for the specified crate
///
/// Set `LOG_FORMAT=json` for structured JSON output (useful for production/log aggregation).
/// Default is human-readable text output.
///
/// # Arguments
///
/// * `crate_name` - The name of the gateway crate (e.g., "sql_gateway")
///
/// # Example
///
/// ```rust,ignore
/// gateway_common::init_tracing("sql_gateway")?;
/// ```
pub fn init_tracing(crate_name: &str) -> anyhow::Result<()> {
    init_tracing_with_level(crate_name, "info")
}

/// Same as [`init_tracing`] but with an explicit default level for the crate
///
/// Used by binaries that map `-v` flags onto a level.
pub fn init_tracing_with_level(crate_name: &str, level: &str) -> anyhow::Result<()> {
    let directive = format!("{}={}", crate_name, level);
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(false),
            )
            .try_init()?;
    }

    Ok(())
}

/// Map a `-v` count onto a tracing level name (default is warn)
pub fn verbosity_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Subscriber installation is process-global, so only the pure helpers are tested here.

    #[test]
    fn test_verbosity_level() {
        assert_eq!(verbosity_level(0), "warn");
        assert_eq!(verbosity_level(1), "info");
        assert_eq!(verbosity_level(2), "debug");
        assert_eq!(verbosity_level(9), "trace");
    }
}
