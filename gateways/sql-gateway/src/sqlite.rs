//! SQLite connector for the gateway pool

use anyhow::Context;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::GatewayResult;
use crate::pool::Pool;

pub type ConnectionPool = Pool<Connection>;

/// Open a connection the engine itself will refuse to write through
pub fn open_read_only(path: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags)
        .with_context(|| format!("Failed to open database at {:?}", path))?;
    conn.busy_timeout(busy_timeout)?;
    conn.pragma_update(None, "query_only", true)?;
    Ok(conn)
}

/// Cheap liveness check run before reusing an idle connection
pub fn ping(conn: &Connection) -> bool {
    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        .is_ok()
}

/// Build the read-only pool described by the database config
///
/// Fails only on configuration problems; connections are opened lazily.
pub fn connect_pool(config: &DatabaseConfig) -> GatewayResult<Arc<ConnectionPool>> {
    let path: PathBuf = config.database_path()?;
    let busy_timeout = config.busy_timeout();
    tracing::info!(
        "Creating read-only pool for {:?} (max {} connections)",
        path,
        config.pool_size
    );
    Ok(Pool::with_health_check(
        config.pool_size,
        move || open_read_only(&path, busy_timeout),
        ping,
    ))
}
