//! Connection setup and schema migrations for [`SqliteStore`](crate::SqliteStore).
//!
//! The schema lives under `migrations/` and is versioned through SQLite's
//! `user_version` pragma by `rusqlite_migration`.

use std::time::Duration;

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};
use tracing::debug;

use crate::error::StorageError;

/// How long a writer waits on a database locked by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial_schema.sql"))])
}

/// Opens (or creates) the artist database at `path`.
pub fn open_database(path: &str) -> Result<Connection, StorageError> {
    prepare(Connection::open(path)?)
}

/// Opens a private in-memory artist database.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    prepare(Connection::open_in_memory()?)
}

/// The schema version recorded in the database.
pub fn schema_version(conn: &Connection) -> Result<u32, StorageError> {
    let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn prepare(mut conn: Connection) -> Result<Connection, StorageError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    migrations()
        .to_latest(&mut conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    debug!(version = schema_version(&conn)?, "artist schema ready");

    Ok(conn)
}
