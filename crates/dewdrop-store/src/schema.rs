//! Database schema.

use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Create the schema on a fresh database and record its version.
pub fn initialize(conn: &Connection) -> Result<()> {
    match schema_version(conn)? {
        0 => {
            create_v1(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)?;
            info!("Created feed database schema v{}", SCHEMA_VERSION);
        }
        SCHEMA_VERSION => {}
        newer => warn!(
            "Database schema v{} is newer than supported v{}",
            newer, SCHEMA_VERSION
        ),
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }
    Ok(conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

// device_id is TEXT because identifiers may exceed i64.
fn create_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS feeds (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            received_at INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            indoor_temperature REAL NOT NULL,
            indoor_humidity REAL NOT NULL,
            indoor_dewpoint REAL NOT NULL,
            outdoor_dewpoint REAL NOT NULL,
            dewpoint_delta REAL NOT NULL,
            open_windows INTEGER NOT NULL,
            humidity_alert INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_feeds_received_at ON feeds(received_at);
        "#,
    )?;
    Ok(())
}
