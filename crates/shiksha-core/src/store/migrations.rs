//! Schema versioning.
//!
//! The version lives in `PRAGMA user_version`. Opening an already current
//! database is a no-op; newer databases are refused.

use rusqlite::Connection;
use tracing::info;

use super::{schema, Result, StoreError};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Bring the database up to `SCHEMA_VERSION`.
pub fn run(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current > SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database version {} is newer than supported {}",
            current, SCHEMA_VERSION
        )));
    }

    if current == 0 {
        info!(version = SCHEMA_VERSION, "Creating local store schema");
        conn.execute_batch(&schema::schema_v1())?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        return Ok(());
    }

    for version in (current + 1)..=SCHEMA_VERSION {
        info!(version, "Migrating local store");
        run_migration(conn, version)?;
        conn.pragma_update(None, "user_version", version)?;
    }

    Ok(())
}

fn run_migration(_conn: &Connection, version: u32) -> Result<()> {
    match version {
        _ => Err(StoreError::Migration(format!("unknown migration version {}", version))),
    }
}
