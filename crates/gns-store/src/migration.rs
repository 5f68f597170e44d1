//! Database schema migrations for SQLite.
//!
//! Each migration transforms the schema from version N to N+1 inside one
//! transaction.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema. Idempotent.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Location-bearing data lives only inside sealed `record` blobs. Timestamps
/// and flags stay in the clear for ordering and filtering.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Store-wide metadata, including the key check value
        CREATE TABLE store_meta (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL
        );

        -- Public identity metadata (sealed JSON)
        CREATE TABLE identities (
            public_key BLOB PRIMARY KEY,     -- 32 bytes, Ed25519
            created_at INTEGER NOT NULL,     -- Unix ms
            record BLOB NOT NULL
        );

        -- Breadcrumb ledger, one row per breadcrumb
        CREATE TABLE breadcrumbs (
            identity BLOB NOT NULL,          -- 32 bytes, Ed25519
            seq INTEGER NOT NULL,            -- append position, 0-based
            id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,      -- Unix ms
            published INTEGER NOT NULL DEFAULT 0,
            record BLOB NOT NULL,            -- sealed JSON breadcrumb
            PRIMARY KEY (identity, seq),
            UNIQUE (identity, id)
        );

        -- Published epoch headers (already public, stored as JSON)
        CREATE TABLE epochs (
            identity BLOB NOT NULL,
            epoch_index INTEGER NOT NULL,
            epoch_hash BLOB NOT NULL UNIQUE, -- 32 bytes
            header TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (identity, epoch_index)
        );

        CREATE INDEX idx_breadcrumbs_pending ON breadcrumbs(identity, published, timestamp);
        CREATE INDEX idx_breadcrumbs_timestamp ON breadcrumbs(identity, timestamp);
        "#,
    )?;

    Ok(())
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
