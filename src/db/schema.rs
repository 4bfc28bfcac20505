//! Database schema and migrations

use rusqlite::Connection;

use crate::error::StoreOp;
use crate::{Error, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &mut Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| Error::store(StoreOp::Connect, e))?;

    tx.execute_batch(
        r"
        -- One row per identity; channel_id is '' for user-scoped identities.
        -- The unique key is the identity lookup index and the upsert target.
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY,
            user_id TEXT NOT NULL,
            channel_id TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(user_id, channel_id)
        );

        -- Flat, append-only exchange log; id order is arrival order
        CREATE TABLE IF NOT EXISTS entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            day TEXT NOT NULL,
            user_message TEXT NOT NULL,
            bot_response TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_entries_conversation_day
            ON entries(conversation_id, day);

        PRAGMA user_version = 1;
        ",
    )
    .map_err(|e| Error::store(StoreOp::Connect, e))?;

    tx.commit().map_err(|e| Error::store(StoreOp::Connect, e))?;

    tracing::info!("migrated to schema v1");
    Ok(())
}
