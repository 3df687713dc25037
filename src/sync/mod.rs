//! Push/pull replication over the remote HTTP backend.
//!
//! Two engines share the shape: explicit [`connect`](memory::MemorySyncEngine::connect)
//! before any network call, per-stream cursors persisted in `sync_state`,
//! and opaque encrypted payloads. The memory engine also owns device
//! authorization (RSA-wrapped vault-key envelopes).

pub mod devices;
pub mod memory;
pub mod secrets;
pub mod wire;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// `sync_state` key for the memory stream cursor.
pub const MEMORY_CURSOR_KEY: &str = "sync_cursor";

/// `sync_state` key for the secrets stream cursor.
pub const SECRETS_CURSOR_KEY: &str = "secrets_sync_cursor";

/// Read a persisted stream cursor.
pub fn get_cursor(conn: &Connection, key: &str) -> Result<Option<i64>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM sync_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

/// Persist a stream cursor after a successful pull.
pub fn set_cursor(conn: &Connection, key: &str, value: i64) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?1, ?2)",
        params![key, value.to_string()],
    )?;
    Ok(())
}

/// Read an arbitrary `sync_state` value (device key envelopes live here too).
pub fn get_state(conn: &Connection, key: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT value FROM sync_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

/// Write an arbitrary `sync_state` value.
pub fn set_state(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}
