//! SQL DDL for all Engram tables.
//!
//! Defines `memories`, `memories_vec` (vec0), the two append-only journals
//! (`sync_events`, `local_secret_sync_events`), `secrets`, `sync_state`,
//! `local_vault_key`, `indexing_events`, and `schema_meta`. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

use crate::embedding::EMBEDDING_DIM;

/// Schema DDL for all regular tables.
const SCHEMA_SQL: &str = r#"
-- Core memory storage. Timestamps are millisecond epochs.
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    vector BLOB NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    source TEXT,
    confidence REAL NOT NULL DEFAULT 1.0 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    is_verified INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_memories_source ON memories(source);

-- Append-only journal of memory mutations.
CREATE TABLE IF NOT EXISTS sync_events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL CHECK(event_type IN ('ADD','UPDATE','DELETE')),
    memory_id TEXT NOT NULL,
    encrypted_data TEXT,
    checksum TEXT,
    timestamp INTEGER NOT NULL,
    sequence_num INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_events_seq ON sync_events(sequence_num);

-- Encrypted secrets, keyed by case-sensitive name.
CREATE TABLE IF NOT EXISTS secrets (
    id TEXT PRIMARY KEY,
    key_name TEXT NOT NULL UNIQUE,
    encrypted_value TEXT NOT NULL,
    iv TEXT NOT NULL,
    description TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Append-only journal of secret mutations (separate sequence domain).
CREATE TABLE IF NOT EXISTS local_secret_sync_events (
    id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL CHECK(event_type IN ('ADD','UPDATE','DELETE')),
    secret_id TEXT NOT NULL,
    encrypted_data TEXT,
    iv TEXT,
    checksum TEXT,
    blind_id TEXT,
    timestamp INTEGER NOT NULL,
    sequence_num INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_secret_sync_events_seq
    ON local_secret_sync_events(sequence_num);
CREATE INDEX IF NOT EXISTS idx_secret_sync_events_blind
    ON local_secret_sync_events(blind_id);

-- Per-stream sync cursors and other small durable state.
CREATE TABLE IF NOT EXISTS sync_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- The vault key as unwrapped by this device. Single row, overwritten on rotation.
CREATE TABLE IF NOT EXISTS local_vault_key (
    id TEXT PRIMARY KEY DEFAULT 'default',
    vault_key BLOB NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Best-effort durable log of indexing pipeline events.
CREATE TABLE IF NOT EXISTS indexing_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    stage TEXT NOT NULL,
    path TEXT NOT NULL,
    detail TEXT,
    created_at INTEGER NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables with the default vector dimension.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    init_schema_with_dim(conn, EMBEDDING_DIM)
}

/// Initialize all schema tables. The vector dimension is fixed here and
/// never varies for the lifetime of the database.
pub fn init_schema_with_dim(conn: &Connection, dim: usize) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // vec0 virtual table must be created separately (sqlite-vec syntax).
    conn.execute_batch(&format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS memories_vec USING vec0(
            memory_id TEXT PRIMARY KEY,
            embedding FLOAT[{dim}] distance_metric=cosine
        );"
    ))?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('vector_dim', ?1)",
        [dim.to_string()],
    )?;

    Ok(())
}

/// Read the vector dimension the database was initialized with.
pub fn vector_dim(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'vector_dim'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<usize>().unwrap_or(EMBEDDING_DIM))
        },
    )
}
