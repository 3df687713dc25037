pub mod migrations;
pub mod schema;

use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

use crate::error::{EngramError, Result};

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the Engram database at the given path, with the vector
/// extension loaded and schema initialized at the given dimension.
pub fn open_database(path: impl AsRef<Path>, dim: usize) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            EngramError::Storage(format!(
                "failed to create directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path).map_err(|e| {
        EngramError::Storage(format!(
            "failed to open database at {}: {e}",
            path.display()
        ))
    })?;

    // WAL for reader/writer separation; wait on locks instead of failing.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", "5000")?;

    schema::init_schema_with_dim(&conn, dim)?;
    migrations::run_migrations(&conn)?;

    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        return Err(EngramError::Storage(format!(
            "database integrity check failed: {integrity}"
        )));
    }

    tracing::info!(path = %path.display(), dim, "database initialized");
    Ok(conn)
}

/// Result of a full database health check.
pub struct HealthReport {
    pub schema_version: u32,
    pub vector_dim: usize,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub sqlite_vec_version: String,
    pub memory_count: i64,
    pub sync_event_count: i64,
    pub secret_count: i64,
}

/// Run a comprehensive health check on the database.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let vector_dim = schema::vector_dim(conn)?;

    let integrity_details: String =
        conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    let integrity_ok = integrity_details == "ok";

    let sqlite_vec_version: String =
        conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;

    let memory_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))
        .unwrap_or(0);
    let sync_event_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM sync_events", [], |row| row.get(0))
        .unwrap_or(0);
    let secret_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM secrets", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(HealthReport {
        schema_version,
        vector_dim,
        integrity_ok,
        integrity_details,
        sqlite_vec_version,
        memory_count,
        sync_event_count,
        secret_count,
    })
}

/// Open an in-memory database for testing.
#[cfg(test)]
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}
