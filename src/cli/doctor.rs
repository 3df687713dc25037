//! `engram doctor` — database health report.

use anyhow::{Context, Result};

use crate::config::EngramConfig;
use crate::db;

pub fn run(config: &EngramConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    println!("Database: {}", db_path.display());

    let conn = db::open_database(&db_path, config.embedding.dimensions)
        .context("failed to open database")?;
    let report = db::check_database_health(&conn).context("health check failed")?;

    println!("Schema version: {}", report.schema_version);
    println!("Vector dimension: {}", report.vector_dim);
    println!("sqlite-vec: {}", report.sqlite_vec_version);
    println!(
        "Integrity: {}",
        if report.integrity_ok {
            "ok".to_string()
        } else {
            report.integrity_details.clone()
        }
    );
    println!("Memories: {}", report.memory_count);
    println!("Sync events: {}", report.sync_event_count);
    println!("Secrets: {}", report.secret_count);

    if !report.integrity_ok {
        anyhow::bail!("database integrity check failed");
    }
    Ok(())
}
