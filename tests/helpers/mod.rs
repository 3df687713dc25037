#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use engram::crypto::{generate_master_key, CryptoService};
use engram::db;
use engram::dlp::DlpSanitizer;
use engram::memory::store::MemoryStore;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_conn() -> Connection {
    db::load_sqlite_vec();
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// A memory store over a fresh in-memory database with a random vault key.
pub fn test_store() -> MemoryStore {
    store_with_key(generate_master_key())
}

/// A memory store bound to a specific vault key (for cross-device tests).
pub fn store_with_key(vault_key: [u8; 32]) -> MemoryStore {
    MemoryStore::new(
        Arc::new(Mutex::new(test_conn())),
        Arc::new(CryptoService::new(vault_key)),
        DlpSanitizer::default(),
        384,
    )
}

/// Generate a deterministic 384-dim embedding with a spike at `seed`.
/// Each seed produces a distinct, orthogonal-ish vector.
pub fn test_embedding(seed: u8) -> Vec<f32> {
    let mut v = vec![0.0f32; 384];
    v[seed as usize % 384] = 1.0;
    v
}

/// Generate an embedding similar to `base` with small perturbation.
/// The result has high cosine similarity to `base`.
pub fn similar_embedding(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    for i in 0..5 {
        v[(i * 37) % 384] += 0.05;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
