//! Encrypted secrets store — CRUD over vault-key-encrypted values, keyed by
//! case-sensitive name, with optional sync delegation.
//!
//! The sync engine is an injected capability, never owned: a remote mirror
//! failure is logged and swallowed, and the local row remains the source of
//! truth.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::{CryptoService, Envelope};
use crate::error::{EngramError, Result};
use crate::memory::now_ms;
use crate::sync::secrets::SecretsSyncEngine;

/// Listing entry; the value itself is never included.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SecretEntry {
    pub id: String,
    pub key: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub struct SecretsStore {
    conn: Arc<Mutex<Connection>>,
    crypto: Arc<CryptoService>,
    sync: Option<Arc<SecretsSyncEngine>>,
}

impl SecretsStore {
    pub fn new(conn: Arc<Mutex<Connection>>, crypto: Arc<CryptoService>) -> Self {
        Self {
            conn,
            crypto,
            sync: None,
        }
    }

    /// Attach the sync capability. The store mirrors mutations through it
    /// but never depends on it succeeding.
    pub fn with_sync(mut self, sync: Arc<SecretsSyncEngine>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Idempotent DDL for the secrets tables (a subset of the full schema
    /// bootstrap, for callers that bring their own connection).
    pub fn init(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS secrets (
                id TEXT PRIMARY KEY,
                key_name TEXT NOT NULL UNIQUE,
                encrypted_value TEXT NOT NULL,
                iv TEXT NOT NULL,
                description TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
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
            );",
        )?;
        Ok(())
    }

    /// Upsert by `key_name`. A `None` description keeps the existing one.
    /// The local write commits first; the remote mirror is best-effort.
    pub async fn set(&self, key: &str, value: &str, description: Option<&str>) -> Result<()> {
        if key.is_empty() {
            return Err(EngramError::Storage("secret key must not be empty".into()));
        }

        let envelope = self.crypto.encrypt(value)?;
        let now = now_ms();

        let secret_id = {
            let conn = self.lock()?;
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM secrets WHERE key_name = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE secrets SET encrypted_value = ?1, iv = ?2, \
                         description = COALESCE(?3, description), updated_at = ?4 WHERE id = ?5",
                        params![envelope.ciphertext, envelope.iv, description, now, id],
                    )?;
                    id
                }
                None => {
                    let id = uuid::Uuid::now_v7().to_string();
                    conn.execute(
                        "INSERT INTO secrets (id, key_name, encrypted_value, iv, description, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        params![id, key, envelope.ciphertext, envelope.iv, description, now],
                    )?;
                    id
                }
            }
        };
        tracing::info!(key, "secret stored");

        if let Some(sync) = &self.sync {
            if let Err(e) = sync.push_secret(&secret_id, key, value).await {
                tracing::warn!(key, error = %e, "secret sync mirror failed; local write kept");
            }
        }
        Ok(())
    }

    /// Decrypt and return the value for `key`, if present.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let envelope = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT encrypted_value, iv FROM secrets WHERE key_name = ?1",
                params![key],
                |row| {
                    Ok(Envelope {
                        ciphertext: row.get(0)?,
                        iv: row.get(1)?,
                    })
                },
            )
            .optional()?
        };
        match envelope {
            Some(envelope) => Ok(Some(self.crypto.decrypt(&envelope)?)),
            None => Ok(None),
        }
    }

    /// All secrets, alphabetical by key, values omitted.
    pub fn list(&self) -> Result<Vec<SecretEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, key_name, description, created_at, updated_at \
             FROM secrets ORDER BY key_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SecretEntry {
                id: row.get(0)?,
                key: row.get(1)?,
                description: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Delete by key. Returns whether a row was removed; the remote mirror
    /// is best-effort.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let removed = {
            let conn = self.lock()?;
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM secrets WHERE key_name = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            match existing {
                Some(id) => {
                    conn.execute("DELETE FROM secrets WHERE id = ?1", params![id])?;
                    Some(id)
                }
                None => None,
            }
        };

        let Some(secret_id) = removed else {
            return Ok(false);
        };
        tracing::info!(key, "secret deleted");

        if let Some(sync) = &self.sync {
            if let Err(e) = sync.delete_secret(&secret_id, key).await {
                tracing::warn!(key, error = %e, "secret delete mirror failed; local delete kept");
            }
        }
        Ok(true)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EngramError::Storage(format!("connection lock poisoned: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_master_key;
    use crate::db;

    fn test_store() -> SecretsStore {
        let conn = db::open_memory_database().unwrap();
        SecretsStore::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(CryptoService::new(generate_master_key())),
        )
    }

    #[tokio::test]
    async fn set_get_round_trip() {
        let store = test_store();
        store
            .set("OPENAI_API_KEY", "sk-value", Some("LLM key"))
            .await
            .unwrap();

        assert_eq!(
            store.get("OPENAI_API_KEY").unwrap().as_deref(),
            Some("sk-value")
        );
        assert!(store.get("MISSING").unwrap().is_none());
    }

    #[tokio::test]
    async fn values_are_encrypted_at_rest() {
        let store = test_store();
        store.set("TOKEN", "plaintext-token", None).await.unwrap();

        let conn = store.conn.lock().unwrap();
        let (stored, iv): (String, String) = conn
            .query_row(
                "SELECT encrypted_value, iv FROM secrets WHERE key_name = 'TOKEN'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(!stored.contains("plaintext-token"));
        assert!(stored.contains('.')); // ciphertext.tag serialization
        assert!(!iv.is_empty());
    }

    #[tokio::test]
    async fn set_upserts_by_key_name() {
        let store = test_store();
        store.set("KEY", "v1", Some("first")).await.unwrap();
        store.set("KEY", "v2", None).await.unwrap();

        assert_eq!(store.get("KEY").unwrap().as_deref(), Some("v2"));

        let entries = store.list().unwrap();
        assert_eq!(entries.len(), 1);
        // None description keeps the existing one.
        assert_eq!(entries[0].description.as_deref(), Some("first"));

        store.set("KEY", "v3", Some("second")).await.unwrap();
        let entries = store.list().unwrap();
        assert_eq!(entries[0].description.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn keys_are_case_sensitive() {
        let store = test_store();
        store.set("Key", "lower", None).await.unwrap();
        store.set("KEY", "upper", None).await.unwrap();

        assert_eq!(store.get("Key").unwrap().as_deref(), Some("lower"));
        assert_eq!(store.get("KEY").unwrap().as_deref(), Some("upper"));
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_is_alphabetical_without_values() {
        let store = test_store();
        store.set("zeta", "z", None).await.unwrap();
        store.set("alpha", "a", None).await.unwrap();
        store.set("mid", "m", None).await.unwrap();

        let keys: Vec<String> = store.list().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = test_store();
        store.set("KEY", "v", None).await.unwrap();

        assert!(store.delete("KEY").await.unwrap());
        assert!(store.get("KEY").unwrap().is_none());
        assert!(!store.delete("KEY").await.unwrap());
    }

    #[tokio::test]
    async fn empty_key_rejected() {
        let store = test_store();
        assert!(store.set("", "v", None).await.is_err());
    }

    #[tokio::test]
    async fn disconnected_mirror_failure_keeps_local_write() {
        // A sync engine that has never connected fails every push; the
        // store must log and keep the local row.
        let conn = Arc::new(Mutex::new(db::open_memory_database().unwrap()));
        let crypto = Arc::new(CryptoService::new(generate_master_key()));
        let engine = Arc::new(
            SecretsSyncEngine::new(
                "https://sync.example",
                conn.clone(),
                crypto.clone(),
                generate_master_key().to_vec(),
            )
            .unwrap(),
        );
        let store = SecretsStore::new(conn, crypto).with_sync(engine);

        store.set("KEY", "value", None).await.unwrap();
        assert_eq!(store.get("KEY").unwrap().as_deref(), Some("value"));

        assert!(store.delete("KEY").await.unwrap());
        assert!(store.get("KEY").unwrap().is_none());
    }
}
