//! Secrets-stream sync engine: vault-key encryption, blind-index ids,
//! push-then-record journaling, and checksum-verified pulls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};

use crate::crypto::{blind_index, sha256_hex, CryptoService, Envelope, KEY_SIZE};
use crate::error::{EngramError, Result};
use crate::memory::now_ms;
use crate::sync::memory::check_status;
use crate::sync::wire::{RemoteSecretEvent, SecretPullResponse, SecretPushRequest};
use crate::sync::{get_cursor, set_cursor, SECRETS_CURSOR_KEY};

/// A decrypted secret event from a pull. `value` is empty for DELETE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledSecret {
    pub secret_id: String,
    pub value: String,
    pub event_type: String,
}

/// HTTP client for the secrets stream. Requires the vault key (payload
/// encryption) and the blind-index key (server-side deduplication ids).
pub struct SecretsSyncEngine {
    client: reqwest::Client,
    base_url: String,
    conn: Arc<Mutex<Connection>>,
    crypto: Arc<CryptoService>,
    blind_key: Vec<u8>,
    connected: AtomicBool,
}

impl SecretsSyncEngine {
    pub fn new(
        base_url: impl Into<String>,
        conn: Arc<Mutex<Connection>>,
        crypto: Arc<CryptoService>,
        blind_key: Vec<u8>,
    ) -> Result<Self> {
        if blind_key.len() < KEY_SIZE {
            return Err(EngramError::Config(format!(
                "blind-index key must be at least {KEY_SIZE} bytes"
            )));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            conn,
            crypto,
            blind_key,
            connected: AtomicBool::new(false),
        })
    }

    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(url = %self.base_url, "secrets sync engine connected");
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(EngramError::Config(
                "secrets sync engine is not connected; call connect() first".into(),
            ));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Mirror an upsert to the remote, then record a local journal row.
    /// The remote push precedes the journal entry.
    pub async fn push_secret(&self, secret_id: &str, key_name: &str, value: &str) -> Result<()> {
        self.ensure_connected()?;

        let envelope = self.crypto.encrypt(value)?;
        let checksum = sha256_hex(value.as_bytes());
        let blind_id = blind_index(&self.blind_key, key_name)?;

        let request = SecretPushRequest {
            secret_id: secret_id.to_string(),
            event_type: "ADD".into(),
            encrypted_data: Some(envelope.ciphertext.clone()),
            iv: Some(envelope.iv.clone()),
            checksum: Some(checksum.clone()),
            blind_id: blind_id.clone(),
        };
        let response = self
            .client
            .post(self.url("/api/secrets/push"))
            .json(&request)
            .send()
            .await?;
        check_status(response)?;

        self.record_local_event("ADD", secret_id, Some(&envelope), Some(&checksum), &blind_id)?;
        tracing::debug!(secret_id, "pushed secret event");
        Ok(())
    }

    /// Mirror a deletion to the remote, then record a local journal row.
    pub async fn delete_secret(&self, secret_id: &str, key_name: &str) -> Result<()> {
        self.ensure_connected()?;

        let blind_id = blind_index(&self.blind_key, key_name)?;
        let request = SecretPushRequest {
            secret_id: secret_id.to_string(),
            event_type: "DELETE".into(),
            encrypted_data: None,
            iv: None,
            checksum: None,
            blind_id: blind_id.clone(),
        };
        let response = self
            .client
            .post(self.url("/api/secrets/push"))
            .json(&request)
            .send()
            .await?;
        check_status(response)?;

        self.record_local_event("DELETE", secret_id, None, None, &blind_id)?;
        tracing::debug!(secret_id, "pushed secret delete event");
        Ok(())
    }

    /// Pull remote secret events past the persisted cursor, decrypt and
    /// checksum-verify each payload, and advance the cursor.
    pub async fn pull_secrets(&self) -> Result<Vec<PulledSecret>> {
        self.ensure_connected()?;

        let cursor = {
            let conn = self.lock()?;
            get_cursor(&conn, SECRETS_CURSOR_KEY)?.unwrap_or(0)
        };

        let response = self
            .client
            .get(self.url("/api/secrets/pull"))
            .query(&[("cursor", cursor)])
            .send()
            .await?;
        let response = check_status(response)?;
        let page: SecretPullResponse = response.json().await?;

        let mut pulled = Vec::with_capacity(page.events.len());
        for event in &page.events {
            pulled.push(self.decrypt_event(event)?);
        }

        {
            let conn = self.lock()?;
            set_cursor(&conn, SECRETS_CURSOR_KEY, page.cursor)?;
        }
        tracing::debug!(events = pulled.len(), cursor = page.cursor, "pulled secret events");
        Ok(pulled)
    }

    fn decrypt_event(&self, event: &RemoteSecretEvent) -> Result<PulledSecret> {
        if event.event_type == "DELETE" {
            return Ok(PulledSecret {
                secret_id: event.secret_id.clone(),
                value: String::new(),
                event_type: event.event_type.clone(),
            });
        }

        let ciphertext = event.encrypted_data.clone().ok_or_else(|| {
            EngramError::Format(format!("secret event {} has no payload", event.secret_id))
        })?;
        let iv = event.iv.clone().ok_or_else(|| {
            EngramError::Format(format!("secret event {} has no iv", event.secret_id))
        })?;

        let value = self.crypto.decrypt(&Envelope { ciphertext, iv })?;
        if let Some(checksum) = &event.checksum {
            if sha256_hex(value.as_bytes()) != *checksum {
                return Err(EngramError::ChecksumMismatch(format!(
                    "secret event {}",
                    event.secret_id
                )));
            }
        }

        Ok(PulledSecret {
            secret_id: event.secret_id.clone(),
            value,
            event_type: event.event_type.clone(),
        })
    }

    /// Append to `local_secret_sync_events` in its own sequence domain.
    fn record_local_event(
        &self,
        event_type: &str,
        secret_id: &str,
        envelope: Option<&Envelope>,
        checksum: Option<&str>,
        blind_id: &str,
    ) -> Result<()> {
        let conn = self.lock()?;
        let sequence_num: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_num), 0) + 1 FROM local_secret_sync_events",
            [],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO local_secret_sync_events \
             (id, event_type, secret_id, encrypted_data, iv, checksum, blind_id, timestamp, sequence_num) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                uuid::Uuid::now_v7().to_string(),
                event_type,
                secret_id,
                envelope.map(|e| e.ciphertext.clone()),
                envelope.map(|e| e.iv.clone()),
                checksum,
                blind_id,
                now_ms(),
                sequence_num,
            ],
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EngramError::Storage(format!("connection lock poisoned: {e}")))
    }
}
