//! Memory-stream sync engine: push encrypted journal payloads, pull and
//! assemble remote blobs, persist the stream cursor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rusqlite::Connection;

use crate::error::{EngramError, Result};
use crate::sync::wire::{PullResponse, PushBlobRequest, PushBlobResponse, RemoteSyncEvent};
use crate::sync::{get_cursor, set_cursor, MEMORY_CURSOR_KEY};

/// One pull's worth of events with their assembled blob payloads.
#[derive(Debug, Default)]
pub struct PulledBatch {
    pub events: Vec<RemoteSyncEvent>,
    /// blob_id → decoded payload bytes.
    pub blobs: HashMap<String, Vec<u8>>,
    pub cursor: i64,
    pub has_more: bool,
}

/// HTTP client for the memory stream. Owns the reqwest client and the
/// cursor; borrows the store connection for cursor persistence.
pub struct MemorySyncEngine {
    client: reqwest::Client,
    base_url: String,
    conn: Arc<Mutex<Connection>>,
    connected: AtomicBool,
}

impl MemorySyncEngine {
    pub fn new(base_url: impl Into<String>, conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            conn,
            connected: AtomicBool::new(false),
        }
    }

    /// Transition `Disconnected → Connected`. Required before any network
    /// call.
    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(url = %self.base_url, "memory sync engine connected");
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(EngramError::Config(
                "sync engine is not connected; call connect() first".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Push one encrypted blob; the remote stores the ciphertext and
    /// returns an opaque blob id.
    pub async fn push(
        &self,
        encrypted_blob: &str,
        checksum: &str,
        blind_id: Option<&str>,
    ) -> Result<String> {
        self.ensure_connected()?;

        let request = PushBlobRequest {
            encrypted_data: encrypted_blob.to_string(),
            checksum: checksum.to_string(),
            blind_id: blind_id.map(String::from),
        };
        let response = self
            .client
            .post(self.url("/api/sync/push"))
            .json(&request)
            .send()
            .await?;
        let response = check_status(response)?;
        let body: PushBlobResponse = response.json().await?;

        tracing::debug!(blob_id = %body.blob_id, "pushed sync blob");
        Ok(body.blob_id)
    }

    /// Pull one page of events past `since` (or the persisted cursor),
    /// fetch any signed-URL blobs, and advance the local cursor.
    pub async fn pull(&self, since: Option<i64>) -> Result<PulledBatch> {
        self.ensure_connected()?;

        let cursor = match since {
            Some(c) => c,
            None => self.stored_cursor()?.unwrap_or(0),
        };

        let response = self
            .client
            .get(self.url("/api/sync/pull"))
            .query(&[("cursor", cursor)])
            .send()
            .await?;
        let response = check_status(response)?;
        let page: PullResponse = response.json().await?;

        let mut blobs = HashMap::new();
        for blob in &page.blobs {
            let bytes = match (&blob.data, &blob.url) {
                (Some(inline), _) => BASE64
                    .decode(inline)
                    .map_err(|e| EngramError::Format(format!("bad inline blob base64: {e}")))?,
                (None, Some(url)) => {
                    let response = check_status(self.client.get(url).send().await?)?;
                    response.bytes().await?.to_vec()
                }
                (None, None) => {
                    return Err(EngramError::Format(format!(
                        "blob {} has neither data nor url",
                        blob.blob_id
                    )))
                }
            };
            blobs.insert(blob.blob_id.clone(), bytes);
        }

        self.persist_cursor(page.cursor)?;
        tracing::debug!(
            events = page.events.len(),
            cursor = page.cursor,
            has_more = page.has_more,
            "pulled sync page"
        );

        Ok(PulledBatch {
            events: page.events,
            blobs,
            cursor: page.cursor,
            has_more: page.has_more,
        })
    }

    /// Pull pages until the remote reports no more, returning everything in
    /// `sequence_num` order. Applying the events in that order is the
    /// caller's responsibility.
    pub async fn pull_all(&self) -> Result<PulledBatch> {
        let mut all = PulledBatch::default();
        loop {
            let page = self.pull(None).await?;
            all.events.extend(page.events);
            all.blobs.extend(page.blobs);
            all.cursor = page.cursor;
            all.has_more = page.has_more;
            if !page.has_more {
                break;
            }
        }
        Ok(all)
    }

    fn stored_cursor(&self) -> Result<Option<i64>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngramError::Storage(format!("connection lock poisoned: {e}")))?;
        get_cursor(&conn, MEMORY_CURSOR_KEY)
    }

    fn persist_cursor(&self, cursor: i64) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngramError::Storage(format!("connection lock poisoned: {e}")))?;
        set_cursor(&conn, MEMORY_CURSOR_KEY, cursor)
    }
}

/// Map a non-2xx response to [`EngramError::Network`].
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if !status.is_success() {
        return Err(EngramError::Network(format!(
            "{status} from {}",
            response.url()
        )));
    }
    Ok(response)
}
