//! Indexing pipeline events: bounded in-memory ring, broadcast channel, and
//! best-effort durable logging into `indexing_events`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::memory::now_ms;

/// How many recent events the in-memory ring keeps for UI queries.
pub const EVENT_RING_CAPACITY: usize = 200;

/// Pipeline stage for one file. Terminal stages are `Stored`, `Skipped`,
/// and `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStage {
    Start,
    Parsed,
    Embedded,
    Stored,
    Skipped,
    Error,
}

impl IndexingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Parsed => "parsed",
            Self::Embedded => "embedded",
            Self::Stored => "stored",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexingEvent {
    pub stage: IndexingStage,
    pub path: String,
    /// Parser kind for `Parsed`, memory id for `Stored`, reason for
    /// `Skipped`/`Error`.
    pub detail: Option<String>,
    /// Millisecond epoch.
    pub timestamp: i64,
}

/// Event fan-out owned by the indexing service.
pub struct EventLog {
    ring: Mutex<VecDeque<IndexingEvent>>,
    tx: broadcast::Sender<IndexingEvent>,
    conn: Option<Arc<Mutex<Connection>>>,
}

impl EventLog {
    /// `conn` enables the durable `indexing_events` sink; insert failures
    /// never interrupt the pipeline.
    pub fn new(conn: Option<Arc<Mutex<Connection>>>) -> Self {
        let (tx, _) = broadcast::channel(EVENT_RING_CAPACITY);
        Self {
            ring: Mutex::new(VecDeque::with_capacity(EVENT_RING_CAPACITY)),
            tx,
            conn,
        }
    }

    pub fn emit(&self, stage: IndexingStage, path: &str, detail: Option<String>) {
        let event = IndexingEvent {
            stage,
            path: path.to_string(),
            detail,
            timestamp: now_ms(),
        };

        {
            let mut ring = self.ring.lock().unwrap();
            if ring.len() == EVENT_RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(event.clone());

        if let Some(conn) = &self.conn {
            let insert = || -> rusqlite::Result<()> {
                let conn = conn
                    .lock()
                    .map_err(|_| rusqlite::Error::InvalidQuery)?;
                conn.execute(
                    "INSERT INTO indexing_events (stage, path, detail, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![event.stage.as_str(), event.path, event.detail, event.timestamp],
                )?;
                Ok(())
            };
            if let Err(e) = insert() {
                tracing::debug!(error = %e, "indexing event insert failed; continuing");
            }
        }
    }

    /// The most recent `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<IndexingEvent> {
        let ring = self.ring.lock().unwrap();
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexingEvent> {
        self.tx.subscribe()
    }
}
