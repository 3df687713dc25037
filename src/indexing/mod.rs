//! Indexing service: session/definition files in, memory records out.
//!
//! `ingest_file` runs the full pipeline — read, parse (first accepting
//! parser wins), optional LLM summarization, embed, dedupe by `source`,
//! store — and reports progress through the event log. It never propagates
//! an error to the caller; failures terminate in an `Error` event.

pub mod events;
pub mod parsers;

use std::path::Path;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::Result;
use crate::memory::store::MemoryStore;
use crate::memory::types::{CreateMemory, MemoryPatch};

use events::{EventLog, IndexingStage};
use parsers::{default_parsers, truncate_chars, ParsedFile, SessionMessage, SessionParser};

/// Tag carried by every session-indexed memory.
pub const SESSION_INDEX_TAG: &str = "session-index";

/// Confidence for records summarized by the configured LLM.
const LLM_CONFIDENCE: f64 = 0.9;

/// Confidence for records with the parser's basic summary.
const BASIC_CONFIDENCE: f64 = 0.7;

/// How many trailing messages the summarizer sees.
const SUMMARIZER_MESSAGE_WINDOW: usize = 20;

/// Per-message truncation before summarization.
const SUMMARIZER_MESSAGE_CHARS: usize = 2000;

/// Filesystem event kind driving one ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEvent {
    Add,
    Change,
}

/// Opaque LLM summarizer. Failures fall back to the parser's basic summary.
pub trait Summarizer: Send + Sync {
    fn summarize(&self, messages: &[SessionMessage]) -> Result<String>;
}

/// File → memory pipeline. Borrows the store and embedder; owns the parser
/// set and the event log.
pub struct IndexingService {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    parsers: Vec<Box<dyn SessionParser>>,
    summarizer: Option<Arc<dyn Summarizer>>,
    events: EventLog,
}

impl IndexingService {
    pub fn new(store: Arc<MemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            parsers: default_parsers(),
            summarizer: None,
            events: EventLog::new(None),
        }
    }

    /// Enable the durable `indexing_events` sink.
    pub fn with_event_sink(
        mut self,
        conn: Arc<std::sync::Mutex<rusqlite::Connection>>,
    ) -> Self {
        self.events = EventLog::new(Some(conn));
        self
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Register an additional parser after the built-ins.
    pub fn register_parser(&mut self, parser: Box<dyn SessionParser>) {
        self.parsers.push(parser);
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Ingest one file. Returns whether a memory was stored or updated.
    /// Never returns an error: failures emit an `Error` event and yield
    /// `false`.
    pub async fn ingest_file(&self, path: &Path, event: FileEvent) -> bool {
        let path_str = path.to_string_lossy().into_owned();
        self.events.emit(IndexingStage::Start, &path_str, None);

        match self.ingest_inner(path, &path_str, event).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(path = %path_str, error = %e, "indexing failed");
                self.events
                    .emit(IndexingStage::Error, &path_str, Some(e.to_string()));
                false
            }
        }
    }

    async fn ingest_inner(&self, path: &Path, path_str: &str, event: FileEvent) -> Result<bool> {
        let raw = tokio::fs::read_to_string(path).await?;

        // First parser claiming the path wins; if it declines, nothing else
        // is tried.
        let Some(parser) = self.parsers.iter().find(|p| p.can_parse(path)) else {
            self.events
                .emit(IndexingStage::Skipped, path_str, Some("no parser".into()));
            return Ok(false);
        };
        let Some(parsed) = parser.parse(&raw, path) else {
            self.events.emit(
                IndexingStage::Skipped,
                path_str,
                Some(format!("{} parser declined", parser.kind())),
            );
            return Ok(false);
        };
        self.events.emit(
            IndexingStage::Parsed,
            path_str,
            Some(parsed.metadata.kind.clone()),
        );

        let (summary, llm_summarized) = self.summarize(&parsed);

        let vector = self.embedder.embed(&summary)?;
        self.events.emit(IndexingStage::Embedded, path_str, None);

        let memory_id = match self.store.find_by_source(path_str)? {
            Some(existing) => match event {
                FileEvent::Add => {
                    self.events.emit(
                        IndexingStage::Skipped,
                        path_str,
                        Some("already indexed".into()),
                    );
                    return Ok(false);
                }
                FileEvent::Change => {
                    let patch = MemoryPatch {
                        content: Some(summary),
                        ..Default::default()
                    };
                    self.store
                        .update(&existing.id, patch, Some(&vector))?
                        .map(|m| m.id)
                        .unwrap_or(existing.id)
                }
            },
            None => {
                let confidence = if llm_summarized {
                    LLM_CONFIDENCE
                } else {
                    BASIC_CONFIDENCE
                };
                let created = self.store.create(
                    CreateMemory {
                        content: summary,
                        tags: vec![
                            SESSION_INDEX_TAG.to_string(),
                            parsed.metadata.kind.clone(),
                        ],
                        source: Some(path_str.to_string()),
                        confidence: Some(confidence),
                    },
                    &vector,
                )?;
                created.id
            }
        };

        self.events
            .emit(IndexingStage::Stored, path_str, Some(memory_id));
        Ok(true)
    }

    /// The LLM pass sees the last 20 messages, each capped at 2000 chars;
    /// on failure the basic summary stands.
    fn summarize(&self, parsed: &ParsedFile) -> (String, bool) {
        let Some(summarizer) = &self.summarizer else {
            return (parsed.summary.clone(), false);
        };
        if parsed.messages.is_empty() {
            return (parsed.summary.clone(), false);
        }

        let window_start = parsed.messages.len().saturating_sub(SUMMARIZER_MESSAGE_WINDOW);
        let window: Vec<SessionMessage> = parsed.messages[window_start..]
            .iter()
            .map(|m| SessionMessage {
                role: m.role.clone(),
                text: truncate_chars(&m.text, SUMMARIZER_MESSAGE_CHARS),
            })
            .collect();

        match summarizer.summarize(&window) {
            Ok(summary) => (summary, true),
            Err(e) => {
                tracing::warn!(error = %e, "LLM summarization failed; using basic summary");
                (parsed.summary.clone(), false)
            }
        }
    }
}
