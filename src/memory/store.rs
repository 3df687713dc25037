//! The memory store — CRUD and search over memory records.
//!
//! Every mutation runs inside one transaction: the `memories` row, the
//! `memories_vec` row, and the journal entry commit or roll back together.
//! Content is passed through the DLP sanitizer before it is persisted, and
//! journal payloads are envelopes of the *sanitized* content. Applying a
//! replicated event never emits a new event.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::crypto::{sha256_hex, CryptoService, Envelope};
use crate::dlp::{DlpSanitizer, SanitizeOutcome};
use crate::error::{EngramError, Result};
use crate::memory::types::{
    ensure_dlp_tag, normalize_tags, CreateMemory, Memory, MemoryPatch, ScoredMemory, SyncEvent,
    SyncEventType,
};
use crate::memory::{bytes_to_embedding, embedding_to_bytes, now_ms};

/// Source marker for records created by applying a replicated event.
pub const SYNC_SOURCE: &str = "sync";

/// Options for [`MemoryStore::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// When set, project-scoped memories from other projects are filtered
    /// out of the results (plugin-scoped sources stay visible everywhere).
    pub project_path: Option<String>,
}

/// Options for [`MemoryStore::list`].
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    /// Exact-match filter on `source`.
    pub source: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            source: None,
        }
    }
}

/// CRUD + search over memory records, with journal emission.
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
    crypto: Arc<CryptoService>,
    dlp: DlpSanitizer,
    dim: usize,
}

impl MemoryStore {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        crypto: Arc<CryptoService>,
        dlp: DlpSanitizer,
        dim: usize,
    ) -> Self {
        Self {
            conn,
            crypto,
            dlp,
            dim,
        }
    }

    /// Run the caller's text through the store's sanitizer without touching
    /// the database. The facade embeds the sanitized form.
    pub fn sanitize(&self, text: &str) -> SanitizeOutcome {
        self.dlp.sanitize(text)
    }

    pub fn dimensions(&self) -> usize {
        self.dim
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EngramError::Storage(format!("connection lock poisoned: {e}")))
    }

    fn check_dim(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(EngramError::VectorDimMismatch {
                got: vector.len(),
                expected: self.dim,
            });
        }
        Ok(())
    }

    // ── Write path ────────────────────────────────────────────────────────

    /// Sanitize, insert into the main table and the vector index atomically,
    /// and append an ADD journal entry carrying the sanitized content.
    pub fn create(&self, request: CreateMemory, vector: &[f32]) -> Result<Memory> {
        self.check_dim(vector)?;
        if request.content.is_empty() {
            return Err(EngramError::Storage("content must not be empty".into()));
        }

        let outcome = self.dlp.sanitize(&request.content);
        let mut tags = normalize_tags(request.tags);
        if outcome.fired() {
            tags = ensure_dlp_tag(tags);
            tracing::info!(patterns = ?outcome.detected, "DLP redacted memory content");
        }

        self.insert_record(
            &outcome.sanitized,
            tags,
            request.source,
            request.confidence.unwrap_or(1.0),
            false,
            vector,
            false,
        )
    }

    fn insert_record(
        &self,
        content: &str,
        tags: Vec<String>,
        source: Option<String>,
        confidence: f64,
        is_verified: bool,
        vector: &[f32],
        from_sync: bool,
    ) -> Result<Memory> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EngramError::Storage(format!(
                "confidence must be in [0.0, 1.0], got {confidence}"
            )));
        }

        let memory = Memory {
            id: uuid::Uuid::now_v7().to_string(),
            content: content.to_string(),
            vector: vector.to_vec(),
            tags,
            source,
            confidence,
            is_verified,
            created_at: now_ms(),
            updated_at: now_ms(),
        };

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO memories (id, content, vector, tags, source, confidence, is_verified, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                memory.id,
                memory.content,
                embedding_to_bytes(vector),
                serde_json::to_string(&memory.tags)?,
                memory.source,
                memory.confidence,
                memory.is_verified,
                memory.created_at,
                memory.updated_at,
            ],
        )?;
        tx.execute(
            "INSERT INTO memories_vec (memory_id, embedding) VALUES (?1, ?2)",
            params![memory.id, embedding_to_bytes(vector)],
        )?;

        if !from_sync {
            self.append_sync_event(&tx, SyncEventType::Add, &memory.id, Some(&memory.content))?;
        }

        tx.commit()?;
        tracing::info!(id = %memory.id, from_sync, "memory created");
        Ok(memory)
    }

    /// Patch an existing memory. Returns `None` when the id is unknown
    /// (including after a local delete); no journal entry is emitted then.
    pub fn update(
        &self,
        id: &str,
        patch: MemoryPatch,
        new_vector: Option<&[f32]>,
    ) -> Result<Option<Memory>> {
        self.update_inner(id, patch, new_vector, false)
    }

    fn update_inner(
        &self,
        id: &str,
        patch: MemoryPatch,
        new_vector: Option<&[f32]>,
        from_sync: bool,
    ) -> Result<Option<Memory>> {
        if let Some(vector) = new_vector {
            self.check_dim(vector)?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing = match fetch_memory(&tx, id)? {
            Some(m) => m,
            None => return Ok(None),
        };

        // Re-run sanitization on any new content. The DLP tag survives a
        // tag rewrite whenever the incoming content still trips a pattern.
        let (content, fired) = match &patch.content {
            Some(raw) => {
                let outcome = self.dlp.sanitize(raw);
                let fired = outcome.fired();
                (outcome.sanitized, fired)
            }
            None => (existing.content.clone(), false),
        };

        let mut tags = normalize_tags(patch.tags.unwrap_or_else(|| existing.tags.clone()));
        if fired {
            tags = ensure_dlp_tag(tags);
        }

        let confidence = patch.confidence.unwrap_or(existing.confidence);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EngramError::Storage(format!(
                "confidence must be in [0.0, 1.0], got {confidence}"
            )));
        }

        let updated = Memory {
            id: existing.id.clone(),
            content,
            vector: new_vector.map(<[f32]>::to_vec).unwrap_or(existing.vector),
            tags,
            source: patch.source.or(existing.source),
            confidence,
            is_verified: patch.is_verified.unwrap_or(existing.is_verified),
            created_at: existing.created_at,
            updated_at: now_ms(),
        };

        tx.execute(
            "UPDATE memories SET content = ?1, vector = ?2, tags = ?3, source = ?4, \
             confidence = ?5, is_verified = ?6, updated_at = ?7 WHERE id = ?8",
            params![
                updated.content,
                embedding_to_bytes(&updated.vector),
                serde_json::to_string(&updated.tags)?,
                updated.source,
                updated.confidence,
                updated.is_verified,
                updated.updated_at,
                updated.id,
            ],
        )?;

        if new_vector.is_some() {
            // vec0 rows are replaced rather than updated in place.
            tx.execute(
                "DELETE FROM memories_vec WHERE memory_id = ?1",
                params![updated.id],
            )?;
            tx.execute(
                "INSERT INTO memories_vec (memory_id, embedding) VALUES (?1, ?2)",
                params![updated.id, embedding_to_bytes(&updated.vector)],
            )?;
        }

        if !from_sync {
            self.append_sync_event(&tx, SyncEventType::Update, &updated.id, Some(&updated.content))?;
        }

        tx.commit()?;
        tracing::info!(id = %updated.id, from_sync, "memory updated");
        Ok(Some(updated))
    }

    /// Two-phase delete inside one transaction. A DELETE journal entry is
    /// appended only when a row was actually removed; re-deleting is a
    /// silent no-op returning `false`.
    pub fn delete(&self, id: &str) -> Result<bool> {
        self.delete_inner(id, false)
    }

    fn delete_inner(&self, id: &str, from_sync: bool) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let removed = tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Ok(false);
        }
        tx.execute("DELETE FROM memories_vec WHERE memory_id = ?1", params![id])?;

        if !from_sync {
            self.append_sync_event(&tx, SyncEventType::Delete, id, None)?;
        }

        tx.commit()?;
        tracing::info!(id, from_sync, "memory deleted");
        Ok(true)
    }

    /// Remove every memory created strictly before `cutoff_ms`. Each removal
    /// is journaled like an ordinary delete.
    pub fn delete_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let ids: Vec<String> = {
            let conn = self.lock()?;
            let mut stmt =
                conn.prepare("SELECT id FROM memories WHERE created_at < ?1 ORDER BY created_at")?;
            let rows = stmt
                .query_map(params![cutoff_ms], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut removed = 0;
        for id in &ids {
            if self.delete(id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // ── Read path ─────────────────────────────────────────────────────────

    pub fn get(&self, id: &str) -> Result<Option<Memory>> {
        let conn = self.lock()?;
        fetch_memory(&conn, id)
    }

    /// The canonical record for an indexed file path, if any.
    pub fn find_by_source(&self, source: &str) -> Result<Option<Memory>> {
        let conn = self.lock()?;
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM memories WHERE source = ?1 ORDER BY created_at LIMIT 1",
                params![source],
                |row| row.get(0),
            )
            .optional()?;
        match id {
            Some(id) => fetch_memory(&conn, &id),
            None => Ok(None),
        }
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?)
    }

    /// Reverse-chronological listing with optional exact `source` filter.
    pub fn list(&self, options: &ListOptions) -> Result<Vec<Memory>> {
        let conn = self.lock()?;
        let mut results = Vec::new();

        match &options.source {
            Some(source) => {
                let mut stmt = conn.prepare(
                    "SELECT id, content, vector, tags, source, confidence, is_verified, created_at, updated_at \
                     FROM memories WHERE source = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt.query_map(
                    params![source, options.limit as i64, options.offset as i64],
                    memory_from_row,
                )?;
                for row in rows {
                    results.push(row?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, content, vector, tags, source, confidence, is_verified, created_at, updated_at \
                     FROM memories ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(
                    params![options.limit as i64, options.offset as i64],
                    memory_from_row,
                )?;
                for row in rows {
                    results.push(row?);
                }
            }
        }

        Ok(results)
    }

    /// KNN search by cosine distance, ascending.
    ///
    /// With a `project_path`, `limit * 3` candidates are fetched and
    /// post-filtered: plugin-scoped sources are always visible, memories
    /// under some other project's `.claude` directory are hidden, everything
    /// else passes.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredMemory>> {
        self.check_dim(query)?;

        let candidate_limit = match options.project_path {
            Some(_) => limit * 3,
            None => limit,
        };

        let candidates = self.knn(query, candidate_limit)?;
        let mut results = Vec::with_capacity(limit);
        for scored in candidates {
            if let Some(project) = &options.project_path {
                if !source_visible_in_project(scored.memory.source.as_deref(), project) {
                    continue;
                }
            }
            results.push(scored);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }

    /// KNN over `limit * 2` candidates, reordered so candidates whose
    /// content or tags contain any keyword come first. Vector order is
    /// preserved within each group.
    pub fn hybrid_search(
        &self,
        query: &[f32],
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<ScoredMemory>> {
        self.check_dim(query)?;

        let candidates = self.knn(query, limit * 2)?;
        let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();

        let (mut matched, mut rest): (Vec<ScoredMemory>, Vec<ScoredMemory>) =
            candidates.into_iter().partition(|scored| {
                let content = scored.memory.content.to_lowercase();
                needles.iter().any(|needle| {
                    content.contains(needle)
                        || scored
                            .memory
                            .tags
                            .iter()
                            .any(|tag| tag.to_lowercase().contains(needle))
                })
            });

        matched.append(&mut rest);
        matched.truncate(limit);
        Ok(matched)
    }

    fn knn(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredMemory>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT memory_id, distance FROM memories_vec \
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        )?;
        let hits: Vec<(String, f64)> = stmt
            .query_map(params![embedding_to_bytes(query), limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut results = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            if let Some(memory) = fetch_memory(&conn, &id)? {
                results.push(ScoredMemory { memory, distance });
            }
        }
        Ok(results)
    }

    // ── Journal ───────────────────────────────────────────────────────────

    /// Append one journal entry inside the caller's transaction. The
    /// sequence number is `max + 1` read in the same transaction; the store
    /// is single-writer per handle so the pair is atomic.
    fn append_sync_event(
        &self,
        tx: &Transaction,
        event_type: SyncEventType,
        memory_id: &str,
        content: Option<&str>,
    ) -> Result<()> {
        let sequence_num: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_num), 0) + 1 FROM sync_events",
            [],
            |row| row.get(0),
        )?;

        let (encrypted_data, checksum) = match content {
            Some(text) => {
                let envelope = self.crypto.encrypt(text)?;
                (
                    Some(envelope.to_blob()),
                    Some(sha256_hex(text.as_bytes())),
                )
            }
            None => (None, None),
        };

        tx.execute(
            "INSERT INTO sync_events (id, event_type, memory_id, encrypted_data, checksum, timestamp, sequence_num) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                uuid::Uuid::now_v7().to_string(),
                event_type.as_str(),
                memory_id,
                encrypted_data,
                checksum,
                now_ms(),
                sequence_num,
            ],
        )?;
        Ok(())
    }

    /// Journal reader: events with `sequence_num > since`, in order.
    pub fn get_sync_events_since(&self, since: i64, limit: usize) -> Result<Vec<SyncEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, event_type, memory_id, encrypted_data, checksum, timestamp, sequence_num \
             FROM sync_events WHERE sequence_num > ?1 ORDER BY sequence_num LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![since, limit as i64], |row| {
            let event_type: String = row.get(1)?;
            Ok(SyncEvent {
                id: row.get(0)?,
                event_type: event_type.parse().map_err(|e: String| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        e.into(),
                    )
                })?,
                memory_id: row.get(2)?,
                encrypted_data: row.get(3)?,
                checksum: row.get(4)?,
                timestamp: row.get(5)?,
                sequence_num: row.get(6)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    pub fn latest_sequence_num(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(sequence_num), 0) FROM sync_events",
            [],
            |row| row.get(0),
        )?)
    }

    /// Apply a replicated journal entry from another device.
    ///
    /// The payload is decrypted and its SHA-256 must equal the event's
    /// checksum; a mismatch fails with no side effect. Applying never emits
    /// a new journal entry. Returns whether the store changed.
    pub fn apply_encrypted_sync_event(
        &self,
        event: &SyncEvent,
        vector: Option<&[f32]>,
    ) -> Result<bool> {
        match event.event_type {
            SyncEventType::Add => {
                if self.get(&event.memory_id)?.is_some() {
                    tracing::debug!(id = %event.memory_id, "sync ADD for existing record ignored");
                    return Ok(false);
                }
                let content = self.decrypt_and_verify(event)?;
                let vector = vector.ok_or_else(|| {
                    EngramError::Storage("sync ADD requires a vector".into())
                })?;

                // The originating device already sanitized; bypass DLP and
                // insert verbatim with the sync-origin source marker.
                let memory = Memory {
                    id: event.memory_id.clone(),
                    content,
                    vector: vector.to_vec(),
                    tags: Vec::new(),
                    source: Some(SYNC_SOURCE.to_string()),
                    confidence: 1.0,
                    is_verified: false,
                    created_at: event.timestamp,
                    updated_at: now_ms(),
                };
                self.check_dim(vector)?;

                let mut conn = self.lock()?;
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO memories (id, content, vector, tags, source, confidence, is_verified, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        memory.id,
                        memory.content,
                        embedding_to_bytes(vector),
                        serde_json::to_string(&memory.tags)?,
                        memory.source,
                        memory.confidence,
                        memory.is_verified,
                        memory.created_at,
                        memory.updated_at,
                    ],
                )?;
                tx.execute(
                    "INSERT INTO memories_vec (memory_id, embedding) VALUES (?1, ?2)",
                    params![memory.id, embedding_to_bytes(vector)],
                )?;
                tx.commit()?;
                Ok(true)
            }
            SyncEventType::Update => {
                let content = self.decrypt_and_verify(event)?;
                let patch = MemoryPatch {
                    content: Some(content),
                    ..Default::default()
                };
                Ok(self
                    .update_inner(&event.memory_id, patch, vector, true)?
                    .is_some())
            }
            SyncEventType::Delete => self.delete_inner(&event.memory_id, true),
        }
    }

    fn decrypt_and_verify(&self, event: &SyncEvent) -> Result<String> {
        let blob = event.encrypted_data.as_deref().ok_or_else(|| {
            EngramError::Format(format!(
                "{} event {} has no payload",
                event.event_type, event.id
            ))
        })?;
        let checksum = event.checksum.as_deref().ok_or_else(|| {
            EngramError::Format(format!(
                "{} event {} has no checksum",
                event.event_type, event.id
            ))
        })?;

        let content = self.crypto.decrypt(&Envelope::from_blob(blob)?)?;
        if sha256_hex(content.as_bytes()) != checksum {
            return Err(EngramError::ChecksumMismatch(format!(
                "sync event {}",
                event.id
            )));
        }
        Ok(content)
    }
}

/// True when a memory with this `source` should be visible while searching
/// from `project`.
fn source_visible_in_project(source: Option<&str>, project: &str) -> bool {
    let Some(source) = source else { return true };

    // Plugin definitions are global.
    if source.contains("/.claude/plugins/") {
        return true;
    }
    // `<X>/.claude/...` is scoped to project X.
    if let Some(idx) = source.find("/.claude/") {
        if idx > 0 {
            return &source[..idx] == project;
        }
    }
    true
}

fn memory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let vector_bytes: Vec<u8> = row.get(2)?;
    let tags_json: String = row.get(3)?;
    Ok(Memory {
        id: row.get(0)?,
        content: row.get(1)?,
        vector: bytes_to_embedding(&vector_bytes),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        source: row.get(4)?,
        confidence: row.get(5)?,
        is_verified: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn fetch_memory(conn: &Connection, id: &str) -> Result<Option<Memory>> {
    Ok(conn
        .query_row(
            "SELECT id, content, vector, tags, source, confidence, is_verified, created_at, updated_at \
             FROM memories WHERE id = ?1",
            params![id],
            memory_from_row,
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_master_key;
    use crate::db;
    use crate::dlp::DLP_TAG;

    fn test_store() -> MemoryStore {
        let conn = db::open_memory_database().unwrap();
        MemoryStore::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(CryptoService::new(generate_master_key())),
            DlpSanitizer::default(),
            384,
        )
    }

    /// Unit vector with a spike at `seed`.
    fn embedding(seed: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        v[seed % 384] = 1.0;
        v
    }

    fn create_simple(store: &MemoryStore, content: &str, seed: usize) -> Memory {
        store
            .create(
                CreateMemory {
                    content: content.to_string(),
                    ..Default::default()
                },
                &embedding(seed),
            )
            .unwrap()
    }

    #[test]
    fn create_writes_both_tables_and_journal() {
        let store = test_store();
        let memory = store
            .create(
                CreateMemory {
                    content: "Rust uses ownership and borrowing".into(),
                    tags: vec!["programming".into(), "rust".into()],
                    ..Default::default()
                },
                &embedding(0),
            )
            .unwrap();

        let fetched = store.get(&memory.id).unwrap().unwrap();
        assert_eq!(fetched.content, "Rust uses ownership and borrowing");
        assert_eq!(fetched.tags, vec!["programming", "rust"]);
        assert_eq!(fetched.vector, embedding(0));

        // Vector row exists in the same transaction's output.
        {
            let conn = store.conn.lock().unwrap();
            let vec_count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM memories_vec WHERE memory_id = ?1",
                    params![memory.id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(vec_count, 1);
        }

        // One ADD event whose payload decrypts back to the content and
        // matches its checksum.
        let events = store.get_sync_events_since(0, 10).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.event_type, SyncEventType::Add);
        assert_eq!(event.memory_id, memory.id);
        assert_eq!(event.sequence_num, 1);

        let envelope = Envelope::from_blob(event.encrypted_data.as_ref().unwrap()).unwrap();
        let plaintext = store.crypto.decrypt(&envelope).unwrap();
        assert_eq!(plaintext, memory.content);
        assert_eq!(
            sha256_hex(plaintext.as_bytes()),
            *event.checksum.as_ref().unwrap()
        );
    }

    #[test]
    fn create_rejects_wrong_dimension() {
        let store = test_store();
        let result = store.create(
            CreateMemory {
                content: "bad vector".into(),
                ..Default::default()
            },
            &vec![0.0f32; 128],
        );
        assert!(matches!(
            result,
            Err(EngramError::VectorDimMismatch {
                got: 128,
                expected: 384
            })
        ));
        // Nothing was written.
        assert_eq!(store.count().unwrap(), 0);
        assert_eq!(store.latest_sequence_num().unwrap(), 0);
    }

    #[test]
    fn create_rejects_empty_content() {
        let store = test_store();
        assert!(store
            .create(CreateMemory::default(), &embedding(0))
            .is_err());
    }

    #[test]
    fn create_sanitizes_and_tags_dlp_content() {
        let store = test_store();
        let key = format!("sk-{}", "a".repeat(48));
        let memory = store
            .create(
                CreateMemory {
                    content: format!("My OpenAI key is {key} and I use it daily"),
                    tags: vec!["credentials".into()],
                    ..Default::default()
                },
                &embedding(1),
            )
            .unwrap();

        assert!(!memory.content.contains(&key));
        assert!(memory.content.contains("{{SECRET:OPENAI_KEY}}"));
        assert_eq!(memory.tags, vec!["credentials", DLP_TAG]);

        // The journal payload carries the sanitized form, not the raw key.
        let events = store.get_sync_events_since(0, 10).unwrap();
        let envelope = Envelope::from_blob(events[0].encrypted_data.as_ref().unwrap()).unwrap();
        let plaintext = store.crypto.decrypt(&envelope).unwrap();
        assert!(!plaintext.contains(&key));
    }

    #[test]
    fn stored_content_is_dlp_fixed_point() {
        let store = test_store();
        let memory = create_simple(
            &store,
            &format!("token ghp_{} in CI", "Z".repeat(36)),
            2,
        );
        let again = store.sanitize(&memory.content);
        assert_eq!(again.sanitized, memory.content);
        assert!(again.detected.is_empty());
    }

    #[test]
    fn sequence_numbers_are_dense_from_one() {
        let store = test_store();
        let a = create_simple(&store, "first", 0);
        let _b = create_simple(&store, "second", 1);
        store
            .update(
                &a.id,
                MemoryPatch {
                    content: Some("first, revised".into()),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        store.delete(&a.id).unwrap();

        let events = store.get_sync_events_since(0, 100).unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.sequence_num).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(store.latest_sequence_num().unwrap(), 4);
    }

    #[test]
    fn update_patches_fields_and_journals_once() {
        let store = test_store();
        let memory = create_simple(&store, "original", 0);

        let updated = store
            .update(
                &memory.id,
                MemoryPatch {
                    content: Some("revised".into()),
                    confidence: Some(0.5),
                    is_verified: Some(true),
                    ..Default::default()
                },
                Some(&embedding(7)),
            )
            .unwrap()
            .unwrap();

        assert_eq!(updated.content, "revised");
        assert_eq!(updated.confidence, 0.5);
        assert!(updated.is_verified);
        assert_eq!(updated.vector, embedding(7));
        assert!(updated.updated_at >= memory.updated_at);

        let events = store.get_sync_events_since(0, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event_type, SyncEventType::Update);
    }

    #[test]
    fn update_missing_returns_none_without_event() {
        let store = test_store();
        let result = store
            .update("01920000-0000-7000-8000-000000000000", MemoryPatch::default(), None)
            .unwrap();
        assert!(result.is_none());
        assert_eq!(store.latest_sequence_num().unwrap(), 0);
    }

    #[test]
    fn dlp_tag_preserved_when_new_content_still_fires() {
        let store = test_store();
        let key1 = format!("sk-{}", "a".repeat(48));
        let memory = store
            .create(
                CreateMemory {
                    content: format!("key {key1}"),
                    tags: vec!["creds".into()],
                    ..Default::default()
                },
                &embedding(0),
            )
            .unwrap();
        assert!(memory.tags.contains(&DLP_TAG.to_string()));

        // Caller rewrites tags without the DLP tag, but the new content
        // still trips a pattern: the tag comes back.
        let key2 = format!("sk-{}", "b".repeat(48));
        let updated = store
            .update(
                &memory.id,
                MemoryPatch {
                    content: Some(format!("new key {key2}")),
                    tags: Some(vec!["rotated".into()]),
                    ..Default::default()
                },
                None,
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.tags, vec!["rotated", DLP_TAG]);

        // Clean content plus a deliberate tag rewrite drops it.
        let cleaned = store
            .update(
                &memory.id,
                MemoryPatch {
                    content: Some("no secrets anymore".into()),
                    tags: Some(vec!["clean".into()]),
                    ..Default::default()
                },
                None,
            )
            .unwrap()
            .unwrap();
        assert_eq!(cleaned.tags, vec!["clean"]);
    }

    #[test]
    fn dlp_tag_survives_update_without_tag_patch() {
        let store = test_store();
        let key = format!("sk-{}", "c".repeat(48));
        let memory = create_simple(&store, &format!("key {key}"), 0);
        assert!(memory.tags.contains(&DLP_TAG.to_string()));

        let updated = store
            .update(
                &memory.id,
                MemoryPatch {
                    confidence: Some(0.9),
                    ..Default::default()
                },
                None,
            )
            .unwrap()
            .unwrap();
        assert!(updated.tags.contains(&DLP_TAG.to_string()));
    }

    #[test]
    fn delete_removes_both_rows_and_journals_once() {
        let store = test_store();
        let memory = create_simple(&store, "to delete", 0);

        assert!(store.delete(&memory.id).unwrap());
        assert!(store.get(&memory.id).unwrap().is_none());
        {
            let conn = store.conn.lock().unwrap();
            let vec_count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM memories_vec WHERE memory_id = ?1",
                    params![memory.id],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(vec_count, 0);
        }

        // Idempotent re-delete: false, and no extra journal entry.
        let seq_after_first = store.latest_sequence_num().unwrap();
        assert!(!store.delete(&memory.id).unwrap());
        assert_eq!(store.latest_sequence_num().unwrap(), seq_after_first);

        let events = store.get_sync_events_since(0, 10).unwrap();
        let deletes: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == SyncEventType::Delete)
            .collect();
        assert_eq!(deletes.len(), 1);
        assert!(deletes[0].encrypted_data.is_none());
        assert!(deletes[0].checksum.is_none());
    }

    #[test]
    fn search_orders_by_distance() {
        let store = test_store();
        let near = create_simple(&store, "near", 0);
        let _far = create_simple(&store, "far", 100);

        let results = store
            .search(&embedding(0), 5, &SearchOptions::default())
            .unwrap();
        assert_eq!(results[0].memory.id, near.id);
        assert!(results[0].distance < results[1].distance);
    }

    #[test]
    fn search_rejects_wrong_dimension() {
        let store = test_store();
        assert!(store
            .search(&vec![0.0f32; 10], 5, &SearchOptions::default())
            .is_err());
    }

    #[test]
    fn project_filter_scopes_sources() {
        let store = test_store();
        let mk = |content: &str, source: Option<&str>, seed: usize| {
            store
                .create(
                    CreateMemory {
                        content: content.into(),
                        source: source.map(String::from),
                        ..Default::default()
                    },
                    &embedding(seed),
                )
                .unwrap()
        };

        let plugin = mk(
            "plugin skill",
            Some("/home/u/.claude/plugins/pack/skills/x.md"),
            0,
        );
        let mine = mk("my session", Some("/home/u/proj/.claude/skills/y.md"), 1);
        let other = mk(
            "other project session",
            Some("/home/u/elsewhere/.claude/skills/z.md"),
            2,
        );
        let untagged = mk("no source", None, 3);

        let options = SearchOptions {
            project_path: Some("/home/u/proj".into()),
        };
        let results = store.search(&embedding(0), 10, &options).unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.memory.id.as_str()).collect();

        assert!(ids.contains(&plugin.id.as_str()));
        assert!(ids.contains(&mine.id.as_str()));
        assert!(ids.contains(&untagged.id.as_str()));
        assert!(!ids.contains(&other.id.as_str()));
    }

    #[test]
    fn hybrid_search_prioritizes_keyword_matches() {
        let store = test_store();
        // Closest by vector but no keyword.
        let closest = create_simple(&store, "completely unrelated topic", 0);
        // Farther by vector but mentions the keyword.
        let keyworded = store
            .create(
                CreateMemory {
                    content: "notes about the deploy pipeline".into(),
                    tags: vec!["ops".into()],
                    ..Default::default()
                },
                &embedding(50),
            )
            .unwrap();

        let results = store
            .hybrid_search(&embedding(0), &["deploy".into()], 2)
            .unwrap();
        assert_eq!(results[0].memory.id, keyworded.id);
        assert_eq!(results[1].memory.id, closest.id);
    }

    #[test]
    fn hybrid_search_matches_tags_too() {
        let store = test_store();
        let _plain = create_simple(&store, "plain note", 0);
        let tagged = store
            .create(
                CreateMemory {
                    content: "something else".into(),
                    tags: vec!["Kubernetes".into()],
                    ..Default::default()
                },
                &embedding(60),
            )
            .unwrap();

        let results = store
            .hybrid_search(&embedding(0), &["kubernetes".into()], 2)
            .unwrap();
        assert_eq!(results[0].memory.id, tagged.id);
    }

    #[test]
    fn list_is_reverse_chronological_with_source_filter() {
        let store = test_store();
        let a = store
            .create(
                CreateMemory {
                    content: "indexed one".into(),
                    source: Some("/tmp/a.jsonl".into()),
                    ..Default::default()
                },
                &embedding(0),
            )
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = create_simple(&store, "plain two", 1);

        let all = store.list(&ListOptions::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id);
        assert_eq!(all[1].id, a.id);

        let filtered = store
            .list(&ListOptions {
                source: Some("/tmp/a.jsonl".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, a.id);
    }

    #[test]
    fn count_and_delete_older_than() {
        let store = test_store();
        create_simple(&store, "old", 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let cutoff = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let kept = create_simple(&store, "new", 1);

        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.delete_older_than(cutoff).unwrap(), 1);
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.get(&kept.id).unwrap().is_some());
    }

    #[test]
    fn find_by_source_returns_canonical_record() {
        let store = test_store();
        assert!(store.find_by_source("/tmp/none").unwrap().is_none());
        let memory = store
            .create(
                CreateMemory {
                    content: "session summary".into(),
                    source: Some("/tmp/session.jsonl".into()),
                    ..Default::default()
                },
                &embedding(0),
            )
            .unwrap();
        let found = store.find_by_source("/tmp/session.jsonl").unwrap().unwrap();
        assert_eq!(found.id, memory.id);
    }

    #[test]
    fn apply_add_event_replicates_without_new_journal_entry() {
        let origin = test_store();
        let replica_conn = db::open_memory_database().unwrap();
        // Same vault key on both stores.
        let shared_key = generate_master_key();
        let origin = MemoryStore::new(
            origin.conn.clone(),
            Arc::new(CryptoService::new(shared_key)),
            DlpSanitizer::default(),
            384,
        );
        let replica = MemoryStore::new(
            Arc::new(Mutex::new(replica_conn)),
            Arc::new(CryptoService::new(shared_key)),
            DlpSanitizer::default(),
            384,
        );

        let memory = origin
            .create(
                CreateMemory {
                    content: "replicate me".into(),
                    ..Default::default()
                },
                &embedding(0),
            )
            .unwrap();
        let event = origin.get_sync_events_since(0, 10).unwrap().remove(0);

        assert!(replica
            .apply_encrypted_sync_event(&event, Some(&embedding(0)))
            .unwrap());

        let replicated = replica.get(&memory.id).unwrap().unwrap();
        assert_eq!(replicated.content, "replicate me");
        assert_eq!(replicated.source.as_deref(), Some(SYNC_SOURCE));
        // Applying must not feed back into the replica's journal.
        assert_eq!(replica.latest_sequence_num().unwrap(), 0);

        // Re-applying the same ADD is a no-op.
        assert!(!replica
            .apply_encrypted_sync_event(&event, Some(&embedding(0)))
            .unwrap());
    }

    #[test]
    fn apply_tampered_event_fails_checksum_with_no_side_effect() {
        let shared_key = generate_master_key();
        let origin = MemoryStore::new(
            Arc::new(Mutex::new(db::open_memory_database().unwrap())),
            Arc::new(CryptoService::new(shared_key)),
            DlpSanitizer::default(),
            384,
        );
        let replica = MemoryStore::new(
            Arc::new(Mutex::new(db::open_memory_database().unwrap())),
            Arc::new(CryptoService::new(shared_key)),
            DlpSanitizer::default(),
            384,
        );

        origin
            .create(
                CreateMemory {
                    content: "authentic".into(),
                    ..Default::default()
                },
                &embedding(0),
            )
            .unwrap();
        let mut event = origin.get_sync_events_since(0, 10).unwrap().remove(0);

        // Valid envelope of different plaintext, original checksum kept.
        let forged = origin.crypto.encrypt("forged").unwrap();
        event.encrypted_data = Some(forged.to_blob());

        let result = replica.apply_encrypted_sync_event(&event, Some(&embedding(0)));
        assert!(matches!(result, Err(EngramError::ChecksumMismatch(_))));
        assert_eq!(replica.count().unwrap(), 0);
    }

    #[test]
    fn apply_update_and_delete_events() {
        let shared_key = generate_master_key();
        let origin = MemoryStore::new(
            Arc::new(Mutex::new(db::open_memory_database().unwrap())),
            Arc::new(CryptoService::new(shared_key)),
            DlpSanitizer::default(),
            384,
        );
        let replica = MemoryStore::new(
            Arc::new(Mutex::new(db::open_memory_database().unwrap())),
            Arc::new(CryptoService::new(shared_key)),
            DlpSanitizer::default(),
            384,
        );

        let memory = origin
            .create(
                CreateMemory {
                    content: "v1".into(),
                    ..Default::default()
                },
                &embedding(0),
            )
            .unwrap();
        origin
            .update(
                &memory.id,
                MemoryPatch {
                    content: Some("v2".into()),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        origin.delete(&memory.id).unwrap();

        let events = origin.get_sync_events_since(0, 10).unwrap();
        assert_eq!(events.len(), 3);

        // ADD then UPDATE then DELETE, in sequence order.
        assert!(replica
            .apply_encrypted_sync_event(&events[0], Some(&embedding(0)))
            .unwrap());
        assert!(replica
            .apply_encrypted_sync_event(&events[1], None)
            .unwrap());
        assert_eq!(
            replica.get(&memory.id).unwrap().unwrap().content,
            "v2"
        );
        assert!(replica
            .apply_encrypted_sync_event(&events[2], None)
            .unwrap());
        assert!(replica.get(&memory.id).unwrap().is_none());

        // UPDATE for a locally missing record is a no-op (tombstone wins).
        assert!(!replica
            .apply_encrypted_sync_event(&events[1], None)
            .unwrap());
    }

    #[test]
    fn source_visibility_rules() {
        assert!(source_visible_in_project(None, "/p"));
        assert!(source_visible_in_project(
            Some("/u/.claude/plugins/x/skills/a.md"),
            "/p"
        ));
        assert!(source_visible_in_project(Some("/p/.claude/skills/a.md"), "/p"));
        assert!(!source_visible_in_project(
            Some("/q/.claude/skills/a.md"),
            "/p"
        ));
        assert!(source_visible_in_project(Some("/tmp/session.jsonl"), "/p"));
        assert!(source_visible_in_project(Some("sync"), "/p"));
    }
}
