//! The MCP tool facade: twelve thin tools mapping JSON arguments to store
//! operations and formatting plain-text responses.
//!
//! Every handler returns `Result<String, String>`; the error string is a
//! single `"<Category> failed: <message>"` line, so nothing ever throws
//! through the transport.

pub mod device_params;
pub mod memory_params;
pub mod secret_params;

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::tool::{Parameters, ToolRouter};
use rmcp::{tool, tool_handler, tool_router, ServerHandler};

use crate::crypto::KEY_SIZE;
use crate::embedding::Embedder;
use crate::indexing::SESSION_INDEX_TAG;
use crate::memory::store::{ListOptions, MemoryStore, SearchOptions};
use crate::memory::types::CreateMemory;
use crate::recovery::generate_recovery_kit;
use crate::secrets::SecretsStore;
use crate::sync::memory::MemorySyncEngine;

use device_params::{AuthorizeDeviceParams, ListDevicesParams, RevokeDeviceParams};
use memory_params::{
    DeleteMemoryParams, FindSimilarSessionsParams, ListMemoriesParams, MemoryStatusParams,
    ReadMemoryParams, SaveMemoryParams,
};
use secret_params::{CreateRecoveryKitParams, GetSecretParams, SetSecretParams};

const DEFAULT_READ_LIMIT: usize = 5;
const DEFAULT_LIST_LIMIT: usize = 10;
const DEFAULT_SESSION_LIMIT: usize = 3;
const DEFAULT_KIT_SHARES: u8 = 5;
const DEFAULT_KIT_THRESHOLD: u8 = 3;

/// The Engram MCP tool handler. Holds shared state and exposes all tools
/// via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct EngramTools {
    tool_router: ToolRouter<Self>,
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    secrets: Option<Arc<SecretsStore>>,
    sync: Option<Arc<MemorySyncEngine>>,
    vault_key: Option<[u8; KEY_SIZE]>,
}

#[tool_router]
impl EngramTools {
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        secrets: Option<Arc<SecretsStore>>,
        sync: Option<Arc<MemorySyncEngine>>,
        vault_key: Option<[u8; KEY_SIZE]>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            store,
            embedder,
            secrets,
            sync,
            vault_key,
        }
    }

    fn secrets(&self) -> Result<&Arc<SecretsStore>, String> {
        self.secrets
            .as_ref()
            .ok_or_else(|| "vault not initialized".to_string())
    }

    fn sync(&self) -> Result<&Arc<MemorySyncEngine>, String> {
        self.sync
            .as_ref()
            .ok_or_else(|| "sync is not configured".to_string())
    }

    fn vault_key(&self) -> Result<[u8; KEY_SIZE], String> {
        self.vault_key
            .ok_or_else(|| "vault not initialized".to_string())
    }

    /// Embed text on the blocking pool (model inference is CPU-heavy).
    async fn embed(&self, text: String) -> Result<Vec<f32>, String> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| format!("embedding task failed: {e}"))?
            .map_err(|e| e.to_string())
    }

    /// Store a memory. Content is sanitized, embedded, and journaled.
    #[tool(
        name = "mcp_save_memory",
        description = "Save a fact or note to persistent memory. Credentials are redacted automatically."
    )]
    async fn save_memory(
        &self,
        Parameters(params): Parameters<SaveMemoryParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Memory save failed: {e}");

        if params.content.is_empty() {
            return Err(fail("content must not be empty".into()));
        }
        tracing::info!(content_len = params.content.len(), "mcp_save_memory called");

        // Embed the sanitized form so redacted credentials never reach the
        // embedder; the store re-sanitizes (idempotently) on insert.
        let sanitized = self.store.sanitize(&params.content).sanitized;
        let vector = self.embed(sanitized).await.map_err(fail)?;

        let store = Arc::clone(&self.store);
        let request = CreateMemory {
            content: params.content,
            tags: params.tags.unwrap_or_default(),
            ..Default::default()
        };
        let memory = tokio::task::spawn_blocking(move || store.create(request, &vector))
            .await
            .map_err(|e| fail(format!("task failed: {e}")))?
            .map_err(|e| fail(e.to_string()))?;

        Ok(format!(
            "Remembered: \"{}\" (ID: {})",
            truncate(&memory.content, 100),
            memory.id
        ))
    }

    /// Search memories by semantic similarity.
    #[tool(
        name = "mcp_read_memory",
        description = "Search stored memories by natural language query. Returns the most relevant matches."
    )]
    async fn read_memory(
        &self,
        Parameters(params): Parameters<ReadMemoryParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Memory read failed: {e}");
        let limit = params.limit.unwrap_or(DEFAULT_READ_LIMIT);
        tracing::info!(query = %params.query, limit, "mcp_read_memory called");

        let vector = self.embed(params.query).await.map_err(&fail)?;
        let store = Arc::clone(&self.store);
        let results = tokio::task::spawn_blocking(move || {
            store.search(&vector, limit, &SearchOptions::default())
        })
        .await
        .map_err(|e| fail(format!("task failed: {e}")))?
        .map_err(|e| fail(e.to_string()))?;

        if results.is_empty() {
            return Ok("No relevant memories found.".into());
        }

        let lines: Vec<String> = results
            .iter()
            .enumerate()
            .map(|(i, scored)| {
                let mut line = format!("{}. {}", i + 1, scored.memory.content);
                if !scored.memory.tags.is_empty() {
                    line.push_str(&format!(" [{}]", scored.memory.tags.join(", ")));
                }
                if scored.memory.is_verified {
                    line.push_str(" (verified)");
                }
                line.push_str(&format!(" (similarity: {:.3})", 1.0 - scored.distance));
                line
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Delete a memory by ID.
    #[tool(
        name = "mcp_delete_memory",
        description = "Delete a memory by its ID."
    )]
    async fn delete_memory(
        &self,
        Parameters(params): Parameters<DeleteMemoryParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Memory delete failed: {e}");
        tracing::info!(id = %params.memory_id, "mcp_delete_memory called");

        let store = Arc::clone(&self.store);
        let id = params.memory_id.clone();
        let deleted = tokio::task::spawn_blocking(move || store.delete(&id))
            .await
            .map_err(|e| fail(format!("task failed: {e}")))?
            .map_err(|e| fail(e.to_string()))?;

        if deleted {
            Ok(format!("Memory {} has been deleted.", params.memory_id))
        } else {
            Ok(format!("Memory {} not found.", params.memory_id))
        }
    }

    /// List recent memories.
    #[tool(
        name = "mcp_list_memories",
        description = "List stored memories, newest first. Optionally filter by source path."
    )]
    async fn list_memories(
        &self,
        Parameters(params): Parameters<ListMemoriesParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Memory list failed: {e}");
        let options = ListOptions {
            limit: params.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            offset: 0,
            source: params.source,
        };

        let store = Arc::clone(&self.store);
        let memories = tokio::task::spawn_blocking(move || store.list(&options))
            .await
            .map_err(|e| fail(format!("task failed: {e}")))?
            .map_err(|e| fail(e.to_string()))?;

        if memories.is_empty() {
            return Ok("No memories stored.".into());
        }

        let lines: Vec<String> = memories
            .iter()
            .enumerate()
            .map(|(i, memory)| {
                let date = chrono::DateTime::from_timestamp_millis(memory.created_at)
                    .map(|dt| dt.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "unknown".into());
                let mut line =
                    format!("{}. [{}] {}", i + 1, date, truncate(&memory.content, 80));
                if !memory.tags.is_empty() {
                    line.push_str(&format!(" [{}]", memory.tags.join(", ")));
                }
                line
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Memory count and embedder status.
    #[tool(
        name = "mcp_memory_status",
        description = "Show the memory count and embedding model status."
    )]
    async fn memory_status(
        &self,
        Parameters(_params): Parameters<MemoryStatusParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Memory status failed: {e}");

        let store = Arc::clone(&self.store);
        let count = tokio::task::spawn_blocking(move || store.count())
            .await
            .map_err(|e| fail(format!("task failed: {e}")))?
            .map_err(|e| fail(e.to_string()))?;

        let model_status = if self.embedder.is_ready() {
            "Ready"
        } else if self.embedder.is_loading() {
            "Loading..."
        } else {
            "Not loaded"
        };
        Ok(format!(
            "Memory count: {count}\nEmbedding model: {model_status}"
        ))
    }

    /// Find past sessions relevant to the stated intent.
    #[tool(
        name = "mcp_find_similar_sessions",
        description = "Find indexed past sessions semantically similar to what you are about to work on."
    )]
    async fn find_similar_sessions(
        &self,
        Parameters(params): Parameters<FindSimilarSessionsParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Session search failed: {e}");
        let limit = params.limit.unwrap_or(DEFAULT_SESSION_LIMIT);
        tracing::info!(intent = %params.intent, limit, "mcp_find_similar_sessions called");

        let vector = self.embed(params.intent).await.map_err(&fail)?;
        let store = Arc::clone(&self.store);
        let results = tokio::task::spawn_blocking(move || {
            store.search(&vector, limit * 2, &SearchOptions::default())
        })
        .await
        .map_err(|e| fail(format!("task failed: {e}")))?
        .map_err(|e| fail(e.to_string()))?;

        let sessions: Vec<_> = results
            .into_iter()
            .filter(|scored| {
                scored
                    .memory
                    .tags
                    .iter()
                    .any(|tag| tag == SESSION_INDEX_TAG)
            })
            .take(limit)
            .collect();

        if sessions.is_empty() {
            return Ok("No similar sessions found.".into());
        }

        let blocks: Vec<String> = sessions
            .iter()
            .enumerate()
            .map(|(i, scored)| {
                format!(
                    "{}. {}\n   Similarity: {:.2}\n   Path: {}",
                    i + 1,
                    truncate(&scored.memory.content, 120),
                    1.0 - scored.distance,
                    scored.memory.source.as_deref().unwrap_or("unknown"),
                )
            })
            .collect();
        Ok(blocks.join("\n"))
    }

    /// Fetch a decrypted secret value.
    #[tool(
        name = "mcp_get_secret",
        description = "Fetch a secret value from the encrypted vault by name."
    )]
    async fn get_secret(
        &self,
        Parameters(params): Parameters<GetSecretParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Secret get failed: {e}");
        let secrets = self.secrets().map_err(&fail)?;

        match secrets.get(&params.key).map_err(|e| fail(e.to_string()))? {
            Some(value) => Ok(value),
            None => Ok(format!("Secret {} not found.", params.key)),
        }
    }

    /// Store or update a secret value.
    #[tool(
        name = "mcp_set_secret",
        description = "Store a secret value in the encrypted vault. Overwrites an existing secret with the same name."
    )]
    async fn set_secret(
        &self,
        Parameters(params): Parameters<SetSecretParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Secret set failed: {e}");
        let secrets = self.secrets().map_err(&fail)?;

        secrets
            .set(&params.key, &params.value, params.description.as_deref())
            .await
            .map_err(|e| fail(e.to_string()))?;
        Ok(format!("Secret {} stored.", params.key))
    }

    /// Authorize another device into the vault.
    #[tool(
        name = "mcp_authorize_device",
        description = "Authorize a device: wraps the vault key under the device's RSA public key."
    )]
    async fn authorize_device(
        &self,
        Parameters(params): Parameters<AuthorizeDeviceParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Device authorization failed: {e}");
        let sync = self.sync().map_err(&fail)?;
        let vault_key = self.vault_key().map_err(&fail)?;

        sync.authorize_device(&params.device_id, &params.public_key, &vault_key)
            .await
            .map_err(|e| fail(e.to_string()))?;
        Ok(format!("Device {} authorized.", params.device_id))
    }

    /// Revoke a device's access.
    #[tool(
        name = "mcp_revoke_device",
        description = "Revoke a previously authorized device."
    )]
    async fn revoke_device(
        &self,
        Parameters(params): Parameters<RevokeDeviceParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Device revocation failed: {e}");
        let sync = self.sync().map_err(&fail)?;

        sync.revoke_device(&params.device_id)
            .await
            .map_err(|e| fail(e.to_string()))?;
        Ok(format!("Device {} has been revoked.", params.device_id))
    }

    /// List registered devices.
    #[tool(
        name = "mcp_list_devices",
        description = "List the devices registered to this vault."
    )]
    async fn list_devices(
        &self,
        Parameters(_params): Parameters<ListDevicesParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Device list failed: {e}");
        let sync = self.sync().map_err(&fail)?;

        let devices = sync.list_devices().await.map_err(|e| fail(e.to_string()))?;
        if devices.is_empty() {
            return Ok("No devices registered.".into());
        }

        let lines: Vec<String> = devices
            .iter()
            .enumerate()
            .map(|(i, device)| {
                let name = device.name.as_deref().unwrap_or("unnamed");
                format!("{}. {} ({})", i + 1, device.id, name)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Generate a Shamir recovery kit for the vault key.
    #[tool(
        name = "mcp_create_recovery_kit",
        description = "Split the vault key into Shamir shares for offline recovery."
    )]
    async fn create_recovery_kit(
        &self,
        Parameters(params): Parameters<CreateRecoveryKitParams>,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Recovery kit creation failed: {e}");
        let vault_key = self.vault_key().map_err(&fail)?;

        let total = params.shares.unwrap_or(DEFAULT_KIT_SHARES);
        let threshold = params.threshold.unwrap_or(DEFAULT_KIT_THRESHOLD);
        let kit = generate_recovery_kit(&vault_key, "user", total, threshold)
            .map_err(|e| fail(e.to_string()))?;

        let mut out = format!(
            "Recovery kit created ({} of {} shares required):\n",
            kit.threshold, kit.total
        );
        for share in &kit.shares {
            out.push_str(&format!(
                "Share {}: {}...\n",
                share.index + 1,
                share.data.chars().take(20).collect::<String>()
            ));
        }
        out.push_str(&format!(
            "Store each share in a separate secure location. Any {} shares can restore your vault key.",
            kit.threshold
        ));
        Ok(out)
    }
}

#[tool_handler]
impl ServerHandler for EngramTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Engram is an encrypted memory and secrets layer. Use mcp_save_memory to \
                 remember facts, mcp_read_memory to search them, mcp_find_similar_sessions \
                 to discover relevant past sessions, and the secret/device tools to manage \
                 the vault."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

/// Truncate to `max` characters on a char boundary, appending an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max).collect();
    format!("{cut}...")
}
