//! MCP server initialization for the stdio transport.
//!
//! [`serve_stdio`] wires the database, key hierarchy, stores, sync engines,
//! optional session watcher, and the MCP tool handler into a running server.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rmcp::ServiceExt;

use crate::config::{expand_tilde, EngramConfig};
use crate::crypto::CryptoService;
use crate::db;
use crate::dlp::DlpSanitizer;
use crate::embedding::{self, Embedder};
use crate::indexing::IndexingService;
use crate::keys;
use crate::keyvault::FileKeyVault;
use crate::memory::store::MemoryStore;
use crate::secrets::SecretsStore;
use crate::sync::memory::MemorySyncEngine;
use crate::sync::secrets::SecretsSyncEngine;
use crate::tools::EngramTools;
use crate::watcher::{self, SessionWatcher};

struct SharedState {
    tools: EngramTools,
    indexer: Option<Arc<IndexingService>>,
}

/// Open the DB, resolve the key hierarchy, and assemble stores + engines.
fn setup_shared_state(config: &EngramConfig) -> Result<SharedState> {
    let conn = db::open_database(config.resolved_db_path(), config.embedding.dimensions)
        .context("failed to open database")?;
    let conn = Arc::new(Mutex::new(conn));

    // Key hierarchy: MK from the keychain, VK from its table (bootstrapped
    // on the first device), BK derived from VK.
    let keyvault = FileKeyVault::new(config.resolved_keys_dir())
        .context("failed to open key vault")?;
    let _master_key = keys::ensure_master_key(&keyvault).context("failed to load master key")?;
    let vault_key = {
        let conn = conn.lock().expect("fresh connection lock");
        keys::ensure_vault_key(&conn).context("failed to load vault key")?
    };
    let vault_crypto = Arc::new(CryptoService::new(vault_key));
    let blind_key = keys::derive_blind_index_key(&vault_key);

    let store = Arc::new(MemoryStore::new(
        conn.clone(),
        vault_crypto.clone(),
        DlpSanitizer::default(),
        config.embedding.dimensions,
    ));

    let provider = embedding::create_provider(&config.embedding)
        .context("failed to create embedding provider")?;
    let embedder: Arc<dyn Embedder> = Arc::from(provider);
    tracing::info!(provider = %config.embedding.provider, "embedding provider ready");

    let (memory_sync, secrets_store) = match &config.sync.api_url {
        Some(api_url) => {
            let memory_sync = Arc::new(MemorySyncEngine::new(api_url.clone(), conn.clone()));
            memory_sync.connect();

            let secrets_sync = Arc::new(
                SecretsSyncEngine::new(
                    api_url.clone(),
                    conn.clone(),
                    vault_crypto.clone(),
                    blind_key,
                )
                .context("failed to create secrets sync engine")?,
            );
            secrets_sync.connect();

            let secrets = Arc::new(
                SecretsStore::new(conn.clone(), vault_crypto.clone()).with_sync(secrets_sync),
            );
            (Some(memory_sync), secrets)
        }
        None => {
            let secrets = Arc::new(SecretsStore::new(conn.clone(), vault_crypto.clone()));
            (None, secrets)
        }
    };

    let indexer = if config.indexing.enabled {
        let indexer = IndexingService::new(store.clone(), embedder.clone())
            .with_event_sink(conn.clone());
        Some(Arc::new(indexer))
    } else {
        None
    };

    let tools = EngramTools::new(
        store,
        embedder,
        Some(secrets_store),
        memory_sync,
        Some(vault_key),
    );

    Ok(SharedState { tools, indexer })
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: EngramConfig) -> Result<()> {
    tracing::info!("starting Engram MCP server on stdio");

    let state = setup_shared_state(&config)?;

    // The watcher feeds the indexer in the background; neither blocks the
    // MCP loop.
    let mut watcher_handle = None;
    if let Some(indexer) = &state.indexer {
        if !config.indexing.watch_paths.is_empty() {
            let paths = config
                .indexing
                .watch_paths
                .iter()
                .map(|p| expand_tilde(p))
                .collect();
            let mut session_watcher = SessionWatcher::new(paths, config.indexing.scan_depth);
            let rx = session_watcher.start().context("failed to start watcher")?;
            tokio::spawn(watcher::drive(indexer.clone(), rx));
            watcher_handle = Some(session_watcher);
        }
    }

    let transport = rmcp::transport::stdio();
    let server = state.tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    drop(watcher_handle);
    tracing::info!("MCP server shut down");

    Ok(())
}
