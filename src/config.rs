use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::embedding::EMBEDDING_DIM;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngramConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub sync: SyncConfig,
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub keys_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub dimensions: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote backend base URL; sync stays disabled while unset.
    pub api_url: Option<String>,
    pub inline_blob_max_bytes: usize,
    pub blob_url_ttl_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexingConfig {
    pub enabled: bool,
    /// Roots the session watcher observes.
    pub watch_paths: Vec<String>,
    pub scan_depth: usize,
}

impl Default for EngramConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            sync: SyncConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_engram_dir()
                .join("memory.db")
                .to_string_lossy()
                .into_owned(),
            keys_dir: default_engram_dir()
                .join("keys")
                .to_string_lossy()
                .into_owned(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".into(),
            model: "hashing-v1".into(),
            cache_dir: default_engram_dir()
                .join("models")
                .to_string_lossy()
                .into_owned(),
            dimensions: EMBEDDING_DIM,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            inline_blob_max_bytes: 262_144,
            blob_url_ttl_seconds: 300,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            watch_paths: Vec::new(),
            scan_depth: crate::watcher::DEFAULT_SCAN_DEPTH,
        }
    }
}

/// Returns `~/.engram/`
pub fn default_engram_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".engram")
}

/// Returns the default config file path: `~/.engram/config.toml`
pub fn default_config_path() -> PathBuf {
    default_engram_dir().join("config.toml")
}

impl EngramConfig {
    /// Load config from the TOML file (if it exists) then apply env var
    /// overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EngramConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment overrides: `ENGRAM_PATH`, `ENGRAM_MODELS_DIR`,
    /// `ENGRAM_API_URL`, `ENGRAM_LOG_LEVEL`, `SYNC_INLINE_BLOB_MAX_BYTES`,
    /// `SYNC_BLOB_URL_TTL_SECONDS`.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENGRAM_PATH") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_MODELS_DIR") {
            self.embedding.cache_dir = val;
        }
        if let Ok(val) = std::env::var("ENGRAM_API_URL") {
            self.sync.api_url = Some(val);
        }
        if let Ok(val) = std::env::var("ENGRAM_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("SYNC_INLINE_BLOB_MAX_BYTES") {
            if let Ok(parsed) = val.parse() {
                self.sync.inline_blob_max_bytes = parsed;
            }
        }
        if let Ok(val) = std::env::var("SYNC_BLOB_URL_TTL_SECONDS") {
            if let Ok(parsed) = val.parse() {
                self.sync.blob_url_ttl_seconds = parsed;
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the key-vault directory, expanding `~` if needed.
    pub fn resolved_keys_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.keys_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngramConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert!(config.storage.db_path.ends_with("memory.db"));
        assert_eq!(config.embedding.dimensions, EMBEDDING_DIM);
        assert_eq!(config.sync.inline_blob_max_bytes, 262_144);
        assert_eq!(config.sync.blob_url_ttl_seconds, 300);
        assert!(config.sync.api_url.is_none());
        assert!(!config.indexing.enabled);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[server]
log_level = "debug"

[storage]
db_path = "/tmp/engram-test.db"

[sync]
api_url = "https://sync.example"
inline_blob_max_bytes = 1024

[indexing]
enabled = true
watch_paths = ["~/.claude"]
"#;
        let config: EngramConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.storage.db_path, "/tmp/engram-test.db");
        assert_eq!(config.sync.api_url.as_deref(), Some("https://sync.example"));
        assert_eq!(config.sync.inline_blob_max_bytes, 1024);
        assert!(config.indexing.enabled);
        // defaults still apply for unset fields
        assert_eq!(config.sync.blob_url_ttl_seconds, 300);
        assert_eq!(config.embedding.provider, "hashing");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = EngramConfig::default();
        std::env::set_var("ENGRAM_PATH", "/tmp/override.db");
        std::env::set_var("ENGRAM_API_URL", "https://env.example");
        std::env::set_var("SYNC_INLINE_BLOB_MAX_BYTES", "2048");

        config.apply_env_overrides();

        assert_eq!(config.storage.db_path, "/tmp/override.db");
        assert_eq!(config.sync.api_url.as_deref(), Some("https://env.example"));
        assert_eq!(config.sync.inline_blob_max_bytes, 2048);

        std::env::remove_var("ENGRAM_PATH");
        std::env::remove_var("ENGRAM_API_URL");
        std::env::remove_var("SYNC_INLINE_BLOB_MAX_BYTES");
    }

    #[test]
    fn expand_tilde_handles_both_forms() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert!(expand_tilde("~/x").ends_with("x"));
    }
}
